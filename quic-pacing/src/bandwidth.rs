// Copyright (C) 2025, Cloudflare, Inc.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::time::Duration;

use crate::ByteCount;

const NUM_NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A data rate, stored in bits per second.
///
/// All arithmetic saturates. `u64::MAX` bits per second is reserved for
/// [`Bandwidth::infinite()`], the estimate used when no RTT was measured yet.
#[derive(PartialEq, PartialOrd, Eq, Ord, Clone, Copy)]
pub struct Bandwidth {
    bits_per_second: u64,
}

impl std::ops::Mul<f64> for Bandwidth {
    type Output = Bandwidth;

    fn mul(self, rhs: f64) -> Self::Output {
        // `as` saturates float to integer conversions, NaN becomes zero.
        Bandwidth {
            bits_per_second: (self.bits_per_second as f64 * rhs).round() as u64,
        }
    }
}

impl Bandwidth {
    /// Rate at which `bytes` are delivered over `time_delta`.
    ///
    /// A zero delta is treated as one nanosecond.
    pub fn from_bytes_and_time_delta(
        bytes: ByteCount, time_delta: Duration,
    ) -> Self {
        if bytes == 0 {
            return Bandwidth::zero();
        }

        let nanos = time_delta.as_nanos().max(1);
        let num_nano_bits = 8 * bytes as u128 * NUM_NANOS_PER_SECOND;

        if num_nano_bits < nanos {
            return Bandwidth { bits_per_second: 1 };
        }

        Bandwidth {
            bits_per_second: u64::try_from(num_nano_bits / nanos)
                .unwrap_or(u64::MAX),
        }
    }

    pub const fn from_bytes_per_second(bytes_per_second: u64) -> Self {
        Bandwidth {
            bits_per_second: bytes_per_second.saturating_mul(8),
        }
    }

    pub const fn infinite() -> Self {
        Bandwidth {
            bits_per_second: u64::MAX,
        }
    }

    pub const fn zero() -> Self {
        Bandwidth { bits_per_second: 0 }
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.bits_per_second == u64::MAX
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.bits_per_second == 0
    }

    #[inline]
    pub const fn to_bits_per_second(self) -> u64 {
        self.bits_per_second
    }

    #[inline]
    pub const fn to_bytes_per_second(self) -> u64 {
        self.bits_per_second / 8
    }

    /// Time it takes to transfer `bytes` at this rate, rounded up to the
    /// nanosecond. Zero for a zero rate.
    pub fn transfer_time(self, bytes: ByteCount) -> Duration {
        if self.bits_per_second == 0 {
            return Duration::ZERO;
        }

        let nanos = (bytes as u128 * 8 * NUM_NANOS_PER_SECOND)
            .div_ceil(self.bits_per_second as u128);

        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Number of bytes transferred at this rate over `period`.
    pub fn bytes_in(self, period: Duration) -> ByteCount {
        let bytes = self.bits_per_second as u128 * period.as_nanos() /
            8 /
            NUM_NANOS_PER_SECOND;

        ByteCount::try_from(bytes).unwrap_or(ByteCount::MAX)
    }
}

impl std::fmt::Debug for Bandwidth {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.bits_per_second {
            u64::MAX => write!(f, "inf"),
            x if x < 1_000_000 => write!(f, "{:.2} Kbps", x as f64 / 1_000.),
            x if x < 1_000_000_000 => {
                write!(f, "{:.2} Mbps", x as f64 / 1_000_000.)
            },
            x => write!(f, "{:.2} Gbps", x as f64 / 1_000_000_000.),
        }
    }
}
