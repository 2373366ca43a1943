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

//! Read-only view of the connection's round-trip time measurements.
//!
//! RTT estimation belongs to the loss recovery layer. The congestion
//! controller only reads the latest, smoothed and minimum samples from here;
//! `update_rtt()` exists so that the owner of the statistics (and tests) can
//! feed new samples in.

use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct RttStats {
    latest_rtt: Duration,

    smoothed_rtt: Option<Duration>,

    min_rtt: Duration,
}

impl RttStats {
    /// Records a new RTT sample. The smoothed RTT moves an eighth of the way
    /// towards it.
    pub fn update_rtt(&mut self, latest_rtt: Duration) {
        self.latest_rtt = latest_rtt;

        match self.smoothed_rtt {
            None => {
                self.min_rtt = latest_rtt;
                self.smoothed_rtt = Some(latest_rtt);
            },

            Some(srtt) => {
                self.min_rtt = self.min_rtt.min(latest_rtt);
                self.smoothed_rtt =
                    Some(srtt.mul_f64(7.0 / 8.0) + latest_rtt.mul_f64(1.0 / 8.0));
            },
        }
    }

    /// The most recent sample, or zero before the first one.
    #[inline]
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// The smoothed RTT, or zero if no sample was taken yet.
    #[inline]
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.unwrap_or(Duration::ZERO)
    }

    /// The minimum RTT observed, or zero if no sample was taken yet.
    #[inline]
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }
}
