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

//! Packet pacing.
//!
//! A pacer decides when the next datagram may leave and how many bytes can
//! go out back to back. It is owned by the sender and only sees the bandwidth
//! estimate the sender hands it on every call.

mod estimate;
mod limiter;
mod rate;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

pub use self::estimate::EstimatePacer;
pub use self::rate::RatePacer;

use crate::bandwidth::Bandwidth;
use crate::clock::Clock;
use crate::config::PacerAlgorithm;
use crate::ByteCount;

/// Shortest delay the pacer asks for. Timers can't fire more precisely than
/// this.
pub const MIN_PACING_DELAY: Duration = Duration::from_millis(1);

/// Granularity of the timers driving the send loop.
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// When the pacer thinks is a good time to release the next packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTime {
    Immediate,
    At(Instant),
}

impl ReleaseTime {
    /// The [`Instant`] the next packet should be released, `None` if it can
    /// go now.
    #[inline]
    pub fn time(&self, now: Instant) -> Option<Instant> {
        match self {
            ReleaseTime::Immediate => None,
            ReleaseTime::At(other) => other.gt(&now).then_some(*other),
        }
    }

    #[inline]
    pub fn is_immediate(&self) -> bool {
        matches!(self, ReleaseTime::Immediate)
    }
}

#[derive(Debug)]
pub enum Pacer {
    BandwidthEstimate(EstimatePacer),
    TokenBucket(RatePacer),
}

impl Pacer {
    pub(crate) fn new(
        algo: PacerAlgorithm, max_datagram_size: ByteCount,
        initial_bandwidth: Bandwidth, initial_rate: Option<u64>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        match algo {
            PacerAlgorithm::BandwidthEstimate => Pacer::BandwidthEstimate(
                EstimatePacer::new(max_datagram_size, initial_bandwidth),
            ),

            PacerAlgorithm::TokenBucket => {
                let mut pacer = RatePacer::new(max_datagram_size, clock);

                if let Some(rate) = initial_rate {
                    pacer.set_rate(rate);
                }

                Pacer::TokenBucket(pacer)
            },
        }
    }

    pub(crate) fn sent_packet(
        &mut self, sent_time: Instant, size: ByteCount, bandwidth: Bandwidth,
    ) {
        match self {
            Pacer::BandwidthEstimate(p) =>
                p.sent_packet(sent_time, size, bandwidth),
            Pacer::TokenBucket(p) => p.sent_packet(sent_time, size),
        }
    }

    pub(crate) fn budget(&self, now: Instant, bandwidth: Bandwidth) -> ByteCount {
        match self {
            Pacer::BandwidthEstimate(p) => p.budget(now, bandwidth),
            Pacer::TokenBucket(p) => p.budget(now),
        }
    }

    pub(crate) fn time_until_send(
        &mut self, bandwidth: Bandwidth,
    ) -> ReleaseTime {
        match self {
            Pacer::BandwidthEstimate(p) => p.time_until_send(bandwidth),
            Pacer::TokenBucket(p) => p.time_until_send(),
        }
    }

    pub(crate) fn set_max_datagram_size(
        &mut self, max_datagram_size: ByteCount,
    ) {
        match self {
            Pacer::BandwidthEstimate(p) =>
                p.set_max_datagram_size(max_datagram_size),
            Pacer::TokenBucket(p) => p.set_max_datagram_size(max_datagram_size),
        }
    }

    /// Only the token bucket has a settable rate.
    pub(crate) fn set_rate(&mut self, bytes_per_second: u64) {
        match self {
            Pacer::BandwidthEstimate(_) => {
                trace!(
                    "ignoring pacer rate {bytes_per_second}, pacing follows \
                     the bandwidth estimate"
                );
            },

            Pacer::TokenBucket(p) => p.set_rate(bytes_per_second),
        }
    }
}
