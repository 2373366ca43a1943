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

use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::ByteCount;

use super::limiter::Limiter;
use super::ReleaseTime;

/// Rate used until one is set, in bits per second.
const DEFAULT_RATE: f64 = 750_000.;

/// Burst used until a rate is set, in bits.
const DEFAULT_BURST: u64 = 1500 * 8;

/// The burst, in bits, is eight times the bits sent at the configured rate in
/// 1/200th of a second: 40ms worth of data.
const BURST_DIVISOR: u64 = 200;

/// Token bucket pacer.
///
/// Tokens are bits. The rate is only ever set from outside, through
/// [`RatePacer::set_rate()`], and does not follow the congestion window.
#[derive(Debug)]
pub struct RatePacer {
    limiter: Limiter,

    max_datagram_size: ByteCount,

    clock: Arc<dyn Clock>,
}

impl RatePacer {
    pub(crate) fn new(
        max_datagram_size: ByteCount, clock: Arc<dyn Clock>,
    ) -> Self {
        RatePacer {
            limiter: Limiter::new(DEFAULT_RATE, DEFAULT_BURST),
            max_datagram_size,
            clock,
        }
    }

    /// Takes the tokens for a packet of `size` bytes sent at `sent_time`.
    ///
    /// Packets larger than the burst are let through without taking tokens.
    pub(crate) fn sent_packet(&mut self, sent_time: Instant, size: ByteCount) {
        let r = self.limiter.reserve_n(sent_time, size.saturating_mul(8));

        if !r.ok() {
            self.limiter.cancel_at(sent_time, &r);
        }
    }

    /// Bytes that can be sent at `now` without waiting.
    pub(crate) fn budget(&self, now: Instant) -> ByteCount {
        let tokens = self.limiter.tokens_at(now);

        // A negative balance is no budget at all.
        (tokens / 8.).max(0.) as ByteCount
    }

    /// When a full sized datagram can be sent.
    ///
    /// Only probes the bucket, calling this repeatedly without sending returns
    /// the same time.
    pub(crate) fn time_until_send(&mut self) -> ReleaseTime {
        let now = self.clock.now();

        let r = self
            .limiter
            .reserve_n(now, self.max_datagram_size.saturating_mul(8));

        if !r.ok() {
            trace!(
                "pacer burst of {} bits cannot fit a {} byte datagram",
                self.limiter.burst(),
                self.max_datagram_size
            );

            return ReleaseTime::Immediate;
        }

        let delay = r.delay_from(now);
        self.limiter.cancel_at(now, &r);

        if delay.is_zero() {
            return ReleaseTime::Immediate;
        }

        ReleaseTime::At(now + delay)
    }

    pub(crate) fn set_max_datagram_size(&mut self, max_datagram_size: ByteCount) {
        let fitted = self.burst_fits_datagram();

        self.max_datagram_size = max_datagram_size;

        if fitted {
            self.warn_if_burst_too_small();
        }
    }

    /// Sets the rate, in bytes per second. The burst follows the rate.
    pub(crate) fn set_rate(&mut self, bytes_per_second: u64) {
        let now = self.clock.now();
        let rate_bits = bytes_per_second.saturating_mul(8);

        self.limiter.set_limit_at(now, rate_bits as f64);
        let fitted = self.burst_fits_datagram();

        self.limiter
            .set_burst_at(now, 8 * (rate_bits / BURST_DIVISOR));

        if fitted {
            self.warn_if_burst_too_small();
        }
    }

    /// Whether a full sized datagram can ever be paced. When it can't,
    /// packets are released immediately.
    pub fn burst_fits_datagram(&self) -> bool {
        self.max_datagram_size.saturating_mul(8) <= self.limiter.burst()
    }

    /// Warns once, when the burst stops fitting a datagram.
    fn warn_if_burst_too_small(&self) {
        if !self.burst_fits_datagram() {
            warn!(
                "pacer burst of {} bits cannot fit a {} byte datagram, \
                 pacing is disabled",
                self.limiter.burst(),
                self.max_datagram_size
            );
        }
    }

    /// Current rate, in bits per second.
    pub fn rate(&self) -> f64 {
        self.limiter.limit()
    }

    /// Current burst, in bits.
    pub fn burst(&self) -> u64 {
        self.limiter.burst()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::testing::ManualClock;

    const MDS: ByteCount = 1200;

    fn pacer() -> (RatePacer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (RatePacer::new(MDS, clock.clone()), clock)
    }

    #[test]
    fn defaults() {
        let (pacer, clock) = pacer();

        assert_eq!(pacer.rate(), 750_000.);
        assert_eq!(pacer.burst(), 12_000);
        assert_eq!(pacer.budget(clock.now()), 1500);
    }

    #[test]
    fn probing_does_not_consume_tokens() {
        let (mut pacer, clock) = pacer();
        let now = clock.now();

        assert_eq!(pacer.time_until_send(), ReleaseTime::Immediate);
        assert_eq!(pacer.time_until_send(), ReleaseTime::Immediate);
        assert_eq!(pacer.budget(now), 1500);

        pacer.sent_packet(now, MDS);
        assert_eq!(pacer.budget(now), 300);

        // 900 bytes short at 93750 bytes/s.
        let first = pacer.time_until_send();
        let second = pacer.time_until_send();
        assert_eq!(first, ReleaseTime::At(now + Duration::from_micros(9600)));
        assert_eq!(first, second);
        assert_eq!(pacer.budget(now), 300);
    }

    #[test]
    fn refills_over_time() {
        let (mut pacer, clock) = pacer();
        let now = clock.now();

        pacer.sent_packet(now, MDS);

        clock.advance(Duration::from_micros(9600));
        assert_eq!(pacer.time_until_send(), ReleaseTime::Immediate);
        assert_eq!(pacer.budget(clock.now()), MDS);
    }

    #[test]
    fn late_reported_send_only_drains() {
        let (mut pacer, clock) = pacer();
        let start = clock.now();

        pacer.sent_packet(start, 1500);

        clock.advance(Duration::from_millis(8));
        pacer.time_until_send();

        // 8ms at 750kbit/s.
        let now = clock.now();
        assert_eq!(pacer.budget(now), 750);

        // A send stamped before the last query still comes out of the current
        // budget.
        pacer.sent_packet(start + Duration::from_millis(4), 300);
        assert_eq!(pacer.budget(now), 450);
    }

    #[test]
    fn set_rate_recomputes_burst() {
        let (mut pacer, clock) = pacer();

        pacer.set_rate(1_500_000);

        // 40ms at 12Mbit/s.
        assert_eq!(pacer.rate(), 12_000_000.);
        assert_eq!(pacer.burst(), 480_000);
        assert_eq!(pacer.burst() as f64 / pacer.rate(), 0.04);

        // The balance only grows to the new burst over time.
        clock.advance(Duration::from_secs(1));
        assert_eq!(pacer.budget(clock.now()), 60_000);
    }

    #[test]
    fn burst_smaller_than_datagram() {
        let (mut pacer, _) = pacer();

        assert!(pacer.burst_fits_datagram());

        // 1000 bytes/s gives a 320 bit burst.
        pacer.set_rate(1000);
        assert_eq!(pacer.burst(), 320);
        assert!(!pacer.burst_fits_datagram());

        // Asking repeatedly is fine, every packet is let through.
        for _ in 0..3 {
            assert_eq!(pacer.time_until_send(), ReleaseTime::Immediate);
        }

        // 30KB/s gives 9600 bits, exactly one datagram.
        pacer.set_rate(30_000);
        assert!(pacer.burst_fits_datagram());

        pacer.set_max_datagram_size(1201);
        assert!(!pacer.burst_fits_datagram());
    }

    #[test]
    fn oversized_packet_takes_no_tokens() {
        let (mut pacer, clock) = pacer();
        let now = clock.now();

        pacer.sent_packet(now, 2000);
        assert_eq!(pacer.budget(now), 1500);
    }
}
