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

use std::time::Instant;

use crate::bandwidth::Bandwidth;
use crate::ByteCount;

use super::ReleaseTime;
use super::MIN_PACING_DELAY;
use super::TIMER_GRANULARITY;

/// Packets that can always be sent back to back.
const MAX_BURST_PACKETS: ByteCount = 10;

/// Leaky bucket pacer driven by the sender's bandwidth estimate.
///
/// The estimate is not stored, every call gets the current one from the
/// sender.
#[derive(Debug)]
pub struct EstimatePacer {
    budget_at_last_sent: ByteCount,

    last_sent_time: Option<Instant>,

    max_datagram_size: ByteCount,
}

/// Pacing rate. Slightly above the estimate, so that RTT variations don't
/// leave the window under-used: packets go out as acks arrive rather than
/// when timers fire.
fn adjusted_bandwidth(bandwidth: Bandwidth) -> Bandwidth {
    bandwidth * 1.25
}

impl EstimatePacer {
    pub(crate) fn new(
        max_datagram_size: ByteCount, initial_bandwidth: Bandwidth,
    ) -> Self {
        let mut pacer = EstimatePacer {
            budget_at_last_sent: 0,
            last_sent_time: None,
            max_datagram_size,
        };

        pacer.budget_at_last_sent = pacer.max_burst_size(initial_bandwidth);

        pacer
    }

    pub(crate) fn sent_packet(
        &mut self, sent_time: Instant, size: ByteCount, bandwidth: Bandwidth,
    ) {
        let budget = self.budget(sent_time, bandwidth);

        self.budget_at_last_sent = budget.saturating_sub(size);
        self.last_sent_time = Some(sent_time);
    }

    pub(crate) fn budget(&self, now: Instant, bandwidth: Bandwidth) -> ByteCount {
        let Some(last_sent_time) = self.last_sent_time else {
            return self.max_burst_size(bandwidth);
        };

        let elapsed = now.saturating_duration_since(last_sent_time);
        let refill = adjusted_bandwidth(bandwidth).bytes_in(elapsed);

        self.max_burst_size(bandwidth)
            .min(self.budget_at_last_sent.saturating_add(refill))
    }

    fn max_burst_size(&self, bandwidth: Bandwidth) -> ByteCount {
        adjusted_bandwidth(bandwidth)
            .bytes_in(MIN_PACING_DELAY + TIMER_GRANULARITY)
            .max(MAX_BURST_PACKETS * self.max_datagram_size)
    }

    pub(crate) fn time_until_send(&self, bandwidth: Bandwidth) -> ReleaseTime {
        if self.budget_at_last_sent >= self.max_datagram_size {
            return ReleaseTime::Immediate;
        }

        let Some(last_sent_time) = self.last_sent_time else {
            return ReleaseTime::Immediate;
        };

        let bandwidth = adjusted_bandwidth(bandwidth);

        // Nothing can be scheduled without a rate, wait as long as a timer
        // would anyway.
        if bandwidth.is_zero() {
            return ReleaseTime::At(last_sent_time + MIN_PACING_DELAY);
        }

        let missing = self.max_datagram_size - self.budget_at_last_sent;
        let delay = bandwidth.transfer_time(missing).max(MIN_PACING_DELAY);

        let at = last_sent_time
            .checked_add(delay)
            .unwrap_or(last_sent_time + MIN_PACING_DELAY);

        ReleaseTime::At(at)
    }

    pub(crate) fn set_max_datagram_size(&mut self, max_datagram_size: ByteCount) {
        self.max_datagram_size = max_datagram_size;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const MDS: ByteCount = 1200;

    // 1,000,000 bytes/s paced at 1,250,000 bytes/s.
    fn bandwidth() -> Bandwidth {
        Bandwidth::from_bytes_per_second(1_000_000)
    }

    #[test]
    fn initial_burst() {
        let now = Instant::now();
        let pacer = EstimatePacer::new(MDS, bandwidth());

        // 2ms at 1.25MB/s is 2500 bytes, less than 10 datagrams.
        assert_eq!(pacer.budget(now, bandwidth()), 10 * MDS);
        assert_eq!(pacer.time_until_send(bandwidth()), ReleaseTime::Immediate);

        let fast = Bandwidth::from_bytes_per_second(100_000_000);
        assert_eq!(pacer.budget(now, fast), 250_000);
    }

    #[test]
    fn budget_drains_and_refills() {
        let now = Instant::now();
        let mut pacer = EstimatePacer::new(MDS, bandwidth());

        for _ in 0..10 {
            assert_eq!(
                pacer.time_until_send(bandwidth()),
                ReleaseTime::Immediate
            );
            pacer.sent_packet(now, MDS, bandwidth());
        }

        assert_eq!(pacer.budget(now, bandwidth()), 0);

        // 1200 bytes at 1.25MB/s take 960us, rounded up to the minimum
        // delay.
        assert_eq!(
            pacer.time_until_send(bandwidth()),
            ReleaseTime::At(now + MIN_PACING_DELAY)
        );

        let later = now + Duration::from_millis(4);
        assert_eq!(pacer.budget(later, bandwidth()), 5000);

        // Never more than the burst.
        let much_later = now + Duration::from_secs(1);
        assert_eq!(pacer.budget(much_later, bandwidth()), 10 * MDS);
    }

    #[test]
    fn slow_rate_delay() {
        let now = Instant::now();
        let mut pacer = EstimatePacer::new(MDS, bandwidth());

        pacer.sent_packet(now, 10 * MDS, bandwidth());

        // At 100KB/s, 125KB/s adjusted, 1200 bytes take 9.6ms.
        let slow = Bandwidth::from_bytes_per_second(100_000);
        assert_eq!(
            pacer.time_until_send(slow),
            ReleaseTime::At(now + Duration::from_micros(9600))
        );
    }

    #[test]
    fn delay_rounds_up() {
        let now = Instant::now();
        let mut pacer = EstimatePacer::new(MDS, bandwidth());

        pacer.sent_packet(now, 10 * MDS, bandwidth());

        // Paced at 37501.25 bytes/s, 1200 bytes are not a whole number of
        // nanoseconds.
        let odd = Bandwidth::from_bytes_per_second(30_001);
        let ReleaseTime::At(at) = pacer.time_until_send(odd) else {
            panic!("expected a release time");
        };

        let delay = at - now;
        assert!(adjusted_bandwidth(odd).bytes_in(delay) >= MDS);
    }

    #[test]
    fn infinite_bandwidth_does_not_overflow() {
        let now = Instant::now();
        let mut pacer = EstimatePacer::new(MDS, Bandwidth::infinite());

        pacer.sent_packet(now, MDS, Bandwidth::infinite());
        let budget =
            pacer.budget(now + Duration::from_secs(3600), Bandwidth::infinite());

        assert!(budget >= MDS);
        assert_eq!(
            pacer.time_until_send(Bandwidth::infinite()),
            ReleaseTime::Immediate
        );
    }

    #[test]
    fn zero_bandwidth() {
        let now = Instant::now();
        let mut pacer = EstimatePacer::new(MDS, Bandwidth::zero());

        pacer.sent_packet(now, 10 * MDS, Bandwidth::zero());

        let later = now + Duration::from_secs(1);
        assert_eq!(pacer.budget(later, Bandwidth::zero()), 0);
        assert_eq!(
            pacer.time_until_send(Bandwidth::zero()),
            ReleaseTime::At(now + MIN_PACING_DELAY)
        );
    }
}
