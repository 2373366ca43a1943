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

//! CUBIC window growth (RFC 8312) in bytes.
//!
//! Time is tracked in 2^10 fractions of a second so that scaling can be done
//! with shifts, and the sender emulates `num_connections` Reno flows when
//! computing its backoff and TCP-friendly region.

use std::time::Duration;
use std::time::Instant;

use crate::ByteCount;

const DEFAULT_NUM_CONNECTIONS: u32 = 2;

/// 1024 * 1024^3, the first 1024 coming from 0.100^3 where 100ms is the
/// scaling round trip time.
const CUBE_SCALE: u32 = 40;

const CUBE_CONGESTION_WINDOW_SCALE: u128 = 410;

const DEFAULT_CUBIC_BACKOFF_FACTOR: f32 = 0.7;

/// Extra backoff applied to the remembered maximum when losing before
/// reaching it again, to give up bandwidth to competing flows.
const BETA_LAST_MAX: f32 = 0.85;

#[derive(Debug)]
pub(crate) struct Cubic {
    /// Number of Reno connections to emulate.
    pub(crate) num_connections: u32,

    /// Start of the current growth epoch, reset by losses and idle periods.
    epoch: Option<Instant>,

    /// Window just before the last loss, possibly reduced further for
    /// fairness.
    last_max_congestion_window: ByteCount,

    /// Bytes acknowledged since the last window update.
    acked_bytes_count: ByteCount,

    /// Reno-equivalent window used for the TCP friendly region.
    estimated_tcp_congestion_window: ByteCount,

    /// Plateau of the cubic curve.
    origin_point_congestion_window: ByteCount,

    /// Time to the plateau, in 2^10 fractions of a second.
    time_to_origin_point: u64,

    /// Most recent value of the cubic curve itself.
    last_target_congestion_window: ByteCount,

    max_datagram_size: ByteCount,
}

impl Cubic {
    pub(crate) fn new(max_datagram_size: ByteCount) -> Self {
        Cubic {
            num_connections: DEFAULT_NUM_CONNECTIONS,
            epoch: None,
            last_max_congestion_window: 0,
            acked_bytes_count: 0,
            estimated_tcp_congestion_window: 0,
            origin_point_congestion_window: 0,
            time_to_origin_point: 0,
            last_target_congestion_window: 0,
            max_datagram_size,
        }
    }

    pub(crate) fn set_max_datagram_size(&mut self, max_datagram_size: ByteCount) {
        self.max_datagram_size = max_datagram_size;
    }

    /// Stops the epoch clock so that an idle period does not count as time
    /// spent growing.
    pub(crate) fn on_application_limited(&mut self) {
        self.epoch = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Cubic {
            num_connections: self.num_connections,
            ..Cubic::new(self.max_datagram_size)
        };
    }

    fn cube_factor(&self) -> u64 {
        (1u64 << CUBE_SCALE) /
            CUBE_CONGESTION_WINDOW_SCALE as u64 /
            self.max_datagram_size.max(1)
    }

    /// Window multiplier on loss for an ensemble of `num_connections` Reno
    /// flows losing one packet.
    pub(crate) fn beta(&self) -> f32 {
        let n = self.num_connections as f32;
        (n - 1. + DEFAULT_CUBIC_BACKOFF_FACTOR) / n
    }

    /// TCP friendly alpha (Section 3.3 of the CUBIC paper), where beta is the
    /// window multiplier, i.e. 1 - beta of the paper.
    pub(crate) fn alpha(&self) -> f32 {
        let beta = self.beta();
        let n = self.num_connections as f32;
        3. * n * n * (1. - beta) / (1. + beta)
    }

    fn beta_last_max(&self) -> f32 {
        let n = self.num_connections as f32;
        (n - 1. + BETA_LAST_MAX) / n
    }

    /// Computes the window after `acked_bytes` were acknowledged at
    /// `event_time`.
    pub(crate) fn window_after_ack(
        &mut self, acked_bytes: ByteCount, current_window: ByteCount,
        min_rtt: Duration, event_time: Instant,
    ) -> ByteCount {
        self.acked_bytes_count =
            self.acked_bytes_count.saturating_add(acked_bytes);

        let epoch = match self.epoch {
            Some(epoch) => epoch,

            None => {
                self.acked_bytes_count = acked_bytes;
                self.start_epoch(current_window, event_time);
                event_time
            },
        };

        let elapsed = (event_time + min_rtt).saturating_duration_since(epoch);
        let elapsed_time = ((elapsed.as_micros() << 10) / 1_000_000) as u64;

        // Kept unsigned, like the kernel does, with the sign carried
        // separately.
        let offset = self.time_to_origin_point.abs_diff(elapsed_time) as u128;

        let delta_window = (CUBE_CONGESTION_WINDOW_SCALE *
            offset *
            offset *
            offset *
            self.max_datagram_size as u128) >>
            CUBE_SCALE;
        let delta_window =
            ByteCount::try_from(delta_window).unwrap_or(ByteCount::MAX);

        let target_window = if elapsed_time > self.time_to_origin_point {
            self.origin_point_congestion_window.saturating_add(delta_window)
        } else {
            self.origin_point_congestion_window.saturating_sub(delta_window)
        };

        // Never grow by more than half the acked bytes.
        let target_window = target_window
            .min(current_window.saturating_add(self.acked_bytes_count / 2));

        // Grow the Reno estimate by roughly alpha MSS per estimated window
        // acked. The float conversion order matters for small windows.
        let increment = self.acked_bytes_count as f32 *
            (self.alpha() * self.max_datagram_size as f32) /
            self.estimated_tcp_congestion_window.max(1) as f32;

        self.estimated_tcp_congestion_window =
            (self.estimated_tcp_congestion_window as f32 + increment)
                as ByteCount;

        self.acked_bytes_count = 0;

        self.last_target_congestion_window = target_window;

        // Whichever of the cubic and the Reno estimate is faster.
        target_window.max(self.estimated_tcp_congestion_window)
    }

    fn start_epoch(&mut self, current_window: ByteCount, now: Instant) {
        self.epoch = Some(now);

        self.estimated_tcp_congestion_window = current_window;

        if self.last_max_congestion_window <= current_window {
            self.time_to_origin_point = 0;
            self.origin_point_congestion_window = current_window;
        } else {
            let distance = self.last_max_congestion_window - current_window;

            self.time_to_origin_point =
                f32::cbrt((self.cube_factor().saturating_mul(distance)) as f32)
                    as u64;
            self.origin_point_congestion_window = self.last_max_congestion_window;
        }
    }

    /// Computes the window after a loss event.
    pub(crate) fn window_after_loss(
        &mut self, current_window: ByteCount,
    ) -> ByteCount {
        // Byte-mode Reno slightly under-estimates the window, so falling short
        // of the last maximum by less than one datagram does not count as
        // competing traffic.
        if current_window.saturating_add(self.max_datagram_size) <
            self.last_max_congestion_window
        {
            self.last_max_congestion_window =
                (self.beta_last_max() * current_window as f32) as ByteCount;
        } else {
            self.last_max_congestion_window = current_window;
        }

        self.epoch = None;

        (current_window as f32 * self.beta()) as ByteCount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_SEGMENT_SIZE: ByteCount = 1460;

    const HUNDRED_MS: Duration = Duration::from_millis(100);

    const BETA: f32 = 0.7;
    const NUM_CONNECTIONS: u32 = DEFAULT_NUM_CONNECTIONS;
    const N_CONNECTION_BETA: f32 =
        (NUM_CONNECTIONS as f32 - 1. + BETA) / NUM_CONNECTIONS as f32;
    const N_CONNECTION_ALPHA: f32 = (3 * NUM_CONNECTIONS * NUM_CONNECTIONS)
        as f32 *
        (1. - N_CONNECTION_BETA) /
        (1. + N_CONNECTION_BETA);
    const N_CONNECTION_BETA_LAST_MAX: f32 =
        (NUM_CONNECTIONS as f32 - 1. + BETA_LAST_MAX) / NUM_CONNECTIONS as f32;

    const MAX_CUBIC_TIME_INTERVAL: Duration = Duration::from_millis(30);

    fn reno_window_after_ack(current: ByteCount) -> ByteCount {
        let mss = MAX_SEGMENT_SIZE as f32;
        let current = current as f32;
        (current + mss * (N_CONNECTION_ALPHA * mss) / current) as ByteCount
    }

    fn convex_window(
        initial: ByteCount, rtt: Duration, elapsed_time: Duration,
    ) -> ByteCount {
        let offset =
            (((elapsed_time + rtt).as_micros() as u64) << 10) / 1_000_000;
        let delta = ((410 * offset * offset * offset) * MAX_SEGMENT_SIZE) >> 40;
        initial + delta
    }

    #[test]
    fn parameters() {
        let cubic = Cubic::new(MAX_SEGMENT_SIZE);

        assert_eq!(cubic.beta(), N_CONNECTION_BETA);
        assert_eq!(cubic.alpha(), N_CONNECTION_ALPHA);
        assert_eq!(cubic.beta_last_max(), N_CONNECTION_BETA_LAST_MAX);
    }

    #[test]
    fn above_origin_with_tighter_bounds() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        let mut clock = Instant::now();

        let rtt_min = HUNDRED_MS;
        let rtt_min_s = rtt_min.as_secs_f32();
        let mut current = 10 * MAX_SEGMENT_SIZE;
        let initial = current;
        let start = clock;

        let expected_first = reno_window_after_ack(current);
        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, start);
        assert_eq!(expected_first, current);

        // Reno phase, until the point where the cubic and the Reno curves
        // meet.
        let max_reno_rtts =
            (N_CONNECTION_ALPHA / (0.4 * rtt_min_s * rtt_min_s * rtt_min_s))
                .sqrt() -
                2.;

        for _ in 0..max_reno_rtts as usize {
            // One MSS more, roughly, for every window / alpha acks.
            let acks_this_epoch = ((current / MAX_SEGMENT_SIZE) as f32 /
                N_CONNECTION_ALPHA) as usize;
            let initial_this_epoch = current;

            for _ in 0..acks_this_epoch {
                let expected = reno_window_after_ack(current);
                current = cubic.window_after_ack(
                    MAX_SEGMENT_SIZE,
                    current,
                    rtt_min,
                    clock,
                );
                assert_eq!(expected, current);
            }

            // Byte-wise Reno is an estimate and may be off by up to half a
            // packet for small windows.
            let change = current - initial_this_epoch;
            assert!(change.abs_diff(MAX_SEGMENT_SIZE) < MAX_SEGMENT_SIZE / 2);

            clock += HUNDRED_MS;
        }

        for _ in 0..54 {
            let acks_this_epoch = current / MAX_SEGMENT_SIZE;
            let interval = Duration::from_micros(
                HUNDRED_MS.as_micros() as u64 / acks_this_epoch,
            );

            for _ in 0..acks_this_epoch {
                clock += interval;
                current = cubic.window_after_ack(
                    MAX_SEGMENT_SIZE,
                    current,
                    rtt_min,
                    clock,
                );

                // Every per-ack update is a small cubic update.
                let expected = convex_window(initial, rtt_min, clock - start);
                assert_eq!(expected, current);
            }
        }

        let expected = convex_window(initial, rtt_min, clock - start);
        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);
        assert_eq!(expected, current);
    }

    #[test]
    fn above_origin_fine_grained_cubing() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        let mut clock = Instant::now();

        // A large window keeps Reno from overtaking cubic.
        let mut current = 1000 * MAX_SEGMENT_SIZE;
        let initial = current;
        let rtt_min = HUNDRED_MS;
        let start = clock;

        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);

        clock += Duration::from_millis(600);
        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);

        // Only non-zero, less than packet sized increases from here.
        for _ in 0..100 {
            clock += Duration::from_millis(10);

            let expected = convex_window(initial, rtt_min, clock - start);
            let next =
                cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);

            assert_eq!(expected, next);
            assert!(next > current);
            assert!(MAX_SEGMENT_SIZE / 10 > next - current);

            current = next;
        }
    }

    #[test]
    fn per_ack_updates() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        let mut clock = Instant::now();

        // Large window and RTT so the first increase is a cubic one.
        let initial_packets = 150;
        let mut current = initial_packets * MAX_SEGMENT_SIZE;
        let rtt_min = Duration::from_millis(350);

        let mut reno = reno_window_after_ack(current);
        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);
        let initial = current;

        // Acks for a whole window arrive faster than the cubic interval.
        let max_acks = (initial_packets as f32 / N_CONNECTION_ALPHA) as u64;
        let interval = Duration::from_micros(
            MAX_CUBIC_TIME_INTERVAL.as_micros() as u64 / (max_acks + 1),
        );

        // The first increase is below one byte, so the window stays put.
        clock += interval;
        reno = reno_window_after_ack(reno);
        assert_eq!(
            current,
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock)
        );

        // But it keeps growing on every ack after that.
        for _ in 1..max_acks {
            clock += interval;
            let next =
                cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);
            reno = reno_window_after_ack(reno);

            assert!(current < next);
            assert_eq!(reno, next);

            current = next;
        }

        // Nearly one packet after a whole window of acks.
        let minimum_expected_increase = MAX_SEGMENT_SIZE * 9 / 10;
        assert!(minimum_expected_increase + initial < current);
    }

    #[test]
    fn loss_events() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        let clock = Instant::now();

        let rtt_min = HUNDRED_MS;
        let mut current = 422 * MAX_SEGMENT_SIZE;
        let mut expected = reno_window_after_ack(current);
        assert_eq!(
            expected,
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock)
        );

        // First loss: the last max is the window before the loss.
        let mut pre_loss = current;
        assert_eq!(0, cubic.last_max_congestion_window);

        expected = (current as f32 * N_CONNECTION_BETA) as ByteCount;
        assert_eq!(expected, cubic.window_after_loss(current));
        assert_eq!(pre_loss, cubic.last_max_congestion_window);
        current = expected;

        // Second loss before getting back to the last max: the last max is
        // backed off further.
        pre_loss = current;
        expected = (current as f32 * N_CONNECTION_BETA) as ByteCount;
        assert_eq!(expected, cubic.window_after_loss(current));
        current = expected;

        assert!(pre_loss > cubic.last_max_congestion_window);
        let mut expected_last_max =
            (pre_loss as f32 * N_CONNECTION_BETA_LAST_MAX) as ByteCount;
        assert_eq!(expected_last_max, cubic.last_max_congestion_window);
        assert!(expected < cubic.last_max_congestion_window);

        // Growing again stays below the origin.
        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);
        assert!(cubic.last_max_congestion_window > current);

        // Losing right below the last max keeps the window as the new max.
        current = cubic.last_max_congestion_window - 1;
        pre_loss = current;
        expected = (current as f32 * N_CONNECTION_BETA) as ByteCount;
        assert_eq!(expected, cubic.window_after_loss(current));
        expected_last_max = pre_loss;
        assert_eq!(expected_last_max, cubic.last_max_congestion_window);
    }

    #[test]
    fn below_origin() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        let mut clock = Instant::now();

        let rtt_min = HUNDRED_MS;
        let mut current = 422 * MAX_SEGMENT_SIZE;
        let mut expected = reno_window_after_ack(current);
        assert_eq!(
            expected,
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock)
        );

        expected = (current as f32 * N_CONNECTION_BETA) as ByteCount;
        assert_eq!(expected, cubic.window_after_loss(current));
        current = expected;

        // Starts the epoch.
        current =
            cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);

        // Concave growth.
        for _ in 0..40 {
            clock += HUNDRED_MS;
            current =
                cubic.window_after_ack(MAX_SEGMENT_SIZE, current, rtt_min, clock);
        }

        assert_eq!(553_632, current);
    }

    #[test]
    fn application_limited_restarts_epoch() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        let clock = Instant::now();
        let current = 100 * MAX_SEGMENT_SIZE;

        cubic.window_after_ack(MAX_SEGMENT_SIZE, current, HUNDRED_MS, clock);
        assert_eq!(cubic.epoch, Some(clock));

        cubic.on_application_limited();
        assert_eq!(cubic.epoch, None);

        // The next ack starts a new epoch at its own time.
        let later = clock + Duration::from_secs(10);
        cubic.window_after_ack(MAX_SEGMENT_SIZE, current, HUNDRED_MS, later);
        assert_eq!(cubic.epoch, Some(later));
    }

    #[test]
    fn reset_clears_origin() {
        let mut cubic = Cubic::new(MAX_SEGMENT_SIZE);
        cubic.num_connections = 1;

        cubic.window_after_loss(100 * MAX_SEGMENT_SIZE);
        assert_eq!(cubic.last_max_congestion_window, 100 * MAX_SEGMENT_SIZE);

        cubic.reset();
        assert_eq!(cubic.last_max_congestion_window, 0);
        assert_eq!(cubic.epoch, None);
        assert_eq!(cubic.num_connections, 1);
    }
}
