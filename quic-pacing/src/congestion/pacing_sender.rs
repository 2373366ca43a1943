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

//! Pacing-centric sender.
//!
//! A Reno or CUBIC congestion window is maintained exactly like a window
//! based sender would, but the connection never sees it: the window only
//! feeds the bandwidth estimate that drives the pacer. Towards the connection
//! the sender reports an unlimited window and never claims to be in slow
//! start or recovery.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use super::cubic::Cubic;
use super::hybrid_slow_start::HybridSlowStart;
use super::CongestionControl;
use super::MAX_BURST_PACKETS;
use super::MIN_CONGESTION_WINDOW_PACKETS;
use super::RENO_BETA;
use crate::bandwidth::Bandwidth;
use crate::clock::Clock;
use crate::config::Config;
use crate::config::ZeroRttBandwidth;
use crate::pacer::Pacer;
use crate::pacer::ReleaseTime;
use crate::rtt::RttStats;
use crate::state::CongestionState;
use crate::state::StateObserver;
use crate::state::StateTracker;
use crate::ByteCount;
use crate::PacketNumber;
use crate::MAX_BYTE_COUNT;

/// Counters of the window decisions taken by a [`PacingSender`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SenderStats {
    /// Loss events that reduced the window.
    pub cutbacks: usize,

    /// Losses of packets sent before the last cutback, which are part of
    /// the same loss event.
    pub losses_ignored: usize,

    /// Times slow start was left because of an RTT increase.
    pub slow_start_exits: usize,

    /// Retransmission timeouts that collapsed the window.
    pub rto_collapses: usize,

    pub migrations: usize,

    /// Whether the sender was in slow start when the last cutback happened.
    pub last_cutback_exited_slow_start: bool,
}

pub struct PacingSender {
    hybrid_slow_start: HybridSlowStart,

    cubic: Cubic,

    pacer: Pacer,

    /// Reno window growth instead of CUBIC.
    reno: bool,

    largest_sent_packet_number: Option<PacketNumber>,

    largest_acked_packet_number: Option<PacketNumber>,

    /// Largest packet sent when the window was last cut back. Losses up to
    /// this packet belong to that loss event.
    largest_sent_at_last_cutback: Option<PacketNumber>,

    /// Event time and prior bytes in flight of the last ACK frame, which all
    /// packets acknowledged by that frame share.
    last_ack_frame: Option<(Instant, ByteCount)>,

    congestion_window: ByteCount,

    slow_start_threshold: ByteCount,

    /// ACK counter for Reno congestion avoidance.
    num_acked_packets: u64,

    initial_congestion_window: ByteCount,

    initial_max_congestion_window: ByteCount,

    max_congestion_window_packets: ByteCount,

    max_datagram_size: ByteCount,

    zero_rtt_bandwidth: ZeroRttBandwidth,

    state: StateTracker,

    stats: SenderStats,

    trace_id: String,
}

/// Bandwidth of `window` bytes per `srtt`, or what the policy says when no
/// RTT is known.
fn bandwidth_from_window(
    window: ByteCount, srtt: Duration, policy: ZeroRttBandwidth,
) -> Bandwidth {
    if !srtt.is_zero() {
        return Bandwidth::from_bytes_and_time_delta(window, srtt);
    }

    match policy {
        ZeroRttBandwidth::Infinite => Bandwidth::infinite(),

        ZeroRttBandwidth::FloorRtt(rtt) =>
            Bandwidth::from_bytes_and_time_delta(window, rtt),
    }
}

impl PacingSender {
    pub(crate) fn new(
        config: &Config, reno: bool, clock: Arc<dyn Clock>,
        observer: Option<Box<dyn StateObserver>>,
    ) -> Self {
        let max_datagram_size = config.max_datagram_size;

        let initial_congestion_window = max_datagram_size.saturating_mul(
            config.initial_congestion_window_packets as ByteCount,
        );

        let max_congestion_window_packets =
            config.max_congestion_window_packets as ByteCount;

        let initial_max_congestion_window =
            max_datagram_size.saturating_mul(max_congestion_window_packets);

        let pacer = Pacer::new(
            config.pacer,
            max_datagram_size,
            bandwidth_from_window(
                initial_congestion_window,
                Duration::ZERO,
                config.zero_rtt_bandwidth,
            ),
            config.initial_pacing_rate,
            clock,
        );

        let mut sender = PacingSender {
            hybrid_slow_start: HybridSlowStart::default(),
            cubic: Cubic::new(max_datagram_size),
            pacer,
            reno,
            largest_sent_packet_number: None,
            largest_acked_packet_number: None,
            largest_sent_at_last_cutback: None,
            last_ack_frame: None,
            congestion_window: initial_congestion_window,
            slow_start_threshold: MAX_BYTE_COUNT,
            num_acked_packets: 0,
            initial_congestion_window,
            initial_max_congestion_window,
            max_congestion_window_packets,
            max_datagram_size,
            zero_rtt_bandwidth: config.zero_rtt_bandwidth,
            state: StateTracker::new(observer),
            stats: SenderStats::default(),
            trace_id: String::new(),
        };

        sender.on_state(CongestionState::SlowStart);

        sender
    }

    /// Sets the prefix of this sender's log lines, usually the connection's
    /// trace ID.
    pub fn set_trace_id(&mut self, trace_id: &str) {
        self.trace_id = trace_id.to_string();
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn is_reno(&self) -> bool {
        self.reno
    }

    /// The congestion window driving the bandwidth estimate.
    pub fn internal_congestion_window(&self) -> ByteCount {
        self.congestion_window
    }

    pub fn slow_start_threshold(&self) -> ByteCount {
        self.slow_start_threshold
    }

    /// Whether the window is growing exponentially.
    pub fn internal_in_slow_start(&self) -> bool {
        self.congestion_window < self.slow_start_threshold
    }

    /// Whether acks are still for packets sent before the last cutback.
    pub fn internal_in_recovery(&self) -> bool {
        matches!(
            (self.largest_acked_packet_number, self.largest_sent_at_last_cutback),
            (Some(acked), Some(cutback)) if acked <= cutback
        )
    }

    pub fn max_datagram_size(&self) -> ByteCount {
        self.max_datagram_size
    }

    /// The last congestion state announced.
    pub fn congestion_state(&self) -> Option<CongestionState> {
        self.state.last()
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    fn max_congestion_window(&self) -> ByteCount {
        self.max_datagram_size
            .saturating_mul(self.max_congestion_window_packets)
    }

    fn min_congestion_window(&self) -> ByteCount {
        self.max_datagram_size
            .saturating_mul(MIN_CONGESTION_WINDOW_PACKETS)
    }

    fn on_state(&mut self, new: CongestionState) {
        if self.state.update(new) {
            trace!("{} congestion state {}: {:?}", self.trace_id, new, self);
        }
    }

    /// Whether the sender is close enough to using the whole window for the
    /// window to be allowed to grow.
    fn is_cwnd_limited(&self, bytes_in_flight: ByteCount) -> bool {
        let congestion_window = self.congestion_window;

        if bytes_in_flight >= congestion_window {
            return true;
        }

        let available_bytes = congestion_window - bytes_in_flight;
        let slow_start_limited = self.internal_in_slow_start() &&
            bytes_in_flight > congestion_window / 2;

        slow_start_limited ||
            available_bytes <=
                MAX_BURST_PACKETS.saturating_mul(self.max_datagram_size)
    }

    /// Grows the window for one acked packet. QUIC acks every packet
    /// separately, so there is no need to track how many packets an ack
    /// covers.
    fn maybe_increase_cwnd(
        &mut self, acked_bytes: ByteCount, prior_in_flight: ByteCount,
        event_time: Instant, rtt_stats: &RttStats,
    ) {
        if !self.is_cwnd_limited(prior_in_flight) {
            self.cubic.on_application_limited();
            self.on_state(CongestionState::ApplicationLimited);
            return;
        }

        if self.congestion_window >= self.max_congestion_window() {
            return;
        }

        if self.internal_in_slow_start() {
            self.congestion_window =
                self.congestion_window.saturating_add(self.max_datagram_size);
            self.on_state(CongestionState::SlowStart);
            return;
        }

        self.on_state(CongestionState::CongestionAvoidance);

        if self.reno {
            self.num_acked_packets += 1;

            if self.num_acked_packets >=
                self.congestion_window / self.max_datagram_size
            {
                self.congestion_window =
                    self.congestion_window.saturating_add(self.max_datagram_size);
                self.num_acked_packets = 0;
            }
        } else {
            let window = self.cubic.window_after_ack(
                acked_bytes,
                self.congestion_window,
                rtt_stats.min_rtt(),
                event_time,
            );

            self.congestion_window = window.min(self.max_congestion_window());
        }
    }
}

impl CongestionControl for PacingSender {
    fn set_max_datagram_size(&mut self, max_datagram_size: ByteCount) {
        if max_datagram_size < self.max_datagram_size {
            panic!(
                "congestion BUG: decreased max datagram size from {} to {}",
                self.max_datagram_size, max_datagram_size
            );
        }

        let cwnd_is_min_cwnd =
            self.congestion_window == self.min_congestion_window();

        self.max_datagram_size = max_datagram_size;

        if cwnd_is_min_cwnd {
            self.congestion_window = self.min_congestion_window();
        }

        self.cubic.set_max_datagram_size(max_datagram_size);
        self.pacer.set_max_datagram_size(max_datagram_size);
    }

    fn time_until_send(
        &mut self, _bytes_in_flight: ByteCount, rtt_stats: &RttStats,
    ) -> ReleaseTime {
        let bandwidth = self.bandwidth_estimate(rtt_stats);

        self.pacer.time_until_send(bandwidth)
    }

    fn has_pacing_budget(&self, now: Instant, rtt_stats: &RttStats) -> bool {
        let bandwidth = self.bandwidth_estimate(rtt_stats);

        self.pacer.budget(now, bandwidth) >= self.max_datagram_size
    }

    fn can_send(&self, _bytes_in_flight: ByteCount) -> bool {
        true
    }

    fn on_packet_sent(
        &mut self, sent_time: Instant, _bytes_in_flight: ByteCount,
        packet_number: PacketNumber, bytes: ByteCount, is_retransmittable: bool,
        rtt_stats: &RttStats,
    ) {
        let bandwidth = self.bandwidth_estimate(rtt_stats);
        self.pacer.sent_packet(sent_time, bytes, bandwidth);

        if !is_retransmittable {
            return;
        }

        self.largest_sent_packet_number = Some(packet_number);
        self.hybrid_slow_start.on_packet_sent(packet_number);
    }

    fn on_packet_acked(
        &mut self, packet_number: PacketNumber, acked_bytes: ByteCount,
        prior_in_flight: ByteCount, event_time: Instant, rtt_stats: &RttStats,
    ) {
        // The first packet of an ACK frame runs the slow start exit check.
        let frame = Some((event_time, prior_in_flight));
        if self.last_ack_frame != frame {
            self.last_ack_frame = frame;
            self.maybe_exit_slow_start(rtt_stats);
        }

        self.largest_acked_packet_number = Some(
            self.largest_acked_packet_number
                .map_or(packet_number, |largest| largest.max(packet_number)),
        );

        if self.internal_in_recovery() {
            return;
        }

        self.maybe_increase_cwnd(
            acked_bytes,
            prior_in_flight,
            event_time,
            rtt_stats,
        );

        if self.internal_in_slow_start() {
            self.hybrid_slow_start.on_packet_acked(packet_number);
        }
    }

    fn on_congestion_event(
        &mut self, packet_number: PacketNumber, _lost_bytes: ByteCount,
        _prior_in_flight: ByteCount,
    ) {
        // TCP NewReno (RFC6582) says that once a loss occurs, any losses in
        // packets already sent should be treated as a single loss event,
        // since it's expected.
        if self
            .largest_sent_at_last_cutback
            .is_some_and(|cutback| packet_number <= cutback)
        {
            self.stats.losses_ignored += 1;
            return;
        }

        self.stats.last_cutback_exited_slow_start = self.internal_in_slow_start();

        self.on_state(CongestionState::Recovery);

        self.congestion_window = if self.reno {
            (self.congestion_window as f64 * RENO_BETA).round() as ByteCount
        } else {
            self.cubic.window_after_loss(self.congestion_window)
        };

        self.congestion_window =
            self.congestion_window.max(self.min_congestion_window());

        self.slow_start_threshold = self.congestion_window;
        self.largest_sent_at_last_cutback = self.largest_sent_packet_number;

        // Counting starts again once out of recovery.
        self.num_acked_packets = 0;

        self.stats.cutbacks += 1;

        trace!(
            "{} loss of packet {} cut the window: {:?}",
            self.trace_id,
            packet_number,
            self
        );
    }

    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {
        self.largest_sent_at_last_cutback = None;

        if !packets_retransmitted {
            return;
        }

        self.hybrid_slow_start.restart();
        self.cubic.reset();

        self.slow_start_threshold = self.congestion_window / 2;
        self.congestion_window = self.min_congestion_window();

        self.stats.rto_collapses += 1;

        debug!(
            "{} retransmission timeout collapsed the window: {:?}",
            self.trace_id, self
        );
    }

    fn on_connection_migration(&mut self) {
        self.hybrid_slow_start.restart();

        self.largest_sent_packet_number = None;
        self.largest_acked_packet_number = None;
        self.largest_sent_at_last_cutback = None;
        self.last_ack_frame = None;

        self.stats.last_cutback_exited_slow_start = false;

        self.cubic.reset();
        self.num_acked_packets = 0;

        self.congestion_window = self.initial_congestion_window;
        self.slow_start_threshold = self.initial_max_congestion_window;

        self.stats.migrations += 1;

        debug!("{} connection migrated: {:?}", self.trace_id, self);
    }

    fn get_congestion_window(&self) -> ByteCount {
        MAX_BYTE_COUNT
    }

    fn in_slow_start(&self) -> bool {
        false
    }

    fn in_recovery(&self) -> bool {
        false
    }

    fn maybe_exit_slow_start(&mut self, rtt_stats: &RttStats) {
        if !self.internal_in_slow_start() {
            return;
        }

        let window_packets = self.congestion_window / self.max_datagram_size;

        if self.hybrid_slow_start.should_exit_slow_start(
            rtt_stats.latest_rtt(),
            rtt_stats.min_rtt(),
            window_packets,
        ) {
            self.slow_start_threshold = self.congestion_window;
            self.stats.slow_start_exits += 1;

            self.on_state(CongestionState::CongestionAvoidance);
        }
    }

    fn set_pacer_rate(&mut self, bytes_per_second: u64) {
        self.pacer.set_rate(bytes_per_second);
    }

    fn bandwidth_estimate(&self, rtt_stats: &RttStats) -> Bandwidth {
        bandwidth_from_window(
            self.congestion_window,
            rtt_stats.smoothed_rtt(),
            self.zero_rtt_bandwidth,
        )
    }
}

impl std::fmt::Debug for PacingSender {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} ", if self.reno { "reno" } else { "cubic" })?;
        write!(f, "cwnd={} ", self.congestion_window)?;
        write!(f, "ssthresh={} ", self.slow_start_threshold)?;
        write!(f, "mds={} ", self.max_datagram_size)?;
        write!(f, "largest_sent={:?} ", self.largest_sent_packet_number)?;
        write!(f, "largest_acked={:?} ", self.largest_acked_packet_number)?;
        write!(f, "cutback={:?} ", self.largest_sent_at_last_cutback)?;
        write!(f, "acked_packets={} ", self.num_acked_packets)?;
        write!(f, "state={:?} ", self.state.last())?;
        write!(f, "pacer={:?}", self.pacer)?;

        Ok(())
    }
}
