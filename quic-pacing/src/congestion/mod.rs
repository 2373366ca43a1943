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

//! Congestion controllers.
//!
//! Every sender implements [`CongestionControl`]. [`SendAlgorithm`] picks one
//! per connection from the [`Config`].

mod cubic;
mod hybrid_slow_start;
mod noop;
mod pacing_sender;

#[cfg(test)]
mod test_sender;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

pub use self::noop::NoOpSender;
pub use self::pacing_sender::PacingSender;
pub use self::pacing_sender::SenderStats;

use crate::bandwidth::Bandwidth;
use crate::clock::Clock;
use crate::config::CongestionControlAlgorithm;
use crate::config::Config;
use crate::pacer::ReleaseTime;
use crate::rtt::RttStats;
use crate::state::StateObserver;
use crate::ByteCount;
use crate::PacketNumber;
use crate::Result;

/// The window never shrinks below this many datagrams.
pub(crate) const MIN_CONGESTION_WINDOW_PACKETS: ByteCount = 2;

/// Headroom, in datagrams, under which the sender still counts as limited by
/// its window.
pub(crate) const MAX_BURST_PACKETS: ByteCount = 3;

/// Reno window multiplier on loss.
pub(crate) const RENO_BETA: f64 = 0.7;

#[enum_dispatch::enum_dispatch]
pub trait CongestionControl: Debug {
    /// Updates the maximum datagram size.
    ///
    /// The size can only grow. Shrinking it is a caller bug and panics.
    fn set_max_datagram_size(&mut self, max_datagram_size: ByteCount);

    /// Returns when the next packet can be sent.
    fn time_until_send(
        &mut self, bytes_in_flight: ByteCount, rtt_stats: &RttStats,
    ) -> ReleaseTime;

    /// Whether the pacer has at least one full sized datagram of budget at
    /// `now`.
    fn has_pacing_budget(&self, now: Instant, rtt_stats: &RttStats) -> bool;

    /// Make decision on whether the sender can send right now. Note that even
    /// when this method returns true, the sending can be delayed due to pacing.
    fn can_send(&self, bytes_in_flight: ByteCount) -> bool;

    /// Inform that we sent `bytes` to the wire, and if the packet is
    /// retransmittable. `bytes_in_flight` is the number of bytes in flight
    /// before the packet was sent. Note: this function must be called for
    /// every packet sent to the wire.
    #[allow(clippy::too_many_arguments)]
    fn on_packet_sent(
        &mut self, sent_time: Instant, bytes_in_flight: ByteCount,
        packet_number: PacketNumber, bytes: ByteCount, is_retransmittable: bool,
        rtt_stats: &RttStats,
    );

    /// Inform that `packet_number` was acknowledged. `prior_in_flight` is the
    /// number of bytes in flight before the acknowledgement was processed.
    fn on_packet_acked(
        &mut self, packet_number: PacketNumber, acked_bytes: ByteCount,
        prior_in_flight: ByteCount, event_time: Instant, rtt_stats: &RttStats,
    );

    /// Inform that `packet_number` was declared lost.
    fn on_congestion_event(
        &mut self, packet_number: PacketNumber, lost_bytes: ByteCount,
        prior_in_flight: ByteCount,
    );

    /// Called when an RTO fires.
    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool);

    /// Called when connection migrates and cwnd needs to be reset.
    fn on_connection_migration(&mut self);

    /// Returns the size of the congestion window in bytes, as seen by the
    /// connection. Pacing senders never limit the connection through it.
    fn get_congestion_window(&self) -> ByteCount;

    fn in_slow_start(&self) -> bool;

    fn in_recovery(&self) -> bool;

    /// Leaves slow start if the RTT samples show queues building up.
    ///
    /// `on_packet_acked()` runs this for the first packet of every ACK frame,
    /// so every direct call counts as an additional RTT sample.
    fn maybe_exit_slow_start(&mut self, rtt_stats: &RttStats);

    /// Sets the pacing rate of senders that have a settable one, in bytes per
    /// second.
    fn set_pacer_rate(&mut self, bytes_per_second: u64);

    fn bandwidth_estimate(&self, rtt_stats: &RttStats) -> Bandwidth;
}

/// The congestion controller of one connection.
#[enum_dispatch::enum_dispatch(CongestionControl)]
#[derive(Debug)]
pub enum SendAlgorithm {
    NoOp(NoOpSender),
    Pacing(PacingSender),
}

impl SendAlgorithm {
    /// Builds the controller selected by `config`.
    ///
    /// `clock` is only read by the token bucket pacer. The `observer`, if
    /// any, is told about every congestion state transition.
    pub fn new(
        config: &Config, clock: Arc<dyn Clock>,
        observer: Option<Box<dyn StateObserver>>,
    ) -> Result<Self> {
        config.validate()?;

        let sender = match config.cc_algorithm {
            CongestionControlAlgorithm::NoOp => SendAlgorithm::NoOp(NoOpSender),

            CongestionControlAlgorithm::Reno =>
                SendAlgorithm::Pacing(PacingSender::new(
                    config, true, clock, observer,
                )),

            CongestionControlAlgorithm::CUBIC =>
                SendAlgorithm::Pacing(PacingSender::new(
                    config, false, clock, observer,
                )),
        };

        Ok(sender)
    }

    /// The pacing sender, unless congestion control is disabled.
    pub fn as_pacing(&self) -> Option<&PacingSender> {
        match self {
            SendAlgorithm::Pacing(sender) => Some(sender),

            SendAlgorithm::NoOp(_) => None,
        }
    }

    pub fn as_pacing_mut(&mut self) -> Option<&mut PacingSender> {
        match self {
            SendAlgorithm::Pacing(sender) => Some(sender),

            SendAlgorithm::NoOp(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::clock::MonotonicClock;
    use crate::Error;
    use crate::MAX_BYTE_COUNT;

    #[rstest]
    #[case(CongestionControlAlgorithm::NoOp, false)]
    #[case(CongestionControlAlgorithm::Reno, true)]
    #[case(CongestionControlAlgorithm::CUBIC, true)]
    fn from_config(
        #[case] algo: CongestionControlAlgorithm, #[case] paces: bool,
    ) {
        let mut config = Config::default();
        config.set_cc_algorithm(algo);

        let sender =
            SendAlgorithm::new(&config, Arc::new(MonotonicClock), None).unwrap();

        assert_eq!(sender.as_pacing().is_some(), paces);

        // Whatever the algorithm, the connection is never window limited.
        assert!(sender.can_send(MAX_BYTE_COUNT));
        assert_eq!(sender.get_congestion_window(), MAX_BYTE_COUNT);
        assert!(!sender.in_slow_start());
        assert!(!sender.in_recovery());
    }

    #[test]
    fn invalid_config() {
        let mut config = Config::default();
        config.set_max_datagram_size(0);

        assert_eq!(
            SendAlgorithm::new(&config, Arc::new(MonotonicClock), None).err(),
            Some(Error::InvalidConfig("zero max datagram size"))
        );
    }

    #[test]
    fn cubic_and_reno_differ_only_in_window_growth() {
        let mut config = Config::default();

        config.set_cc_algorithm(CongestionControlAlgorithm::Reno);
        let reno =
            SendAlgorithm::new(&config, Arc::new(MonotonicClock), None).unwrap();

        config.set_cc_algorithm(CongestionControlAlgorithm::CUBIC);
        let cubic =
            SendAlgorithm::new(&config, Arc::new(MonotonicClock), None).unwrap();

        let reno = reno.as_pacing().unwrap();
        let cubic = cubic.as_pacing().unwrap();

        assert!(reno.is_reno());
        assert!(!cubic.is_reno());
        assert_eq!(
            reno.internal_congestion_window(),
            cubic.internal_congestion_window()
        );
    }
}
