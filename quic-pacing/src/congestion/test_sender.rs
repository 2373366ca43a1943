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

use std::collections::VecDeque;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use super::CongestionControl;
use super::PacingSender;
use super::SendAlgorithm;
use crate::clock::testing::ManualClock;
use crate::clock::Clock;
use crate::config::Config;
use crate::pacer::ReleaseTime;
use crate::rtt::RttStats;
use crate::state::StateObserver;
use crate::ByteCount;
use crate::PacketNumber;

/// Drives a sender the way a connection would: packets are sent, then acked
/// or lost in order.
pub(crate) struct TestSender {
    cc: SendAlgorithm,
    clock: Arc<ManualClock>,
    next_pkt: PacketNumber,
    bytes_in_flight: ByteCount,
    rtt_stats: RttStats,
    sent_packets: VecDeque<(PacketNumber, ByteCount)>,
}

impl TestSender {
    pub(crate) fn new(
        config: &Config, observer: Option<Box<dyn StateObserver>>,
    ) -> Self {
        let clock = Arc::new(ManualClock::default());

        TestSender {
            cc: SendAlgorithm::new(config, clock.clone(), observer).unwrap(),
            clock,
            next_pkt: 0,
            bytes_in_flight: 0,
            rtt_stats: RttStats::default(),
            sent_packets: VecDeque::new(),
        }
    }

    pub(crate) fn pacing(&self) -> &PacingSender {
        self.cc.as_pacing().unwrap()
    }

    pub(crate) fn pacing_mut(&mut self) -> &mut PacingSender {
        self.cc.as_pacing_mut().unwrap()
    }

    pub(crate) fn cwnd(&self) -> ByteCount {
        self.pacing().internal_congestion_window()
    }

    pub(crate) fn time(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn rtt_stats(&self) -> &RttStats {
        &self.rtt_stats
    }

    pub(crate) fn packets_in_flight(&self) -> usize {
        self.sent_packets.len()
    }

    pub(crate) fn last_sent(&self) -> PacketNumber {
        self.next_pkt - 1
    }

    pub(crate) fn send_packet(&mut self, bytes: ByteCount) {
        let now = self.time();

        self.cc.on_packet_sent(
            now,
            self.bytes_in_flight,
            self.next_pkt,
            bytes,
            true,
            &self.rtt_stats,
        );

        self.sent_packets.push_back((self.next_pkt, bytes));

        self.bytes_in_flight += bytes;
        self.next_pkt += 1;
    }

    /// Sends full sized packets until the whole window is in flight.
    pub(crate) fn fill_window(&mut self) {
        let mds = self.pacing().max_datagram_size();

        while self.bytes_in_flight < self.cwnd() {
            self.send_packet(mds);
        }
    }

    /// Acks the `n` oldest packets with a single ACK frame.
    pub(crate) fn ack_n_packets(&mut self, n: usize) {
        let now = self.time();
        let prior_in_flight = self.bytes_in_flight;

        for _ in 0..n {
            let (pn, bytes) = self.sent_packets.pop_front().unwrap();

            self.cc.on_packet_acked(
                pn,
                bytes,
                prior_in_flight,
                now,
                &self.rtt_stats,
            );

            self.bytes_in_flight -= bytes;
        }
    }

    /// Declares the `n` oldest packets lost.
    pub(crate) fn lose_n_packets(&mut self, n: usize) {
        let prior_in_flight = self.bytes_in_flight;

        for _ in 0..n {
            let (pn, bytes) = self.sent_packets.pop_front().unwrap();

            self.cc.on_congestion_event(pn, bytes, prior_in_flight);

            self.bytes_in_flight -= bytes;
        }
    }

    pub(crate) fn has_budget(&self) -> bool {
        self.cc.has_pacing_budget(self.time(), &self.rtt_stats)
    }

    pub(crate) fn next_release(&mut self) -> ReleaseTime {
        self.cc.time_until_send(self.bytes_in_flight, &self.rtt_stats)
    }

    pub(crate) fn update_rtt(&mut self, rtt: Duration) {
        self.rtt_stats.update_rtt(rtt);
    }

    pub(crate) fn advance_time(&mut self, period: Duration) {
        self.clock.advance(period);
    }
}

impl Deref for TestSender {
    type Target = SendAlgorithm;

    fn deref(&self) -> &Self::Target {
        &self.cc
    }
}

impl DerefMut for TestSender {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cc
    }
}
