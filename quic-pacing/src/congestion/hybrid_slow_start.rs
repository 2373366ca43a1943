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

//! HyStart delay-increase detection.
//!
//! Slow start is left once the smallest RTT seen in the first few samples of
//! a round trip exceeds the connection's minimum RTT by 1/8th (clamped to
//! 4..16ms), provided the window is at least 16 packets.

use std::time::Duration;

use crate::PacketNumber;

/// RTT samples looked at in every round.
const MIN_SAMPLES: u32 = 8;

/// The delay threshold is `min_rtt >> DELAY_FACTOR_EXP`.
const DELAY_FACTOR_EXP: u32 = 3;

/// Never exit below this window, in packets.
const LOW_WINDOW: u64 = 16;

const DELAY_MIN_THRESHOLD: Duration = Duration::from_millis(4);
const DELAY_MAX_THRESHOLD: Duration = Duration::from_millis(16);

#[derive(Default, Debug)]
pub(crate) struct HybridSlowStart {
    /// A measurement round is in progress.
    pub(crate) started: bool,

    /// The delay increase was seen. Sticky until `restart()`.
    found: bool,

    /// Largest retransmittable packet sent so far.
    last_sent_packet_number: Option<PacketNumber>,

    /// Acknowledging this packet ends the current round.
    end_packet_number: Option<PacketNumber>,

    rtt_sample_count: u32,

    /// Smallest RTT among the first `MIN_SAMPLES` samples of the round.
    current_min_rtt: Option<Duration>,
}

impl HybridSlowStart {
    pub(crate) fn restart(&mut self) {
        self.started = false;
        self.found = false;
    }

    pub(crate) fn on_packet_sent(&mut self, packet_number: PacketNumber) {
        self.last_sent_packet_number = Some(packet_number);
    }

    pub(crate) fn on_packet_acked(&mut self, acked_packet_number: PacketNumber) {
        // Exit checks run before the ack is recorded here, so the round is
        // closed by the ack of its last packet and a new one starts with the
        // next check.
        if self.is_end_of_round(acked_packet_number) {
            self.started = false;
        }
    }

    fn start_receive_round(&mut self, last_sent: Option<PacketNumber>) {
        self.end_packet_number = last_sent;
        self.current_min_rtt = None;
        self.rtt_sample_count = 0;
        self.started = true;
    }

    fn is_end_of_round(&self, ack: PacketNumber) -> bool {
        self.end_packet_number.map_or(true, |end| end <= ack)
    }

    pub(crate) fn should_exit_slow_start(
        &mut self, latest_rtt: Duration, min_rtt: Duration,
        congestion_window_packets: u64,
    ) -> bool {
        if !self.started {
            self.start_receive_round(self.last_sent_packet_number);
        }

        if self.found {
            return true;
        }

        self.rtt_sample_count += 1;

        if self.rtt_sample_count <= MIN_SAMPLES {
            let current = self.current_min_rtt.get_or_insert(latest_rtt);
            *current = (*current).min(latest_rtt);
        }

        // Once per round.
        if self.rtt_sample_count == MIN_SAMPLES {
            let threshold = (min_rtt / (1 << DELAY_FACTOR_EXP))
                .clamp(DELAY_MIN_THRESHOLD, DELAY_MAX_THRESHOLD);

            if self
                .current_min_rtt
                .is_some_and(|current| current > min_rtt + threshold)
            {
                self.found = true;
            }
        }

        congestion_window_packets >= LOW_WINDOW && self.found
    }
}
