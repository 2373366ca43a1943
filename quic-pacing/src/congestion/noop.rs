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

use super::CongestionControl;
use crate::bandwidth::Bandwidth;
use crate::pacer::ReleaseTime;
use crate::rtt::RttStats;
use crate::ByteCount;
use crate::PacketNumber;
use crate::MAX_BYTE_COUNT;

/// Congestion control disabled: unlimited window, no pacing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSender;

impl CongestionControl for NoOpSender {
    fn set_max_datagram_size(&mut self, _max_datagram_size: ByteCount) {}

    fn time_until_send(
        &mut self, _bytes_in_flight: ByteCount, _rtt_stats: &RttStats,
    ) -> ReleaseTime {
        ReleaseTime::Immediate
    }

    fn has_pacing_budget(&self, _now: Instant, _rtt_stats: &RttStats) -> bool {
        true
    }

    fn can_send(&self, _bytes_in_flight: ByteCount) -> bool {
        true
    }

    fn on_packet_sent(
        &mut self, _sent_time: Instant, _bytes_in_flight: ByteCount,
        _packet_number: PacketNumber, _bytes: ByteCount,
        _is_retransmittable: bool, _rtt_stats: &RttStats,
    ) {
    }

    fn on_packet_acked(
        &mut self, _packet_number: PacketNumber, _acked_bytes: ByteCount,
        _prior_in_flight: ByteCount, _event_time: Instant, _rtt_stats: &RttStats,
    ) {
    }

    fn on_congestion_event(
        &mut self, _packet_number: PacketNumber, _lost_bytes: ByteCount,
        _prior_in_flight: ByteCount,
    ) {
    }

    fn on_retransmission_timeout(&mut self, _packets_retransmitted: bool) {}

    fn on_connection_migration(&mut self) {}

    fn get_congestion_window(&self) -> ByteCount {
        MAX_BYTE_COUNT
    }

    fn in_slow_start(&self) -> bool {
        false
    }

    fn in_recovery(&self) -> bool {
        false
    }

    fn maybe_exit_slow_start(&mut self, _rtt_stats: &RttStats) {}

    fn set_pacer_rate(&mut self, _bytes_per_second: u64) {}

    fn bandwidth_estimate(&self, _rtt_stats: &RttStats) -> Bandwidth {
        Bandwidth::infinite()
    }
}
