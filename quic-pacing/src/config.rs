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

use std::str::FromStr;
use std::time::Duration;

use crate::ByteCount;
use crate::Error;
use crate::Result;

/// Default maximum datagram size, the smallest QUIC packet size that fits in
/// an IPv4 path with the minimum MTU.
pub const DEFAULT_MAX_DATAGRAM_SIZE: ByteCount = 1252;

/// Default initial congestion window, in packets.
pub const DEFAULT_INITIAL_CONGESTION_WINDOW_PACKETS: usize = 32;

/// Default maximum congestion window, in packets.
pub const DEFAULT_MAX_CONGESTION_WINDOW_PACKETS: usize = 10_000;

/// Available congestion control algorithms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub enum CongestionControlAlgorithm {
    /// Congestion control disabled: unlimited window, no pacing. `noop` in a
    /// string form.
    NoOp  = 0,
    /// Reno window growth, used to drive the pacer (default). `reno` in a
    /// string form.
    Reno  = 1,
    /// CUBIC window growth, used to drive the pacer. `cubic` in a string
    /// form.
    CUBIC = 2,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    /// Converts a string to `CongestionControlAlgorithm`.
    ///
    /// If `name` is not valid, `Error::CongestionControl` is returned.
    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "noop" => Ok(CongestionControlAlgorithm::NoOp),
            "reno" => Ok(CongestionControlAlgorithm::Reno),
            "cubic" => Ok(CongestionControlAlgorithm::CUBIC),

            _ => Err(Error::CongestionControl),
        }
    }
}

/// Available pacers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacerAlgorithm {
    /// Releases packets at a rate derived from the congestion window and the
    /// smoothed RTT (default). `estimate` in a string form.
    BandwidthEstimate,
    /// Token bucket with an externally set rate. `rate` in a string form.
    TokenBucket,
}

impl FromStr for PacerAlgorithm {
    type Err = Error;

    /// Converts a string to `PacerAlgorithm`.
    ///
    /// If `name` is not valid, `Error::Pacer` is returned.
    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "estimate" => Ok(PacerAlgorithm::BandwidthEstimate),
            "rate" => Ok(PacerAlgorithm::TokenBucket),

            _ => Err(Error::Pacer),
        }
    }
}

/// What the bandwidth estimate is before a smoothed RTT is available.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ZeroRttBandwidth {
    /// The estimate is infinite and the pacer does not delay packets.
    Infinite,
    /// The given RTT is used in place of the missing one.
    FloorRtt(Duration),
}

/// Congestion controller configuration, shared by all connections of an
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub(crate) cc_algorithm: CongestionControlAlgorithm,

    pub(crate) pacer: PacerAlgorithm,

    pub(crate) max_datagram_size: ByteCount,

    pub(crate) initial_congestion_window_packets: usize,

    pub(crate) max_congestion_window_packets: usize,

    pub(crate) zero_rtt_bandwidth: ZeroRttBandwidth,

    pub(crate) initial_pacing_rate: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cc_algorithm: CongestionControlAlgorithm::Reno,
            pacer: PacerAlgorithm::BandwidthEstimate,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            initial_congestion_window_packets:
                DEFAULT_INITIAL_CONGESTION_WINDOW_PACKETS,
            max_congestion_window_packets: DEFAULT_MAX_CONGESTION_WINDOW_PACKETS,
            zero_rtt_bandwidth: ZeroRttBandwidth::Infinite,
            initial_pacing_rate: None,
        }
    }
}

impl Config {
    /// Sets the congestion control algorithm used.
    ///
    /// The default value is `CongestionControlAlgorithm::Reno`.
    pub fn set_cc_algorithm(&mut self, algo: CongestionControlAlgorithm) {
        self.cc_algorithm = algo;
    }

    /// Sets the congestion control algorithm used by string.
    ///
    /// The default value is `reno`. On error `Error::CongestionControl`
    /// will be returned.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let mut config = quic_pacing::Config::default();
    /// config.set_cc_algorithm_name("cubic")?;
    /// # Ok::<(), quic_pacing::Error>(())
    /// ```
    pub fn set_cc_algorithm_name(&mut self, name: &str) -> Result<()> {
        self.cc_algorithm = CongestionControlAlgorithm::from_str(name)?;

        Ok(())
    }

    /// Sets the pacer used by senders that pace.
    ///
    /// The default value is `PacerAlgorithm::BandwidthEstimate`.
    pub fn set_pacer(&mut self, pacer: PacerAlgorithm) {
        self.pacer = pacer;
    }

    /// Sets the pacer by string (`estimate` or `rate`).
    pub fn set_pacer_name(&mut self, name: &str) -> Result<()> {
        self.pacer = PacerAlgorithm::from_str(name)?;

        Ok(())
    }

    /// Sets the initial maximum datagram size, in bytes.
    ///
    /// The default value is `1252`.
    pub fn set_max_datagram_size(&mut self, v: ByteCount) {
        self.max_datagram_size = v;
    }

    /// Sets the initial congestion window, in packets.
    ///
    /// The default value is `32`.
    pub fn set_initial_congestion_window_packets(&mut self, packets: usize) {
        self.initial_congestion_window_packets = packets;
    }

    /// Sets the upper bound of the congestion window, in packets.
    ///
    /// The default value is `10000`.
    pub fn set_max_congestion_window_packets(&mut self, packets: usize) {
        self.max_congestion_window_packets = packets;
    }

    /// Sets the bandwidth estimate policy used while no RTT is known.
    ///
    /// The default value is `ZeroRttBandwidth::Infinite`.
    pub fn set_zero_rtt_bandwidth(&mut self, policy: ZeroRttBandwidth) {
        self.zero_rtt_bandwidth = policy;
    }

    /// Sets the initial token bucket rate, in bytes per second.
    ///
    /// Only used with `PacerAlgorithm::TokenBucket`. When unset the pacer
    /// starts at 750 kbit/s until `set_pacer_rate()` is called.
    pub fn set_initial_pacing_rate(&mut self, rate: Option<u64>) {
        self.initial_pacing_rate = rate;
    }

    pub fn cc_algorithm(&self) -> CongestionControlAlgorithm {
        self.cc_algorithm
    }

    pub fn pacer(&self) -> PacerAlgorithm {
        self.pacer
    }

    pub fn max_datagram_size(&self) -> ByteCount {
        self.max_datagram_size
    }

    /// Checks that the values are usable by a sender.
    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size == 0 {
            return Err(Error::InvalidConfig("zero max datagram size"));
        }

        if self.initial_congestion_window_packets == 0 {
            return Err(Error::InvalidConfig("zero initial congestion window"));
        }

        if self.max_congestion_window_packets <
            self.initial_congestion_window_packets
        {
            return Err(Error::InvalidConfig(
                "max congestion window below initial congestion window",
            ));
        }

        if let ZeroRttBandwidth::FloorRtt(rtt) = self.zero_rtt_bandwidth {
            if rtt.is_zero() {
                return Err(Error::InvalidConfig("zero floor rtt"));
            }
        }

        if self.initial_pacing_rate == Some(0) {
            return Err(Error::InvalidConfig("zero initial pacing rate"));
        }

        Ok(())
    }
}
