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

//! 🏎 Congestion control and packet pacing for QUIC senders.
//!
//! This crate decides, for every packet a QUIC connection wants to send,
//! *when* it may leave. It keeps a classic Reno or CUBIC congestion window,
//! complete with slow start, HyStart, loss recovery and timeouts, but uses the
//! window only to estimate the available bandwidth. That estimate drives a
//! pacer, and the pacer is what actually spaces packets out: the connection
//! itself is never blocked by the window.
//!
//! ## Creating a sender
//!
//! A sender is created for each connection from a shared [`Config`]:
//!
//! ```
//! use std::sync::Arc;
//!
//! let mut config = quic_pacing::Config::default();
//! config.set_cc_algorithm_name("cubic")?;
//!
//! let sender = quic_pacing::SendAlgorithm::new(
//!     &config,
//!     Arc::new(quic_pacing::MonotonicClock),
//!     None,
//! )?;
//! # Ok::<(), quic_pacing::Error>(())
//! ```
//!
//! ## Driving the sender
//!
//! The connection reports every packet it sends, acknowledgements and losses
//! as its recovery layer detects them, and asks the sender when the next
//! packet can go out:
//!
//! ```
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use std::time::Instant;
//! use quic_pacing::CongestionControl;
//! use quic_pacing::ReleaseTime;
//!
//! # let config = quic_pacing::Config::default();
//! # let mut sender = quic_pacing::SendAlgorithm::new(
//! #     &config, Arc::new(quic_pacing::MonotonicClock), None)?;
//! let mut rtt_stats = quic_pacing::RttStats::default();
//! let now = Instant::now();
//!
//! match sender.time_until_send(0, &rtt_stats) {
//!     ReleaseTime::Immediate => {
//!         sender.on_packet_sent(now, 0, 0, 1200, true, &rtt_stats);
//!     },
//!
//!     // Arm a timer and try again later.
//!     ReleaseTime::At(_) => (),
//! }
//!
//! // When the ACK frame for packet 0 arrives.
//! rtt_stats.update_rtt(Duration::from_millis(40));
//! sender.on_packet_acked(0, 1200, 1200, now, &rtt_stats);
//! # Ok::<(), quic_pacing::Error>(())
//! ```
//!
//! ## Congestion state
//!
//! A [`StateObserver`] can be passed to [`SendAlgorithm::new()`] to be told
//! about congestion state transitions. With the `qlog` feature enabled,
//! [`QlogStateRecorder`] turns them into qlog events.

#![allow(clippy::upper_case_acronyms)]
#![warn(missing_debug_implementations)]

#[macro_use]
extern crate log;

/// A number of bytes.
pub type ByteCount = u64;

/// A packet number.
pub type PacketNumber = u64;

/// The largest byte count, used as an "unlimited" congestion window.
pub const MAX_BYTE_COUNT: ByteCount = (1 << 62) - 1;

pub use crate::bandwidth::Bandwidth;

pub use crate::clock::Clock;
pub use crate::clock::MonotonicClock;

pub use crate::config::CongestionControlAlgorithm;
pub use crate::config::Config;
pub use crate::config::DEFAULT_INITIAL_CONGESTION_WINDOW_PACKETS;
pub use crate::config::DEFAULT_MAX_CONGESTION_WINDOW_PACKETS;
pub use crate::config::DEFAULT_MAX_DATAGRAM_SIZE;
pub use crate::config::PacerAlgorithm;
pub use crate::config::ZeroRttBandwidth;

pub use crate::congestion::CongestionControl;
pub use crate::congestion::NoOpSender;
pub use crate::congestion::PacingSender;
pub use crate::congestion::SendAlgorithm;
pub use crate::congestion::SenderStats;

pub use crate::error::Error;
pub use crate::error::Result;

pub use crate::pacer::Pacer;
pub use crate::pacer::ReleaseTime;

pub use crate::rtt::RttStats;

pub use crate::state::CongestionState;
pub use crate::state::StateObserver;

#[cfg(feature = "qlog")]
pub use crate::state::QlogStateRecorder;

mod bandwidth;
pub mod clock;
mod config;
mod congestion;
mod error;
pub mod pacer;
mod rtt;
mod state;
