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

//! Congestion state announcements.
//!
//! The sender's internal flags decide what happens to the window. The
//! [`CongestionState`] reported here is only a label derived from them, handed
//! to an optional [`StateObserver`] for logging and qlog.

#[cfg(feature = "qlog")]
use std::collections::VecDeque;

/// The congestion state last announced by a sender.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CongestionState {
    SlowStart,
    CongestionAvoidance,
    Recovery,
    ApplicationLimited,
}

impl CongestionState {
    /// Name of the state, as used by qlog.
    pub fn as_str(self) -> &'static str {
        match self {
            CongestionState::SlowStart => "slow_start",
            CongestionState::CongestionAvoidance => "congestion_avoidance",
            CongestionState::Recovery => "recovery",
            CongestionState::ApplicationLimited => "application_limited",
        }
    }
}

impl std::fmt::Display for CongestionState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives congestion state transitions.
///
/// Notifications are fire-and-forget. A sender never announces the same state
/// twice in a row.
pub trait StateObserver: std::fmt::Debug + Send {
    fn on_state_updated(
        &mut self, old: Option<CongestionState>, new: CongestionState,
    );
}

/// Tracks the last announced state and forwards changes to the observer, if
/// any.
#[derive(Debug, Default)]
pub(crate) struct StateTracker {
    last: Option<CongestionState>,

    observer: Option<Box<dyn StateObserver>>,
}

impl StateTracker {
    pub(crate) fn new(observer: Option<Box<dyn StateObserver>>) -> Self {
        StateTracker {
            last: None,
            observer,
        }
    }

    /// Announces `new` unless it was the last state announced.
    ///
    /// Returns whether a transition happened.
    pub(crate) fn update(&mut self, new: CongestionState) -> bool {
        if self.last == Some(new) {
            return false;
        }

        let old = self.last.replace(new);

        if let Some(observer) = self.observer.as_mut() {
            observer.on_state_updated(old, new);
        }

        true
    }

    pub(crate) fn last(&self) -> Option<CongestionState> {
        self.last
    }
}

/// A [`StateObserver`] that queues qlog `congestion_state_updated` events
/// until the connection's qlog streamer collects them.
#[cfg(feature = "qlog")]
#[derive(Debug, Default)]
pub struct QlogStateRecorder {
    events: VecDeque<qlog::events::EventData>,
}

#[cfg(feature = "qlog")]
impl QlogStateRecorder {
    /// Takes all events recorded so far, oldest first.
    pub fn drain(
        &mut self,
    ) -> impl Iterator<Item = qlog::events::EventData> + '_ {
        self.events.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(feature = "qlog")]
impl StateObserver for QlogStateRecorder {
    fn on_state_updated(
        &mut self, old: Option<CongestionState>, new: CongestionState,
    ) {
        let ev_data = qlog::events::EventData::CongestionStateUpdated(
            qlog::events::quic::CongestionStateUpdated {
                old: old.map(|s| s.as_str().to_string()),
                new: new.as_str().to_string(),
                trigger: None,
            },
        );

        self.events.push_back(ev_data);
    }
}
