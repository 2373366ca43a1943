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

//! Token bucket with reservations.
//!
//! Tokens accumulate at `limit` per second up to `burst`. A reservation of
//! `n` tokens always succeeds when `n <= burst`, possibly driving the balance
//! negative; the reservation then reports how long the caller has to wait
//! before acting on it. Cancelling a reservation that has not been acted on
//! hands its tokens back, which makes reserve-then-cancel a side-effect-free
//! probe.

use std::time::Duration;
use std::time::Instant;

const NANOS_PER_SECOND: f64 = 1_000_000_000.;

#[derive(Debug)]
pub(crate) struct Limiter {
    /// Tokens per second.
    limit: f64,

    burst: u64,

    tokens: f64,

    /// Last time `tokens` was updated. `None` until the first update, which
    /// means the bucket is full.
    last: Option<Instant>,

    /// Latest time a reservation is allowed to act, past or future.
    last_event: Option<Instant>,
}

/// Tokens set aside by [`Limiter::reserve_n()`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Reservation {
    ok: bool,

    tokens: u64,

    time_to_act: Instant,

    /// Limit at reservation time, which may have changed since.
    limit: f64,
}

impl Reservation {
    /// Whether the limiter can provide the requested tokens at all.
    pub(crate) fn ok(&self) -> bool {
        self.ok
    }

    /// How long to wait from `now` before acting on the reservation.
    pub(crate) fn delay_from(&self, now: Instant) -> Duration {
        if !self.ok {
            return Duration::MAX;
        }

        self.time_to_act.saturating_duration_since(now)
    }
}

fn duration_from_tokens(limit: f64, tokens: f64) -> Option<Duration> {
    if limit <= 0. {
        return None;
    }

    // Rounded up, waking early would find the bucket still short.
    let nanos = (tokens * NANOS_PER_SECOND / limit).ceil();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return None;
    }

    Some(Duration::from_nanos(nanos as u64))
}

fn tokens_from_duration(limit: f64, d: Duration) -> f64 {
    if limit <= 0. {
        return 0.;
    }

    d.as_nanos() as f64 * limit / NANOS_PER_SECOND
}

impl Limiter {
    pub(crate) fn new(limit: f64, burst: u64) -> Self {
        Limiter {
            limit,
            burst,
            tokens: 0.,
            last: None,
            last_event: None,
        }
    }

    pub(crate) fn limit(&self) -> f64 {
        self.limit
    }

    pub(crate) fn burst(&self) -> u64 {
        self.burst
    }

    /// Token balance at `now`, which may be negative while reservations are
    /// pending. Does not modify the bucket.
    pub(crate) fn tokens_at(&self, now: Instant) -> f64 {
        self.advance(now).1
    }

    /// Returns the time tokens are accounted up to and the balance at that
    /// time. Time never moves backwards.
    fn advance(&self, now: Instant) -> (Instant, f64) {
        let burst = self.burst as f64;

        let Some(last) = self.last else {
            return (now, burst);
        };

        // A stale `now` is accounted at `last`, never before it.
        let now = now.max(last);
        let elapsed = now.duration_since(last);

        let tokens = self.tokens + tokens_from_duration(self.limit, elapsed);

        (now, tokens.min(burst))
    }

    pub(crate) fn set_limit_at(&mut self, now: Instant, limit: f64) {
        let (now, tokens) = self.advance(now);

        self.last = Some(now);
        self.tokens = tokens;
        self.limit = limit;
    }

    pub(crate) fn set_burst_at(&mut self, now: Instant, burst: u64) {
        let (now, tokens) = self.advance(now);

        self.last = Some(now);
        self.tokens = tokens;
        self.burst = burst;
    }

    /// Sets aside `n` tokens at `now`.
    ///
    /// The bucket is only modified when the reservation is `ok()`.
    pub(crate) fn reserve_n(&mut self, now: Instant, n: u64) -> Reservation {
        let (now, tokens) = self.advance(now);

        let tokens = tokens - n as f64;

        let time_to_act = if tokens < 0. {
            duration_from_tokens(self.limit, -tokens)
                .and_then(|wait| now.checked_add(wait))
        } else {
            Some(now)
        };

        let mut reservation = Reservation {
            ok: false,
            tokens: 0,
            time_to_act: now,
            limit: self.limit,
        };

        if let (true, Some(time_to_act)) = (n <= self.burst, time_to_act) {
            reservation.ok = true;
            reservation.tokens = n;
            reservation.time_to_act = time_to_act;

            self.last = Some(now);
            self.tokens = tokens;
            self.last_event = Some(reservation.time_to_act);
        }

        reservation
    }

    /// Gives back the tokens of `r`, as far as they were not consumed by
    /// later reservations.
    ///
    /// Nothing happens if `r` has already acted at `now`.
    pub(crate) fn cancel_at(&mut self, now: Instant, r: &Reservation) {
        if !r.ok || r.tokens == 0 || r.time_to_act < now {
            return;
        }

        // Later reservations were made against the tokens of this one.
        let later = self.last_event.map_or(Duration::ZERO, |e| {
            e.saturating_duration_since(r.time_to_act)
        });

        let restore = r.tokens as f64 - tokens_from_duration(r.limit, later);
        if restore <= 0. {
            return;
        }

        let (now, tokens) = self.advance(now);

        self.last = Some(now);
        self.tokens = (tokens + restore).min(self.burst as f64);

        if self.last_event == Some(r.time_to_act) {
            let prev_event = duration_from_tokens(r.limit, r.tokens as f64)
                .and_then(|d| r.time_to_act.checked_sub(d));

            if let Some(prev_event) = prev_event.filter(|e| *e >= now) {
                self.last_event = Some(prev_event);
            }
        }
    }
}
