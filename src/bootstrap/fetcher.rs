/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Retry scheduling for missing-candidate fetches.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::basic::{CandidateId, RequestId};

/// Re-queue attempts before an id is deferred to the next bootstrap cycle.
pub const MAX_FETCH_ATTEMPTS: u32 = 5;
/// First retry delay; doubles per failure.
pub const FETCH_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Ceiling on the retry delay.
pub const FETCH_BACKOFF_CAP: Duration = Duration::from_secs(10);

/// An outbound GetAncestors request the caller should send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub request_id: RequestId,
    pub candidate_id: CandidateId,
    /// 1-based attempt counter.
    pub attempt: u32,
}

struct FetchState {
    attempts: u32,
    ready_at: Instant,
    in_flight: Option<RequestId>,
}

/// Tracks which candidate ids still need fetching, which requests are in flight, and
/// when failed ids become eligible for another attempt.
///
/// The fetcher does no I/O itself. The bootstrap worker calls [`Fetcher::due`] each
/// pass, sends the returned requests over the transport, and feeds results back via
/// [`Fetcher::on_response`] and [`Fetcher::on_failure`]. Ids that exhaust their
/// attempts land in the deferred list for the next bootstrap cycle.
pub struct Fetcher {
    pending: HashMap<CandidateId, FetchState>,
    outstanding: HashMap<RequestId, CandidateId>,
    deferred: Vec<CandidateId>,
    next_request: u32,
}

impl Fetcher {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            outstanding: HashMap::new(),
            deferred: Vec::new(),
            next_request: 0,
        }
    }

    /// Schedules a fetch for `id` if one is not already pending or in flight.
    pub fn add(&mut self, id: CandidateId, now: Instant) {
        self.pending.entry(id).or_insert(FetchState {
            attempts: 0,
            ready_at: now,
            in_flight: None,
        });
    }

    /// Drops an id entirely, for example because it arrived via another path.
    pub fn remove(&mut self, id: &CandidateId) {
        if let Some(state) = self.pending.remove(id) {
            if let Some(request_id) = state.in_flight {
                self.outstanding.remove(&request_id);
            }
        }
    }

    pub fn is_pending(&self, id: &CandidateId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Ids that exhausted their attempts this cycle.
    pub fn deferred(&self) -> &[CandidateId] {
        &self.deferred
    }

    /// Drains the deferred list, re-queueing each id with a fresh attempt budget.
    /// Called at the start of the next bootstrap cycle.
    pub fn requeue_deferred(&mut self, now: Instant) -> usize {
        let deferred = std::mem::take(&mut self.deferred);
        let count = deferred.len();
        for id in deferred {
            self.add(id, now);
        }
        count
    }

    /// Returns the requests whose retry delay has elapsed, marking them in flight.
    pub fn due(&mut self, now: Instant) -> Vec<FetchRequest> {
        let mut out = Vec::new();
        for (&id, state) in self.pending.iter_mut() {
            if state.in_flight.is_some() || state.ready_at > now {
                continue;
            }
            self.next_request = self.next_request.wrapping_add(1);
            let request_id = RequestId::new(self.next_request);
            state.attempts += 1;
            state.in_flight = Some(request_id);
            self.outstanding.insert(request_id, id);
            out.push(FetchRequest {
                request_id,
                candidate_id: id,
                attempt: state.attempts,
            });
        }
        out
    }

    /// Marks a request completed, clearing its id from the fetch set. Returns the id
    /// the request was for, or `None` for unknown (stale) request ids.
    pub fn on_response(&mut self, request_id: RequestId) -> Option<CandidateId> {
        let id = self.outstanding.remove(&request_id)?;
        self.pending.remove(&id);
        Some(id)
    }

    /// Reschedules a failed request with exponential backoff, or defers the id once
    /// its attempts are exhausted. Returns the id, or `None` for stale request ids.
    pub fn on_failure(&mut self, request_id: RequestId, now: Instant) -> Option<CandidateId> {
        let id = self.outstanding.remove(&request_id)?;
        let Some(state) = self.pending.get_mut(&id) else {
            return Some(id);
        };
        state.in_flight = None;
        if state.attempts >= MAX_FETCH_ATTEMPTS {
            self.pending.remove(&id);
            self.deferred.push(id);
        } else {
            state.ready_at = now + backoff_for(state.attempts);
        }
        Some(id)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// The delay before attempt `failed_attempts + 1`: base doubled per failure, capped.
fn backoff_for(failed_attempts: u32) -> Duration {
    let shift = failed_attempts.saturating_sub(1).min(16);
    let delay = FETCH_BACKOFF_BASE * 2u32.pow(shift);
    delay.min(FETCH_BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> CandidateId {
        CandidateId::of(b"fetch", &[n])
    }

    #[test]
    fn add_is_idempotent_while_pending() {
        let now = Instant::now();
        let mut fetcher = Fetcher::new();
        fetcher.add(id(1), now);
        fetcher.add(id(1), now);
        assert_eq!(fetcher.pending_count(), 1);

        let due = fetcher.due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempt, 1);
        // In flight: not due again until it fails.
        assert!(fetcher.due(now).is_empty());
    }

    #[test]
    fn response_clears_the_id() {
        let now = Instant::now();
        let mut fetcher = Fetcher::new();
        fetcher.add(id(1), now);
        let req = fetcher.due(now)[0];
        assert_eq!(fetcher.on_response(req.request_id), Some(id(1)));
        assert!(!fetcher.is_pending(&id(1)));
        assert_eq!(fetcher.outstanding_count(), 0);
        assert_eq!(fetcher.on_response(req.request_id), None);
    }

    #[test]
    fn failure_backs_off_exponentially() {
        let start = Instant::now();
        let mut fetcher = Fetcher::new();
        fetcher.add(id(1), start);

        let req = fetcher.due(start)[0];
        fetcher.on_failure(req.request_id, start).unwrap();
        // First retry waits the base delay.
        assert!(fetcher.due(start + Duration::from_millis(499)).is_empty());
        let req = fetcher.due(start + FETCH_BACKOFF_BASE)[0];
        assert_eq!(req.attempt, 2);

        let t1 = start + FETCH_BACKOFF_BASE;
        fetcher.on_failure(req.request_id, t1).unwrap();
        // Second retry waits twice the base delay.
        assert!(fetcher.due(t1 + FETCH_BACKOFF_BASE).is_empty());
        assert_eq!(fetcher.due(t1 + 2 * FETCH_BACKOFF_BASE).len(), 1);
    }

    #[test]
    fn exhausted_ids_are_deferred_then_requeued() {
        let mut now = Instant::now();
        let mut fetcher = Fetcher::new();
        fetcher.add(id(1), now);

        for _ in 0..MAX_FETCH_ATTEMPTS {
            now += FETCH_BACKOFF_CAP;
            let due = fetcher.due(now);
            assert_eq!(due.len(), 1);
            fetcher.on_failure(due[0].request_id, now).unwrap();
        }
        assert!(!fetcher.is_pending(&id(1)));
        assert_eq!(fetcher.deferred(), &[id(1)]);
        assert!(fetcher.due(now + FETCH_BACKOFF_CAP).is_empty());

        assert_eq!(fetcher.requeue_deferred(now), 1);
        let due = fetcher.due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempt, 1);
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_for(1), FETCH_BACKOFF_BASE);
        assert_eq!(backoff_for(2), 2 * FETCH_BACKOFF_BASE);
        assert_eq!(backoff_for(10), FETCH_BACKOFF_CAP);
    }
}
