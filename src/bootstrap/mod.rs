/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Catch-up from initial state to a discovered frontier.
//!
//! Bootstrap is a sub-pipeline that runs until local state covers the target frontier:
//! the [`IntervalTree`](intervals::IntervalTree) records which heights have been
//! fetched, the [`Fetcher`](fetcher::Fetcher) schedules and retries GetAncestors
//! requests, and the [`BlockedSet`](blocked::BlockedSet) parks candidates whose parents
//! have not arrived yet. Mutation happens on the bootstrap worker only; other threads
//! read progress through the atomic tracker and stats.

pub mod blocked;
pub mod fetcher;
pub mod intervals;

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant, SystemTime};

use crate::chain::Chain;
use crate::errors::ConsensusError;
use crate::events::{
    DeferFetchEvent, EndBootstrapEvent, Event, StartBootstrapEvent,
};
use crate::health::{BootstrapStats, BootstrapStatsSnapshot, BootstrapTracker, HealthCheck};
use crate::transport::{Transport, TransportEvent};
use crate::types::basic::{CandidateId, Height, RequestId, VoterId};
use crate::types::candidate::Candidate;
use crate::vm::Vm;

use self::blocked::BlockedSet;
use self::fetcher::{FetchRequest, Fetcher};
use self::intervals::IntervalTree;

/// Drives one bootstrap cycle toward `target` frontier height.
pub struct Bootstrapper {
    target: Height,
    known: IntervalTree,
    fetcher: Fetcher,
    blocked: BlockedSet,
    pub stats: BootstrapStats,
    pub tracker: BootstrapTracker,
}

impl Bootstrapper {
    pub fn new(target: Height) -> Self {
        Self {
            target,
            known: IntervalTree::new(),
            fetcher: Fetcher::new(),
            blocked: BlockedSet::new(),
            stats: BootstrapStats::new(),
            tracker: BootstrapTracker::new(),
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.tracker.on_bootstrap_started();
        self.fetcher.requeue_deferred(now);
    }

    /// Raises the frontier target when discovery learns of a taller chain.
    pub fn set_target(&mut self, target: Height) {
        if target > self.target {
            self.target = target;
        }
    }

    pub fn target(&self) -> Height {
        self.target
    }

    /// Feeds one fetched candidate into the chain.
    ///
    /// Candidates whose parents are missing are parked and the parent scheduled for
    /// fetching. On success, the returned list contains this candidate plus every
    /// parked descendant that became addable, in (height, id) order; the caller
    /// verifies and applies them in exactly that order.
    pub fn observe(
        &mut self,
        chain: &mut Chain,
        candidate: Candidate,
        now: Instant,
    ) -> Result<Vec<Candidate>, ConsensusError> {
        candidate.check_integrity()?;
        self.fetcher.remove(&candidate.id);

        match chain.add(candidate.clone()) {
            Ok(()) => {}
            Err(ConsensusError::NotFound(parent)) => {
                self.blocked.park(candidate);
                self.fetcher.add(parent, now);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        }
        self.stats.record_fetched();
        self.known.add(candidate.height);

        let mut applied = vec![candidate.clone()];
        for released in self.blocked.release(&candidate.id) {
            // Parents precede children in release order, so these adds cannot fail on
            // a missing parent; an integrity failure drops only the bad candidate.
            match chain.add(released.clone()) {
                Ok(()) => {
                    self.stats.record_fetched();
                    self.known.add(released.height);
                    applied.push(released);
                }
                Err(_) => {
                    self.stats.record_rejected();
                }
            }
        }
        self.maybe_complete();
        Ok(applied)
    }

    /// The fetch requests whose retry delay has elapsed.
    pub fn due_fetches(&mut self, now: Instant) -> Vec<FetchRequest> {
        self.fetcher.due(now)
    }

    pub fn on_fetch_response(&mut self, request_id: RequestId) {
        self.fetcher.on_response(request_id);
    }

    pub fn on_fetch_failure(
        &mut self,
        request_id: RequestId,
        now: Instant,
    ) -> Option<CandidateId> {
        self.fetcher.on_failure(request_id, now)
    }

    /// Bootstrap is complete when every height up to the target is known and nothing
    /// is waiting on a missing parent.
    pub fn is_complete(&self) -> bool {
        self.known.missing_ranges(self.target).is_empty() && self.blocked.is_empty()
    }

    fn maybe_complete(&mut self) {
        if self.is_complete() && !self.tracker.is_bootstrapped() {
            self.tracker.on_bootstrap_completed();
        }
    }

    /// Runs the worker loop until the frontier is covered or `deadline` passes.
    ///
    /// The worker owns the transport for the duration. It starts from `frontier` (the
    /// discovered head), sends GetAncestors requests round-robin over `peers`, parses
    /// responses through the VM, and feeds every candidate into [`Self::observe`].
    /// When all pending fetches exhaust their attempts, the deferred ids are requeued
    /// as a fresh cycle; a cycle with nothing left to requeue ends in a timeout.
    pub fn run<T: Transport, V: Vm>(
        &mut self,
        chain: &mut Chain,
        transport: &mut T,
        vm: &mut V,
        peers: &[VoterId],
        frontier: CandidateId,
        deadline: Instant,
        event_publisher: &Option<Sender<Event>>,
    ) -> Result<(), ConsensusError> {
        let now = Instant::now();
        self.start(now);
        self.known.add(Height::new(0));
        if self.is_complete() {
            self.maybe_complete();
            return Ok(());
        }
        if peers.is_empty() {
            return Err(ConsensusError::invalid_parameters(
                "peers",
                "bootstrap needs at least one peer to fetch from",
            ));
        }
        self.fetcher.add(frontier, now);
        Event::publish(
            event_publisher,
            Event::StartBootstrap(StartBootstrapEvent {
                timestamp: SystemTime::now(),
                target: self.target,
            }),
        );

        let mut next_peer = 0usize;
        while !self.is_complete() {
            let now = Instant::now();
            if now >= deadline {
                return Err(ConsensusError::Timeout("bootstrap deadline exceeded"));
            }
            if self.fetcher.pending_count() == 0 && self.fetcher.outstanding_count() == 0 {
                // Everything in flight exhausted its attempts; begin the next cycle.
                if self.fetcher.requeue_deferred(now) == 0 {
                    return Err(ConsensusError::Timeout("bootstrap stalled with no fetchable ids"));
                }
            }
            for request in self.due_fetches(now) {
                let peer = peers[next_peer % peers.len()];
                next_peer = next_peer.wrapping_add(1);
                transport.send_get_ancestors(peer, request.request_id, request.candidate_id)?;
            }
            let recv_deadline = (now + Duration::from_millis(50)).min(deadline);
            while let Some(event) = transport.recv(recv_deadline) {
                self.on_transport_event(chain, vm, event, event_publisher);
            }
        }

        Event::publish(
            event_publisher,
            Event::EndBootstrap(EndBootstrapEvent {
                timestamp: SystemTime::now(),
                fetched: self.stats.snapshot().num_fetched,
            }),
        );
        Ok(())
    }

    fn on_transport_event<V: Vm>(
        &mut self,
        chain: &mut Chain,
        vm: &mut V,
        event: TransportEvent,
        event_publisher: &Option<Sender<Event>>,
    ) {
        match event {
            TransportEvent::Ancestors {
                request_id,
                payloads,
                ..
            } => {
                self.on_fetch_response(request_id);
                // Child first on the wire; apply parents first.
                for payload in payloads.iter().rev() {
                    self.apply_payload(chain, vm, payload);
                }
            }
            TransportEvent::Put {
                request_id, payload, ..
            } => {
                self.on_fetch_response(request_id);
                self.apply_payload(chain, vm, &payload);
            }
            TransportEvent::GetAncestorsFailed { request_id, .. }
            | TransportEvent::GetFailed { request_id, .. } => {
                let before = self.fetcher.deferred().len();
                if let Some(id) = self.on_fetch_failure(request_id, Instant::now()) {
                    if self.fetcher.deferred().len() > before {
                        Event::publish(
                            event_publisher,
                            Event::DeferFetch(DeferFetchEvent {
                                timestamp: SystemTime::now(),
                                candidate_id: id,
                            }),
                        );
                    }
                }
            }
            // Chits belong to the voting engine, which is not running yet.
            TransportEvent::Chits(_) | TransportEvent::QueryFailed { .. } => (),
        }
    }

    fn apply_payload<V: Vm>(&mut self, chain: &mut Chain, vm: &mut V, payload: &[u8]) {
        let candidate = match vm.parse_block(payload) {
            Ok(candidate) => candidate,
            Err(err) => {
                self.stats.record_rejected();
                log::warn!("Bootstrap, unparseable candidate: {err}");
                return;
            }
        };
        match self.observe(chain, candidate, Instant::now()) {
            Ok(applied) => {
                // Fetched history is already final elsewhere: execute it as it becomes
                // contiguous, parents first.
                for candidate in applied {
                    if let Err(err) = vm.verify(&candidate) {
                        self.stats.record_rejected();
                        log::warn!("Bootstrap, candidate failed verification: {err}");
                        continue;
                    }
                    if let Err(err) = chain.accept(&candidate.id) {
                        self.stats.record_rejected();
                        log::warn!("Bootstrap, candidate not acceptable: {err}");
                        continue;
                    }
                    if let Err(err) = vm.accept(&candidate) {
                        log::warn!("Bootstrap, vm accept failed: {err}");
                        continue;
                    }
                    self.stats.record_accepted();
                }
            }
            Err(err) => {
                self.stats.record_rejected();
                log::warn!("Bootstrap, candidate refused: {err}");
            }
        }
    }

    pub fn stats_snapshot(&self) -> BootstrapStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn health_check(&self) -> HealthCheck {
        let mut check = HealthCheck::healthy();
        check.healthy = self.is_complete();
        check.insert("target_height", self.target.int());
        check.insert("known_heights", self.known.covered());
        check.insert("known_spans", self.known.span_count() as u64);
        check.insert("blocked", self.blocked.len() as u64);
        check.insert("pending_fetches", self.fetcher.pending_count() as u64);
        check.insert("deferred", self.fetcher.deferred().len() as u64);
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis() -> Candidate {
        Candidate::genesis(b"bs".to_vec(), b"g".to_vec())
    }

    fn child(parent: &Candidate, payload: &[u8]) -> Candidate {
        Candidate::new(
            b"bs".to_vec(),
            payload.to_vec(),
            parent.id,
            parent.height + 1,
        )
    }

    #[test]
    fn out_of_order_arrival_is_parked_and_released() {
        let g = genesis();
        let a = child(&g, b"a");
        let b = child(&a, b"b");
        let mut chain = Chain::new(g.clone()).unwrap();
        let mut bs = Bootstrapper::new(Height::new(2));
        let now = Instant::now();
        bs.start(now);
        bs.known.add(Height::new(0));

        // The grandchild arrives first; its parent gets scheduled for fetching.
        assert!(bs.observe(&mut chain, b.clone(), now).unwrap().is_empty());
        assert!(!bs.due_fetches(now).is_empty());
        assert!(!bs.is_complete());

        let applied = bs.observe(&mut chain, a.clone(), now).unwrap();
        assert_eq!(
            applied.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![a.id, b.id]
        );
        assert!(bs.is_complete());
        assert!(bs.tracker.is_bootstrapped());
        assert_eq!(bs.stats_snapshot().num_fetched, 2);
    }

    #[test]
    fn corrupt_candidates_are_refused() {
        let g = genesis();
        let mut bad = child(&g, b"x");
        bad.payload = b"tampered".to_vec();
        let mut chain = Chain::new(g).unwrap();
        let mut bs = Bootstrapper::new(Height::new(1));
        assert!(matches!(
            bs.observe(&mut chain, bad, Instant::now()),
            Err(ConsensusError::Integrity(_))
        ));
    }

    #[test]
    fn completion_requires_full_coverage() {
        let g = genesis();
        let a = child(&g, b"a");
        let mut chain = Chain::new(g).unwrap();
        let mut bs = Bootstrapper::new(Height::new(5));
        let now = Instant::now();
        bs.start(now);
        bs.observe(&mut chain, a, now).unwrap();
        // Heights 0 and 2..=5 are still unknown.
        assert!(!bs.is_complete());
        assert!(!bs.health_check().healthy);
    }
}
