/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The metastable voting core: per-item wave states plus the poll registry, driven by
//! whoever owns the network loop.

use std::collections::HashMap;
use std::time::Instant;

use crate::errors::ConsensusError;
use crate::health::HealthCheck;
use crate::parameters::Parameters;
use crate::types::basic::{CandidateId, RequestId, Round, VoterId};
use crate::wave::polls::{PollManager, PollResult};
use crate::wave::state::{PollEffect, WaveState};

/// One completed poll applied to an item's wave state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollApplication {
    pub request_id: RequestId,
    pub item: CandidateId,
    pub round: Round,
    pub yes: u32,
    pub no: u32,
    pub conclusive: bool,
    pub effect: PollEffect,
}

impl PollApplication {
    /// The decision carried by this application, if it decided the item.
    pub fn decision(&self) -> Option<bool> {
        match self.effect {
            PollEffect::Decided(preference) => Some(preference),
            _ => None,
        }
    }
}

/// Drives repeated sampled polls per item until each item decides.
///
/// The engine is a state machine: it owns no transport and spawns no threads. Callers
/// ask [`begin_poll`](WaveEngine::begin_poll) for a request to send, feed responses
/// back through [`record_chit`](WaveEngine::record_chit) and
/// [`record_failure`](WaveEngine::record_failure), and periodically
/// [`sweep_expired`](WaveEngine::sweep_expired). Ticks for one item must be serialized
/// by the caller; distinct items are independent.
pub struct WaveEngine {
    parameters: Parameters,
    states: HashMap<CandidateId, WaveState>,
    next_round: HashMap<CandidateId, Round>,
    observed_at: HashMap<CandidateId, Instant>,
    polls: PollManager,
    next_request: u32,
}

impl WaveEngine {
    pub fn new(parameters: Parameters) -> Result<Self, ConsensusError> {
        parameters.validate()?;
        let polls = PollManager::new(parameters.alpha_preference, parameters.alpha_confidence);
        Ok(Self {
            parameters,
            states: HashMap::new(),
            next_round: HashMap::new(),
            observed_at: HashMap::new(),
            polls,
            next_request: 0,
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Registers an item for voting with preference accept. Returns false if the item
    /// is already tracked, or if the outstanding-item limit is reached.
    pub fn observe(&mut self, item: CandidateId) -> bool {
        if self.states.contains_key(&item) {
            return false;
        }
        if self.undecided_count() >= self.parameters.max_outstanding_items as usize {
            return false;
        }
        self.states.insert(item, WaveState::new());
        self.next_round.insert(item, Round::new(0));
        self.observed_at.insert(item, Instant::now());
        true
    }

    pub fn contains(&self, item: &CandidateId) -> bool {
        self.states.contains_key(item)
    }

    pub fn is_decided(&self, item: &CandidateId) -> bool {
        self.states.get(item).map(WaveState::is_decided).unwrap_or(false)
    }

    /// The item's current preference; `None` for untracked items.
    pub fn preference(&self, item: &CandidateId) -> Option<bool> {
        self.states.get(item).map(WaveState::preference)
    }

    pub fn confidence(&self, item: &CandidateId) -> u32 {
        self.states.get(item).map(WaveState::confidence).unwrap_or(0)
    }

    /// Whether a new poll may start for this item right now.
    pub fn can_poll(&self, item: &CandidateId) -> bool {
        match self.states.get(item) {
            Some(state) => {
                !state.is_decided()
                    && self.polls.outstanding_for(item)
                        < self.parameters.concurrent_polls as usize
            }
            None => false,
        }
    }

    /// Opens a poll for `item` against `committee`, returning the request id and
    /// round the caller should put on the wire. No-op when the item is decided or its
    /// concurrent-poll budget is spent.
    pub fn begin_poll(
        &mut self,
        item: CandidateId,
        committee: &[VoterId],
        deadline: Instant,
    ) -> Option<(RequestId, Round)> {
        if !self.can_poll(&item) || committee.is_empty() {
            return None;
        }
        let round = *self.next_round.get(&item)?;
        self.next_request = self.next_request.wrapping_add(1);
        let request_id = RequestId::new(self.next_request);
        if !self.polls.add(request_id, item, round, committee, deadline) {
            return None;
        }
        if let Some(next) = self.next_round.get_mut(&item) {
            *next += 1;
        }
        Some((request_id, round))
    }

    /// Feeds one chit into its poll. Returns the applied result when the chit
    /// completes the poll.
    pub fn record_chit(
        &mut self,
        request_id: RequestId,
        voter: VoterId,
        round: Round,
        preference: bool,
    ) -> Option<PollApplication> {
        let result = self.polls.record_chit(request_id, voter, round, preference)?;
        Some(self.apply(result))
    }

    /// Marks one committee member as unresponsive for its poll.
    pub fn record_failure(
        &mut self,
        request_id: RequestId,
        voter: VoterId,
    ) -> Option<PollApplication> {
        let result = self.polls.record_failure(request_id, voter)?;
        Some(self.apply(result))
    }

    /// Expires overdue polls, counting each as an inconclusive round.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<PollApplication> {
        self.polls
            .sweep_expired(now)
            .into_iter()
            .map(|result| self.apply(result))
            .collect()
    }

    fn apply(&mut self, result: PollResult) -> PollApplication {
        let effect = match self.states.get_mut(&result.item) {
            Some(state) if result.conclusive => state.record_poll(
                result.yes,
                result.no,
                self.parameters.alpha_preference,
                self.parameters.alpha_confidence,
                self.parameters.beta,
            ),
            Some(state) => state.record_inconclusive(),
            None => PollEffect::Frozen,
        };
        PollApplication {
            request_id: result.request_id,
            item: result.item,
            round: result.round,
            yes: result.yes,
            no: result.no,
            conclusive: result.conclusive,
            effect,
        }
    }

    /// The items still awaiting a decision.
    pub fn undecided_items(&self) -> Vec<CandidateId> {
        self.states
            .iter()
            .filter(|(_, state)| !state.is_decided())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn rounds(&self, item: &CandidateId) -> u64 {
        self.states.get(item).map(WaveState::rounds).unwrap_or(0)
    }

    pub fn undecided_count(&self) -> usize {
        self.states.values().filter(|s| !s.is_decided()).count()
    }

    /// Drops a decided item's state once the chain no longer needs it.
    pub fn forget(&mut self, item: &CandidateId) {
        self.states.remove(item);
        self.next_round.remove(item);
        self.observed_at.remove(item);
    }

    /// Reports unhealthy when any undecided item has been processing longer than
    /// `max_item_processing_time`.
    pub fn health_check(&self) -> HealthCheck {
        let now = Instant::now();
        let longest = self
            .states
            .iter()
            .filter(|(_, state)| !state.is_decided())
            .filter_map(|(id, _)| self.observed_at.get(id))
            .map(|since| now.saturating_duration_since(*since))
            .max()
            .unwrap_or_default();
        let mut check = HealthCheck::healthy();
        check.healthy = longest <= self.parameters.max_item_processing_time;
        check.insert("items", self.states.len() as u64);
        check.insert("undecided", self.undecided_count() as u64);
        check.insert("outstanding_polls", self.polls.len() as u64);
        check.insert("longest_processing_ms", longest.as_millis() as u64);
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_engine() -> WaveEngine {
        // K=5, alpha=4, beta=5.
        WaveEngine::new(Parameters::local()).unwrap()
    }

    fn committee(n: usize) -> Vec<VoterId> {
        (0..n)
            .map(|i| VoterId::from_agent(&format!("peer-{i}")))
            .collect()
    }

    fn item(n: u8) -> CandidateId {
        CandidateId::of(b"wave", &[n])
    }

    /// Runs one full poll round where `yes` of the committee answer accept and the
    /// rest answer reject.
    fn run_round(engine: &mut WaveEngine, item: CandidateId, peers: &[VoterId], yes: usize) {
        let deadline = Instant::now() + Duration::from_secs(1);
        let (request_id, round) = engine.begin_poll(item, peers, deadline).unwrap();
        for (i, peer) in peers.iter().enumerate() {
            engine.record_chit(request_id, *peer, round, i < yes);
        }
    }

    #[test]
    fn unanimous_rounds_decide_within_beta() {
        let mut engine = local_engine();
        let id = item(1);
        assert!(engine.observe(id));

        let peers = committee(5);
        for round in 0..engine.parameters().beta {
            assert_eq!(engine.confidence(&id), round);
            run_round(&mut engine, id, &peers, 5);
        }
        assert!(engine.is_decided(&id));
        assert_eq!(engine.preference(&id), Some(true));
        assert_eq!(engine.rounds(&id), engine.parameters().beta as u64);
    }

    #[test]
    fn decided_items_freeze() {
        let mut engine = local_engine();
        let id = item(1);
        engine.observe(id);
        let peers = committee(5);
        for _ in 0..5 {
            run_round(&mut engine, id, &peers, 5);
        }
        assert!(engine.is_decided(&id));

        // Further polls cannot start and the state cannot move.
        assert!(!engine.can_poll(&id));
        assert!(engine
            .begin_poll(id, &peers, Instant::now() + Duration::from_secs(1))
            .is_none());
        assert_eq!(engine.preference(&id), Some(true));
    }

    #[test]
    fn reject_supermajority_decides_false() {
        let mut engine = local_engine();
        let id = item(2);
        engine.observe(id);
        let peers = committee(5);

        // First reject round flips the preference, then confidence builds.
        for _ in 0..5 {
            run_round(&mut engine, id, &peers, 0);
        }
        assert!(engine.is_decided(&id));
        assert_eq!(engine.preference(&id), Some(false));
    }

    #[test]
    fn concurrent_poll_budget_is_enforced() {
        let mut engine = local_engine();
        let id = item(3);
        engine.observe(id);
        let peers = committee(5);
        let deadline = Instant::now() + Duration::from_secs(1);

        // Parameters::local allows two concurrent polls per item.
        assert!(engine.begin_poll(id, &peers, deadline).is_some());
        assert!(engine.begin_poll(id, &peers, deadline).is_some());
        assert!(engine.begin_poll(id, &peers, deadline).is_none());
    }

    #[test]
    fn expired_polls_reset_confidence() {
        let mut engine = local_engine();
        let id = item(4);
        engine.observe(id);
        let peers = committee(5);

        run_round(&mut engine, id, &peers, 5);
        assert_eq!(engine.confidence(&id), 1);

        let start = Instant::now();
        engine.begin_poll(id, &peers, start + Duration::from_millis(10));
        let applications = engine.sweep_expired(start + Duration::from_millis(11));
        assert_eq!(applications.len(), 1);
        assert!(!applications[0].conclusive);
        assert_eq!(engine.confidence(&id), 0);
        assert!(!engine.is_decided(&id));
    }

    #[test]
    fn observe_respects_outstanding_limit() {
        let mut parameters = Parameters::local();
        parameters.max_outstanding_items = 5;
        let mut engine = WaveEngine::new(parameters).unwrap();
        for n in 0..5u8 {
            assert!(engine.observe(item(n)));
        }
        assert!(!engine.observe(item(5)));
    }

    #[test]
    fn health_degrades_when_an_item_processes_too_long() {
        let mut parameters = Parameters::local();
        parameters.max_item_processing_time = Duration::from_millis(1);
        let mut engine = WaveEngine::new(parameters).unwrap();
        assert!(engine.health_check().healthy);

        engine.observe(item(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!engine.health_check().healthy);
    }

    #[test]
    fn duplicate_observe_is_rejected() {
        let mut engine = local_engine();
        assert!(engine.observe(item(1)));
        assert!(!engine.observe(item(1)));
    }
}
