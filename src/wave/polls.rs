/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The registry of in-flight polls.
//!
//! Each poll tracks its committee, deadline and received chits. A poll completes when
//! every committee member has answered or failed, or early, as soon as the unanswered
//! peers can no longer change the alpha-threshold outcome.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::types::basic::{CandidateId, RequestId, Round, VoterId};

/// The tally handed to the wave engine when a poll completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollResult {
    pub request_id: RequestId,
    pub item: CandidateId,
    pub round: Round,
    pub yes: u32,
    pub no: u32,
    /// False when the poll expired before completing; the counts are then zeroed and the
    /// poll counts as inconclusive.
    pub conclusive: bool,
}

struct Poll {
    item: CandidateId,
    round: Round,
    committee: HashSet<VoterId>,
    deadline: Instant,
    yes: u32,
    no: u32,
    responded: HashSet<VoterId>,
    failed: u32,
}

impl Poll {
    fn missing(&self) -> u32 {
        self.committee.len() as u32 - self.yes - self.no - self.failed
    }
}

/// Tracks outstanding polls keyed by request id.
pub struct PollManager {
    polls: HashMap<RequestId, Poll>,
    alpha_preference: u32,
    alpha_confidence: u32,
}

impl PollManager {
    pub fn new(alpha_preference: u32, alpha_confidence: u32) -> Self {
        Self {
            polls: HashMap::new(),
            alpha_preference,
            alpha_confidence,
        }
    }

    /// Registers a new poll. Returns false (and ignores the call) on a duplicated
    /// request id.
    pub fn add(
        &mut self,
        request_id: RequestId,
        item: CandidateId,
        round: Round,
        committee: &[VoterId],
        deadline: Instant,
    ) -> bool {
        if self.polls.contains_key(&request_id) {
            return false;
        }
        self.polls.insert(
            request_id,
            Poll {
                item,
                round,
                committee: committee.iter().copied().collect(),
                deadline,
                yes: 0,
                no: 0,
                responded: HashSet::new(),
                failed: 0,
            },
        );
        true
    }

    /// Records a chit. Votes from unknown requests, peers outside the committee,
    /// duplicate responders, or mismatched rounds are ignored.
    ///
    /// Returns the tally when this chit completes the poll.
    pub fn record_chit(
        &mut self,
        request_id: RequestId,
        voter: VoterId,
        round: Round,
        preference: bool,
    ) -> Option<PollResult> {
        let poll = self.polls.get_mut(&request_id)?;
        if round != poll.round
            || !poll.committee.contains(&voter)
            || !poll.responded.insert(voter)
        {
            return None;
        }
        if preference {
            poll.yes += 1;
        } else {
            poll.no += 1;
        }
        self.try_complete(request_id)
    }

    /// Marks a committee member as failed for this poll (timeout or transport error).
    pub fn record_failure(&mut self, request_id: RequestId, voter: VoterId) -> Option<PollResult> {
        let poll = self.polls.get_mut(&request_id)?;
        if !poll.committee.contains(&voter) || !poll.responded.insert(voter) {
            return None;
        }
        poll.failed += 1;
        self.try_complete(request_id)
    }

    /// Drops every poll whose deadline has passed, returning them as inconclusive.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<PollResult> {
        let expired: Vec<RequestId> = self
            .polls
            .iter()
            .filter(|(_, poll)| poll.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .map(|request_id| {
                let poll = self.polls.remove(&request_id).expect("expired poll exists");
                PollResult {
                    request_id,
                    item: poll.item,
                    round: poll.round,
                    yes: 0,
                    no: 0,
                    conclusive: false,
                }
            })
            .collect()
    }

    /// The number of polls currently outstanding for one item.
    pub fn outstanding_for(&self, item: &CandidateId) -> usize {
        self.polls.values().filter(|poll| poll.item == *item).count()
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Completes the poll if its outcome can no longer change: one side reached
    /// alpha_confidence, both sides are mathematically short of alpha_preference, or
    /// every committee member has answered.
    fn try_complete(&mut self, request_id: RequestId) -> Option<PollResult> {
        let poll = self.polls.get(&request_id)?;
        let missing = poll.missing();
        let settled = poll.yes >= self.alpha_confidence
            || poll.no >= self.alpha_confidence
            || (poll.yes + missing < self.alpha_preference
                && poll.no + missing < self.alpha_preference)
            || missing == 0;
        if !settled {
            return None;
        }
        let poll = self.polls.remove(&request_id).expect("poll exists");
        Some(PollResult {
            request_id,
            item: poll.item,
            round: poll.round,
            yes: poll.yes,
            no: poll.no,
            conclusive: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn voters(n: usize) -> Vec<VoterId> {
        (0..n)
            .map(|i| VoterId::from_agent(&format!("v-{i}")))
            .collect()
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn completes_when_everyone_answers() {
        let committee = voters(3);
        let mut polls = PollManager::new(2, 3);
        let rid = RequestId::new(1);
        let item = CandidateId::of(b"d", b"p");
        assert!(polls.add(rid, item, Round::new(0), &committee, far()));

        assert!(polls.record_chit(rid, committee[0], Round::new(0), true).is_none());
        assert!(polls.record_chit(rid, committee[1], Round::new(0), false).is_none());
        let result = polls
            .record_chit(rid, committee[2], Round::new(0), false)
            .unwrap();
        assert_eq!((result.yes, result.no), (1, 2));
        assert!(result.conclusive);
        assert!(polls.is_empty());
    }

    #[test]
    fn early_termination_on_confidence_quorum() {
        let committee = voters(5);
        let mut polls = PollManager::new(3, 3);
        let rid = RequestId::new(7);
        polls.add(rid, CandidateId::of(b"d", b"p"), Round::new(1), &committee, far());

        polls.record_chit(rid, committee[0], Round::new(1), true);
        polls.record_chit(rid, committee[1], Round::new(1), true);
        let result = polls
            .record_chit(rid, committee[2], Round::new(1), true)
            .unwrap();
        assert_eq!(result.yes, 3);
        // The two remaining peers could not change the outcome.
    }

    #[test]
    fn early_termination_when_no_side_can_reach_alpha() {
        let committee = voters(5);
        let mut polls = PollManager::new(4, 5);
        let rid = RequestId::new(9);
        polls.add(rid, CandidateId::of(b"d", b"p"), Round::new(0), &committee, far());

        polls.record_chit(rid, committee[0], Round::new(0), true);
        polls.record_chit(rid, committee[1], Round::new(0), false);
        assert!(polls.record_chit(rid, committee[2], Round::new(0), true).is_none());
        // yes=2, no=2, missing=1: neither side can reach 4 any more.
        let result = polls
            .record_chit(rid, committee[3], Round::new(0), false)
            .unwrap();
        assert!(result.conclusive);
        assert_eq!((result.yes, result.no), (2, 2));
    }

    #[test]
    fn failures_count_toward_completion() {
        let committee = voters(3);
        let mut polls = PollManager::new(2, 2);
        let rid = RequestId::new(2);
        polls.add(rid, CandidateId::of(b"d", b"p"), Round::new(0), &committee, far());

        polls.record_chit(rid, committee[0], Round::new(0), true);
        assert!(polls.record_failure(rid, committee[1]).is_none());
        let result = polls.record_failure(rid, committee[2]).unwrap();
        assert_eq!((result.yes, result.no), (1, 0));
    }

    #[test]
    fn foreign_duplicate_and_out_of_round_chits_are_ignored() {
        let committee = voters(2);
        let outsider = VoterId::from_agent("outsider");
        let mut polls = PollManager::new(2, 2);
        let rid = RequestId::new(3);
        polls.add(rid, CandidateId::of(b"d", b"p"), Round::new(4), &committee, far());

        assert!(polls.record_chit(rid, outsider, Round::new(4), true).is_none());
        assert!(polls.record_chit(rid, committee[0], Round::new(3), true).is_none());
        assert!(polls.record_chit(rid, committee[0], Round::new(4), true).is_none());
        assert!(polls.record_chit(rid, committee[0], Round::new(4), true).is_none());
        assert_eq!(polls.len(), 1);
    }

    #[test]
    fn duplicate_request_id_is_rejected() {
        let committee = voters(2);
        let mut polls = PollManager::new(2, 2);
        let rid = RequestId::new(5);
        let item = CandidateId::of(b"d", b"p");
        assert!(polls.add(rid, item, Round::new(0), &committee, far()));
        assert!(!polls.add(rid, item, Round::new(1), &committee, far()));
    }

    #[test]
    fn expired_polls_come_back_inconclusive() {
        let committee = voters(3);
        let mut polls = PollManager::new(2, 2);
        let rid = RequestId::new(6);
        let deadline = Instant::now();
        polls.add(rid, CandidateId::of(b"d", b"p"), Round::new(0), &committee, deadline);
        polls.record_chit(rid, committee[0], Round::new(0), true);

        let expired = polls.sweep_expired(Instant::now() + Duration::from_millis(1));
        assert_eq!(expired.len(), 1);
        assert!(!expired[0].conclusive);
        assert_eq!((expired[0].yes, expired[0].no), (0, 0));
        assert!(polls.is_empty());
    }
}
