/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The candidate graph: statuses, parent/child links and the accepted frontier.
//!
//! Candidates live in an arena; parent and child links are indices into it, never owning
//! references. Status transitions are monotonic: `Unknown → Processing → {Accepted,
//! Rejected}`, with the terminal states final. Accepting a candidate rejects every
//! conflicting sibling on its branch, and rejection cascades to descendants.

use std::collections::HashMap;

use crate::errors::ConsensusError;
use crate::health::HealthCheck;
use crate::types::basic::{CandidateId, Height, Status};
use crate::types::candidate::Candidate;

struct Entry {
    candidate: Candidate,
    parent: Option<usize>,
    children: Vec<usize>,
    status: Status,
}

/// The outcome of accepting one candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcceptOutcome {
    /// Conflicting siblings (and their descendants) rejected by this accept, in the
    /// order they were rejected.
    pub rejected: Vec<CandidateId>,
}

/// Container for the candidate DAG of one consensus instance.
pub struct Chain {
    arena: Vec<Entry>,
    index: HashMap<CandidateId, usize>,
    /// Accepted candidates with no accepted children.
    frontier: Vec<usize>,
    genesis: usize,
}

impl Chain {
    /// Creates a chain rooted at `genesis`, which is immediately accepted.
    pub fn new(genesis: Candidate) -> Result<Self, ConsensusError> {
        genesis.check_integrity()?;
        if !genesis.is_genesis() {
            return Err(ConsensusError::invalid_parameters(
                "genesis",
                "genesis must have a zero parent and height 0",
            ));
        }
        let mut index = HashMap::new();
        index.insert(genesis.id, 0);
        Ok(Self {
            arena: vec![Entry {
                candidate: genesis,
                parent: None,
                children: Vec::new(),
                status: Status::Accepted,
            }],
            index,
            frontier: vec![0],
            genesis: 0,
        })
    }

    /// Registers a candidate on first observation.
    ///
    /// Fails with an integrity error on a bad content address or height, and with
    /// `NotFound(parent)` when the parent is unknown; during bootstrap the caller parks
    /// such candidates in the blocked set instead. Re-adding a known candidate is a
    /// no-op.
    pub fn add(&mut self, candidate: Candidate) -> Result<(), ConsensusError> {
        candidate.check_integrity()?;
        if self.index.contains_key(&candidate.id) {
            return Ok(());
        }
        let parent_idx = *self
            .index
            .get(&candidate.parent_id)
            .ok_or(ConsensusError::NotFound(candidate.parent_id))?;
        let parent_height = self.arena[parent_idx].candidate.height;
        if candidate.height != parent_height + 1 {
            return Err(ConsensusError::Integrity(format!(
                "candidate {} has height {}, expected {}",
                candidate.id,
                candidate.height,
                parent_height + 1
            )));
        }
        let idx = self.arena.len();
        self.index.insert(candidate.id, idx);
        self.arena.push(Entry {
            candidate,
            parent: Some(parent_idx),
            children: Vec::new(),
            status: Status::Processing,
        });
        self.arena[parent_idx].children.push(idx);
        Ok(())
    }

    pub fn contains(&self, id: &CandidateId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &CandidateId) -> Option<&Candidate> {
        self.index.get(id).map(|&idx| &self.arena[idx].candidate)
    }

    /// The status of a candidate; `Unknown` for ids never observed.
    pub fn status(&self, id: &CandidateId) -> Status {
        self.index
            .get(id)
            .map(|&idx| self.arena[idx].status)
            .unwrap_or(Status::Unknown)
    }

    pub fn is_accepted(&self, id: &CandidateId) -> bool {
        self.status(id) == Status::Accepted
    }

    /// Accepts a candidate, rejecting all conflicting siblings on its branch.
    ///
    /// Conflicts (rejected candidate, parent not accepted, accepted sibling) surface as
    /// errors; accepting an already accepted candidate is a no-op.
    pub fn accept(&mut self, id: &CandidateId) -> Result<AcceptOutcome, ConsensusError> {
        let idx = *self
            .index
            .get(id)
            .ok_or(ConsensusError::NotFound(*id))?;
        match self.arena[idx].status {
            Status::Accepted => return Ok(AcceptOutcome::default()),
            Status::Rejected => {
                return Err(ConsensusError::Conflict(
                    *id,
                    "candidate was already rejected".to_string(),
                ))
            }
            Status::Processing | Status::Unknown => {}
        }

        // Genesis is accepted at construction and handled by the no-op arm above, so
        // anything reaching this point has a parent.
        let parent_idx = match self.arena[idx].parent {
            Some(p) => p,
            None => return Ok(AcceptOutcome::default()),
        };
        if self.arena[parent_idx].status != Status::Accepted {
            return Err(ConsensusError::Conflict(
                *id,
                format!(
                    "parent {} is not accepted",
                    self.arena[parent_idx].candidate.id
                ),
            ));
        }
        let conflicting_accepted = self.arena[parent_idx]
            .children
            .iter()
            .any(|&sib| sib != idx && self.arena[sib].status == Status::Accepted);
        if conflicting_accepted {
            return Err(ConsensusError::Conflict(
                *id,
                "a sibling at this height is already accepted".to_string(),
            ));
        }

        self.arena[idx].status = Status::Accepted;

        let mut outcome = AcceptOutcome::default();
        let siblings: Vec<usize> = self.arena[parent_idx]
            .children
            .iter()
            .copied()
            .filter(|&sib| sib != idx)
            .collect();
        for sib in siblings {
            self.reject_subtree(sib, &mut outcome.rejected);
        }

        self.frontier.retain(|&f| f != parent_idx);
        self.frontier.push(idx);
        Ok(outcome)
    }

    /// Rejects a candidate and, recursively, all of its descendants.
    pub fn reject(&mut self, id: &CandidateId) -> Result<Vec<CandidateId>, ConsensusError> {
        let idx = *self
            .index
            .get(id)
            .ok_or(ConsensusError::NotFound(*id))?;
        if self.arena[idx].status == Status::Accepted {
            return Err(ConsensusError::Conflict(
                *id,
                "cannot reject an accepted candidate".to_string(),
            ));
        }
        let mut rejected = Vec::new();
        self.reject_subtree(idx, &mut rejected);
        Ok(rejected)
    }

    fn reject_subtree(&mut self, idx: usize, rejected: &mut Vec<CandidateId>) {
        if self.arena[idx].status == Status::Rejected {
            return;
        }
        debug_assert_ne!(
            self.arena[idx].status,
            Status::Accepted,
            "rejecting an accepted candidate {}",
            self.arena[idx].candidate.id
        );
        self.arena[idx].status = Status::Rejected;
        rejected.push(self.arena[idx].candidate.id);
        let children = self.arena[idx].children.clone();
        for child in children {
            self.reject_subtree(child, rejected);
        }
    }

    /// The deepest accepted head: the frontier entry of greatest height, ties broken by
    /// smallest id.
    pub fn preference(&self) -> CandidateId {
        self.frontier
            .iter()
            .map(|&idx| &self.arena[idx].candidate)
            .max_by(|a, b| a.height.cmp(&b.height).then(b.id.cmp(&a.id)))
            .map(|c| c.id)
            .unwrap_or(self.arena[self.genesis].candidate.id)
    }

    /// The accepted candidates with no accepted children.
    pub fn frontier(&self) -> Vec<CandidateId> {
        self.frontier
            .iter()
            .map(|&idx| self.arena[idx].candidate.id)
            .collect()
    }

    pub fn children_of(&self, id: &CandidateId) -> Vec<CandidateId> {
        match self.index.get(id) {
            Some(&idx) => self.arena[idx]
                .children
                .iter()
                .map(|&c| self.arena[c].candidate.id)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        false // There is always at least genesis.
    }

    pub fn processing_count(&self) -> usize {
        self.arena
            .iter()
            .filter(|e| e.status == Status::Processing)
            .count()
    }

    pub fn health_check(&self) -> HealthCheck {
        let mut check = HealthCheck::healthy();
        check.insert("candidates", self.arena.len() as u64);
        check.insert("processing", self.processing_count() as u64);
        check.insert(
            "frontier_height",
            self.index
                .get(&self.preference())
                .map(|&i| self.arena[i].candidate.height.int())
                .unwrap_or(0),
        );
        check
    }

    /// The height of a candidate, if known.
    pub fn height_of(&self, id: &CandidateId) -> Option<Height> {
        self.get(id).map(|c| c.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis() -> Candidate {
        Candidate::genesis(b"test".to_vec(), b"genesis".to_vec())
    }

    fn child(parent: &Candidate, payload: &[u8]) -> Candidate {
        Candidate::new(
            b"test".to_vec(),
            payload.to_vec(),
            parent.id,
            parent.height + 1,
        )
    }

    #[test]
    fn add_requires_known_parent() {
        let g = genesis();
        let mut chain = Chain::new(g.clone()).unwrap();
        let orphan = Candidate::new(
            b"test".to_vec(),
            b"orphan".to_vec(),
            CandidateId::of(b"no", b"where"),
            Height::new(1),
        );
        assert!(matches!(
            chain.add(orphan),
            Err(ConsensusError::NotFound(_))
        ));
        let ok = child(&g, b"a");
        chain.add(ok).unwrap();
    }

    #[test]
    fn add_rejects_wrong_height() {
        let g = genesis();
        let mut chain = Chain::new(g.clone()).unwrap();
        let skipper = Candidate::new(b"test".to_vec(), b"skip".to_vec(), g.id, Height::new(5));
        assert!(matches!(
            chain.add(skipper),
            Err(ConsensusError::Integrity(_))
        ));
    }

    #[test]
    fn accept_rejects_conflicting_siblings() {
        let g = genesis();
        let a = child(&g, b"a");
        let b = child(&g, b"b");
        let b_child = child(&b, b"bc");
        let mut chain = Chain::new(g).unwrap();
        chain.add(a.clone()).unwrap();
        chain.add(b.clone()).unwrap();
        chain.add(b_child.clone()).unwrap();

        let outcome = chain.accept(&a.id).unwrap();
        assert_eq!(outcome.rejected, vec![b.id, b_child.id]);
        assert_eq!(chain.status(&a.id), Status::Accepted);
        assert_eq!(chain.status(&b.id), Status::Rejected);
        assert_eq!(chain.status(&b_child.id), Status::Rejected);
        assert_eq!(chain.preference(), a.id);
    }

    #[test]
    fn cannot_accept_child_of_unaccepted_parent() {
        let g = genesis();
        let a = child(&g, b"a");
        let aa = child(&a, b"aa");
        let mut chain = Chain::new(g).unwrap();
        chain.add(a.clone()).unwrap();
        chain.add(aa.clone()).unwrap();
        assert!(matches!(
            chain.accept(&aa.id),
            Err(ConsensusError::Conflict(_, _))
        ));
        chain.accept(&a.id).unwrap();
        chain.accept(&aa.id).unwrap();
    }

    #[test]
    fn no_two_accepted_siblings() {
        let g = genesis();
        let a = child(&g, b"a");
        let b = child(&g, b"b");
        let mut chain = Chain::new(g).unwrap();
        chain.add(a.clone()).unwrap();
        chain.add(b.clone()).unwrap();
        chain.accept(&a.id).unwrap();
        // `b` was rejected by accepting `a`; accepting it again must fail.
        assert!(chain.accept(&b.id).is_err());
    }

    #[test]
    fn accept_is_idempotent() {
        let g = genesis();
        let a = child(&g, b"a");
        let mut chain = Chain::new(g).unwrap();
        chain.add(a.clone()).unwrap();
        chain.accept(&a.id).unwrap();
        assert_eq!(chain.accept(&a.id).unwrap(), AcceptOutcome::default());
    }

    #[test]
    fn frontier_follows_the_accepted_head() {
        let g = genesis();
        let a = child(&g, b"a");
        let aa = child(&a, b"aa");
        let mut chain = Chain::new(g.clone()).unwrap();
        assert_eq!(chain.preference(), g.id);
        chain.add(a.clone()).unwrap();
        chain.add(aa.clone()).unwrap();
        chain.accept(&a.id).unwrap();
        chain.accept(&aa.id).unwrap();
        assert_eq!(chain.frontier(), vec![aa.id]);
        assert_eq!(chain.preference(), aa.id);
    }

    #[test]
    fn status_of_unknown_is_unknown() {
        let chain = Chain::new(genesis()).unwrap();
        assert_eq!(chain.status(&CandidateId::of(b"x", b"y")), Status::Unknown);
    }
}
