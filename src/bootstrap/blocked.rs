/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Parking lot for candidates that arrived before their parents.

use std::collections::{HashMap, HashSet};

use crate::types::basic::CandidateId;
use crate::types::candidate::Candidate;

/// Candidates waiting on a missing parent.
///
/// A candidate is parked at most once; releases come out in ascending (height, id)
/// order so parents re-enter processing before their children.
#[derive(Default)]
pub struct BlockedSet {
    by_parent: HashMap<CandidateId, Vec<Candidate>>,
    parked: HashSet<CandidateId>,
}

impl BlockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a candidate until its parent shows up. Duplicate parks are ignored.
    pub fn park(&mut self, candidate: Candidate) {
        if !self.parked.insert(candidate.id) {
            return;
        }
        self.by_parent
            .entry(candidate.parent_id)
            .or_default()
            .push(candidate);
    }

    pub fn contains(&self, id: &CandidateId) -> bool {
        self.parked.contains(id)
    }

    /// Number of parked candidates.
    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    /// The distinct parent ids the set is waiting on.
    pub fn missing_parents(&self) -> Vec<CandidateId> {
        self.by_parent.keys().copied().collect()
    }

    /// Releases every candidate whose parent chain is now rooted at `parent`.
    ///
    /// Transitive: if a parked candidate is itself the parent of other parked
    /// candidates, they come out in the same call, ordered by (height, id).
    pub fn release(&mut self, parent: &CandidateId) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut frontier = vec![*parent];
        while let Some(next) = frontier.pop() {
            if let Some(children) = self.by_parent.remove(&next) {
                for child in children {
                    self.parked.remove(&child.id);
                    frontier.push(child.id);
                    out.push(child);
                }
            }
        }
        out.sort_by(|a, b| a.height.cmp(&b.height).then(a.id.cmp(&b.id)));
        out
    }

    /// Drops every parked candidate below or at `parent`'s subtree without releasing
    /// it. Used when the missing parent turns out to be rejected.
    pub fn discard(&mut self, parent: &CandidateId) -> usize {
        self.release(parent).len()
    }
}
