/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use lux_consensus::sequencer::{Membership, Validator, ValidatorSet};
use lux_consensus::types::basic::VoterId;

/// A membership source with one fixed validator set across all epochs.
pub(crate) struct FixedMembership {
    set: ValidatorSet,
}

impl FixedMembership {
    /// Creates a set of `n` equally staked validators named `v0`, `v1`, ...
    pub(crate) fn with_peers(n: usize) -> Self {
        let mut set = ValidatorSet::new();
        for i in 0..n {
            set.add(Validator {
                id: VoterId::from_agent(&format!("v{i}")),
                stake: 1,
                address: None,
            })
            .unwrap();
        }
        Self { set }
    }

    pub(crate) fn peer_ids(&self) -> Vec<VoterId> {
        self.set.ids()
    }
}

impl Membership for FixedMembership {
    fn validator_set(&self, _epoch: u64) -> ValidatorSet {
        self.set.clone()
    }
}
