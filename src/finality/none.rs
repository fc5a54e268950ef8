/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Immediate self-attested finality, for single-node and development setups.

use std::collections::HashMap;

use crate::errors::ConsensusError;
use crate::finality::FinalityPolicy;
use crate::types::basic::{CandidateId, Height, PolicyId};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;
use crate::types::vote::Vote;

/// The marker proof attached to self-attested certificates.
pub const SELF_PROOF: &[u8] = b"self";

/// Finalizes every known candidate immediately with the literal proof `"self"`.
#[derive(Default)]
pub struct NonePolicy {
    heights: HashMap<CandidateId, Height>,
}

impl NonePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FinalityPolicy for NonePolicy {
    fn policy_id(&self) -> PolicyId {
        PolicyId::None
    }

    fn on_candidate(&mut self, candidate: &Candidate) {
        self.heights.insert(candidate.id, candidate.height);
    }

    fn on_vote(&mut self, _vote: &Vote) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn maybe_finalize(&mut self, id: &CandidateId) -> Option<Certificate> {
        let height = *self.heights.get(id)?;
        Some(Certificate::new(
            *id,
            height,
            PolicyId::None,
            SELF_PROOF.to_vec(),
            Vec::new(),
        ))
    }

    fn verify(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        if certificate.policy_id != PolicyId::None {
            return Err(ConsensusError::Integrity(format!(
                "certificate policy is {}, expected None",
                certificate.policy_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candidate::Candidate;

    #[test]
    fn finalizes_immediately_with_self_proof() {
        let c = Candidate::genesis(b"d".to_vec(), b"p".to_vec());
        let mut policy = NonePolicy::new();
        assert!(policy.maybe_finalize(&c.id).is_none());
        policy.on_candidate(&c);
        let cert = policy.maybe_finalize(&c.id).unwrap();
        assert_eq!(cert.proof, SELF_PROOF);
        assert_eq!(cert.signer_count(), 0);
        policy.verify(&cert).unwrap();
    }
}
