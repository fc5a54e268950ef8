/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Finality anchored to an external L1: a candidate is final once an inclusion proof
//! for it exists on the settlement chain.

use std::collections::HashMap;

use crate::errors::ConsensusError;
use crate::finality::FinalityPolicy;
use crate::types::basic::{CandidateId, Height, PolicyId};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;
use crate::types::vote::Vote;

/// Connection to the settlement chain.
///
/// `inclusion_proof` is a poll: it returns `Ok(None)` while the candidate is not yet
/// included, `Ok(Some(proof))` once it is, and an error only for transport-level
/// failures. `verify_inclusion` checks a proof someone else obtained.
pub trait L1Verifier: Send {
    fn inclusion_proof(&self, id: &CandidateId) -> Result<Option<Vec<u8>>, ConsensusError>;
    fn verify_inclusion(&self, id: &CandidateId, proof: &[u8]) -> Result<(), ConsensusError>;
}

impl L1Verifier for Box<dyn L1Verifier> {
    fn inclusion_proof(&self, id: &CandidateId) -> Result<Option<Vec<u8>>, ConsensusError> {
        (**self).inclusion_proof(id)
    }

    fn verify_inclusion(&self, id: &CandidateId, proof: &[u8]) -> Result<(), ConsensusError> {
        (**self).verify_inclusion(id, proof)
    }
}

/// Finalizes candidates by querying an [`L1Verifier`] for inclusion proofs.
///
/// The certificate proof is the verifier-supplied inclusion proof verbatim; `signers`
/// is empty because the L1 itself is the authority.
pub struct L1InclusionPolicy<V: L1Verifier> {
    verifier: V,
    heights: HashMap<CandidateId, Height>,
    proofs: HashMap<CandidateId, Vec<u8>>,
}

impl<V: L1Verifier> L1InclusionPolicy<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            heights: HashMap::new(),
            proofs: HashMap::new(),
        }
    }
}

impl<V: L1Verifier> FinalityPolicy for L1InclusionPolicy<V> {
    fn policy_id(&self) -> PolicyId {
        PolicyId::L1Inclusion
    }

    fn on_candidate(&mut self, candidate: &Candidate) {
        self.heights.insert(candidate.id, candidate.height);
    }

    fn on_vote(&mut self, _vote: &Vote) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn maybe_finalize(&mut self, id: &CandidateId) -> Option<Certificate> {
        let height = *self.heights.get(id)?;
        if !self.proofs.contains_key(id) {
            // Transport failures leave the candidate pending; the next call retries.
            match self.verifier.inclusion_proof(id) {
                Ok(Some(proof)) => {
                    self.proofs.insert(*id, proof);
                }
                Ok(None) | Err(_) => return None,
            }
        }
        let proof = self.proofs.get(id)?.clone();
        Some(Certificate::new(
            *id,
            height,
            PolicyId::L1Inclusion,
            proof,
            Vec::new(),
        ))
    }

    fn verify(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        if certificate.policy_id != PolicyId::L1Inclusion {
            return Err(ConsensusError::Integrity(format!(
                "certificate policy is {}, expected L1Inclusion",
                certificate.policy_id
            )));
        }
        self.verifier
            .verify_inclusion(&certificate.candidate_id, &certificate.proof)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// A settlement chain stub whose inclusions are set by the test.
    struct FakeL1 {
        included: RefCell<HashMap<CandidateId, Vec<u8>>>,
    }

    impl FakeL1 {
        fn new() -> Self {
            Self {
                included: RefCell::new(HashMap::new()),
            }
        }

        fn include(&self, id: CandidateId, proof: &[u8]) {
            self.included.borrow_mut().insert(id, proof.to_vec());
        }
    }

    impl L1Verifier for FakeL1 {
        fn inclusion_proof(&self, id: &CandidateId) -> Result<Option<Vec<u8>>, ConsensusError> {
            Ok(self.included.borrow().get(id).cloned())
        }

        fn verify_inclusion(&self, id: &CandidateId, proof: &[u8]) -> Result<(), ConsensusError> {
            match self.included.borrow().get(id) {
                Some(known) if known == proof => Ok(()),
                _ => Err(ConsensusError::Integrity(
                    "proof does not match the settlement chain".to_string(),
                )),
            }
        }
    }

    #[test]
    fn pending_until_the_l1_includes_the_candidate() {
        let c = Candidate::genesis(b"d".to_vec(), b"p".to_vec());
        let l1 = FakeL1::new();
        let id = c.id;
        let mut policy = L1InclusionPolicy::new(l1);
        policy.on_candidate(&c);

        assert!(policy.maybe_finalize(&id).is_none());
        policy.verifier.include(id, b"merkle-branch");

        let cert = policy.maybe_finalize(&id).unwrap();
        assert_eq!(cert.proof, b"merkle-branch");
        policy.verify(&cert).unwrap();
    }

    #[test]
    fn verify_rejects_forged_proofs() {
        let c = Candidate::genesis(b"d".to_vec(), b"p".to_vec());
        let l1 = FakeL1::new();
        l1.include(c.id, b"real");
        let mut policy = L1InclusionPolicy::new(l1);
        policy.on_candidate(&c);

        let mut cert = policy.maybe_finalize(&c.id).unwrap();
        cert.proof = b"forged".to_vec();
        assert!(policy.verify(&cert).is_err());
    }
}
