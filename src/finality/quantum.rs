/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Post-quantum dual-certificate finality (Quasar): every accept-vote must carry both a
//! BLS signature and a Ringtail lattice share, and the certificate commits to both
//! aggregates.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};

use crate::errors::ConsensusError;
use crate::finality::FinalityPolicy;
use crate::types::basic::{CandidateId, Height, PolicyId, SignatureScheme, VoterId};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;
use crate::types::vote::Vote;

/// Finalizes once `threshold` distinct voters have each supplied a well-formed Quasar
/// dual signature.
///
/// With `require_rt` set (the default), an accept-vote whose signature lacks the
/// Ringtail component is an error, not a silent skip: a deployment that opted into
/// post-quantum finality must not quietly degrade to classical security. The proof is
/// `[0x04 ‖ SHA-256(bls_1‖…‖bls_n ‖ rt_1‖…‖rt_n)]` with both lists in ascending voter-id
/// order.
pub struct QuantumPolicy {
    threshold: usize,
    require_rt: bool,
    heights: HashMap<CandidateId, Height>,
    bls_shares: HashMap<CandidateId, BTreeMap<VoterId, Vec<u8>>>,
    rt_shares: HashMap<CandidateId, BTreeMap<VoterId, Vec<u8>>>,
}

impl QuantumPolicy {
    pub fn new(threshold: usize, require_rt: bool) -> Result<Self, ConsensusError> {
        if threshold == 0 {
            return Err(ConsensusError::invalid_parameters(
                "threshold",
                "quantum threshold must be at least 1",
            ));
        }
        Ok(Self {
            threshold,
            require_rt,
            heights: HashMap::new(),
            bls_shares: HashMap::new(),
            rt_shares: HashMap::new(),
        })
    }

    pub fn share_count(&self, id: &CandidateId) -> usize {
        self.rt_shares.get(id).map(BTreeMap::len).unwrap_or(0)
    }

    fn commitment(
        bls: &BTreeMap<VoterId, Vec<u8>>,
        rt: &BTreeMap<VoterId, Vec<u8>>,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for sig in bls.values() {
            hasher.update(sig);
        }
        for share in rt.values() {
            hasher.update(share);
        }
        hasher.finalize().into()
    }
}

impl FinalityPolicy for QuantumPolicy {
    fn policy_id(&self) -> PolicyId {
        PolicyId::Quantum
    }

    fn on_candidate(&mut self, candidate: &Candidate) {
        self.heights.insert(candidate.id, candidate.height);
        self.bls_shares.entry(candidate.id).or_default();
        self.rt_shares.entry(candidate.id).or_default();
    }

    fn on_vote(&mut self, vote: &Vote) -> Result<(), ConsensusError> {
        if !vote.preference {
            return Ok(());
        }
        if !self.require_rt && vote.scheme() == SignatureScheme::Bls {
            // Degraded mode: accept bare BLS, contributing no lattice share.
            self.bls_shares
                .entry(vote.candidate_id)
                .or_default()
                .insert(vote.voter_id, vote.signature[1..].to_vec());
            return Ok(());
        }
        let (bls, rt) = vote.quasar_parts()?;
        self.bls_shares
            .entry(vote.candidate_id)
            .or_default()
            .insert(vote.voter_id, bls.to_vec());
        self.rt_shares
            .entry(vote.candidate_id)
            .or_default()
            .insert(vote.voter_id, rt.to_vec());
        Ok(())
    }

    fn maybe_finalize(&mut self, id: &CandidateId) -> Option<Certificate> {
        let bls = self.bls_shares.get(id)?;
        let rt = self.rt_shares.get(id)?;
        // Both shares must independently clear the threshold.
        let complete = if self.require_rt {
            bls.len().min(rt.len())
        } else {
            bls.len()
        };
        if complete < self.threshold {
            return None;
        }
        let height = self.heights.get(id).copied().unwrap_or_default();
        let mut proof = Vec::with_capacity(33);
        proof.push(SignatureScheme::Quasar.tag());
        proof.extend_from_slice(&Self::commitment(bls, rt));
        let mut signers = Vec::with_capacity(bls.len() * 32);
        for voter in bls.keys() {
            signers.extend_from_slice(&voter.bytes());
        }
        Some(Certificate::new(*id, height, PolicyId::Quantum, proof, signers))
    }

    fn verify(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        if certificate.policy_id != PolicyId::Quantum {
            return Err(ConsensusError::Integrity(format!(
                "certificate policy is {}, expected Quantum",
                certificate.policy_id
            )));
        }
        if certificate.proof.len() != 33 || certificate.proof[0] != SignatureScheme::Quasar.tag()
        {
            return Err(ConsensusError::Integrity(
                "quantum proof must be a tagged 32-byte dual commitment".to_string(),
            ));
        }
        if certificate.signer_count() < self.threshold {
            return Err(ConsensusError::Integrity(format!(
                "quantum certificate has {} signers, need {}",
                certificate.signer_count(),
                self.threshold
            )));
        }
        Ok(())
    }
}
