/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Classical BFT-style finality: a fixed count of distinct accept-votes.

use std::collections::{BTreeMap, HashMap};

use crate::errors::ConsensusError;
use crate::finality::FinalityPolicy;
use crate::types::basic::{CandidateId, Height, PolicyId, VoterId};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;
use crate::types::vote::Vote;

/// Finalizes a candidate once `threshold` distinct voters have sent accept-votes.
///
/// The certificate's `signers` field concatenates the voter ids in ascending id order
/// and `proof` concatenates their signatures in the same order, so two nodes that saw
/// the same vote set in different arrival orders produce identical certificates.
pub struct QuorumPolicy {
    threshold: usize,
    heights: HashMap<CandidateId, Height>,
    // Ordered by voter id so certificate bytes are arrival-order independent.
    accepts: HashMap<CandidateId, BTreeMap<VoterId, Vec<u8>>>,
}

impl QuorumPolicy {
    pub fn new(threshold: usize) -> Result<Self, ConsensusError> {
        if threshold == 0 {
            return Err(ConsensusError::invalid_parameters(
                "threshold",
                "quorum threshold must be at least 1",
            ));
        }
        Ok(Self {
            threshold,
            heights: HashMap::new(),
            accepts: HashMap::new(),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Distinct accept-voters seen so far for a candidate.
    pub fn accept_count(&self, id: &CandidateId) -> usize {
        self.accepts.get(id).map(BTreeMap::len).unwrap_or(0)
    }
}

impl FinalityPolicy for QuorumPolicy {
    fn policy_id(&self) -> PolicyId {
        PolicyId::Quorum
    }

    fn on_candidate(&mut self, candidate: &Candidate) {
        self.heights.insert(candidate.id, candidate.height);
        self.accepts.entry(candidate.id).or_default();
    }

    fn on_vote(&mut self, vote: &Vote) -> Result<(), ConsensusError> {
        if !vote.preference {
            return Ok(());
        }
        // A voter's latest accept-vote wins; duplicates don't inflate the count.
        self.accepts
            .entry(vote.candidate_id)
            .or_default()
            .insert(vote.voter_id, vote.signature.clone());
        Ok(())
    }

    fn maybe_finalize(&mut self, id: &CandidateId) -> Option<Certificate> {
        let votes = self.accepts.get(id)?;
        if votes.len() < self.threshold {
            return None;
        }
        let height = self.heights.get(id).copied().unwrap_or_default();
        let mut signers = Vec::with_capacity(votes.len() * 32);
        let mut proof = Vec::new();
        for (voter, signature) in votes {
            signers.extend_from_slice(&voter.bytes());
            proof.extend_from_slice(signature);
        }
        Some(Certificate::new(*id, height, PolicyId::Quorum, proof, signers))
    }

    fn verify(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        if certificate.policy_id != PolicyId::Quorum {
            return Err(ConsensusError::Integrity(format!(
                "certificate policy is {}, expected Quorum",
                certificate.policy_id
            )));
        }
        if certificate.proof.is_empty() {
            return Err(ConsensusError::Integrity(
                "quorum certificate carries no signature proof".to_string(),
            ));
        }
        if certificate.signers.len() % 32 != 0 {
            return Err(ConsensusError::Integrity(
                "quorum certificate signers are not a multiple of 32 bytes".to_string(),
            ));
        }
        if certificate.signer_count() < self.threshold {
            return Err(ConsensusError::Integrity(format!(
                "quorum certificate has {} signers, need {}",
                certificate.signer_count(),
                self.threshold
            )));
        }
        Ok(())
    }
}
