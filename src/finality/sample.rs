/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Finality by repeated-sample convergence: the policy analogue of the sampling loop,
//! run over the completed poll tallies.

use std::collections::HashMap;

use crate::errors::ConsensusError;
use crate::finality::FinalityPolicy;
use crate::types::basic::{CandidateId, Height, PolicyId, Round};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;
use crate::types::vote::Vote;

struct Convergence {
    height: Height,
    pref: bool,
    confidence: u32,
    final_round: Round,
    finalized: bool,
}

/// Finalizes a candidate after `beta` consecutive poll rounds in which at least `alpha`
/// of the sampled committee said accept.
///
/// Evidence arrives through [`on_poll_round`](FinalityPolicy::on_poll_round): rounds
/// where neither side reaches `alpha` (including expired polls, reported with zeroed
/// counts) reset confidence, and a round won by reject flips the tracked preference,
/// exactly as the sampling loop would. Finalization additionally requires the converged
/// preference to be accept.
///
/// The certificate proof is `[confidence: u8 ‖ final_round: u64 BE]`; no signatures are
/// aggregated, so `signers` is empty.
pub struct SampleConvergencePolicy {
    alpha: u32,
    beta: u32,
    items: HashMap<CandidateId, Convergence>,
}

impl SampleConvergencePolicy {
    pub fn new(k: usize, alpha: u32, beta: u32) -> Result<Self, ConsensusError> {
        if k == 0 {
            return Err(ConsensusError::invalid_parameters("k", "sample size must be at least 1"));
        }
        if alpha == 0 || alpha as usize > k {
            return Err(ConsensusError::invalid_parameters(
                "alpha",
                "convergence threshold must satisfy 1 <= alpha <= k",
            ));
        }
        if beta == 0 {
            return Err(ConsensusError::invalid_parameters(
                "beta",
                "consecutive-round requirement must be at least 1",
            ));
        }
        Ok(Self {
            alpha,
            beta,
            items: HashMap::new(),
        })
    }

    pub fn confidence(&self, id: &CandidateId) -> u32 {
        self.items.get(id).map(|c| c.confidence).unwrap_or(0)
    }
}

impl FinalityPolicy for SampleConvergencePolicy {
    fn policy_id(&self) -> PolicyId {
        PolicyId::SampleConvergence
    }

    fn on_candidate(&mut self, candidate: &Candidate) {
        self.items.entry(candidate.id).or_insert(Convergence {
            height: candidate.height,
            pref: true,
            confidence: 0,
            final_round: Round::new(0),
            finalized: false,
        });
    }

    /// Individual votes carry no extra evidence for this policy; the sampled tallies
    /// delivered per round are the whole signal.
    fn on_vote(&mut self, _vote: &Vote) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn on_poll_round(&mut self, id: &CandidateId, round: Round, yes: u32, no: u32) {
        let alpha = self.alpha;
        let beta = self.beta;
        let Some(item) = self.items.get_mut(id) else {
            return;
        };
        if item.finalized {
            return;
        }

        let max = yes.max(no);
        if max < alpha {
            item.confidence = 0;
            return;
        }
        let winner = yes >= alpha;
        if winner == item.pref {
            item.confidence += 1;
        } else {
            item.pref = winner;
            item.confidence = 1;
        }
        if item.confidence >= beta && item.pref {
            item.final_round = round;
            item.finalized = true;
        }
    }

    fn maybe_finalize(&mut self, id: &CandidateId) -> Option<Certificate> {
        let item = self.items.get(id)?;
        if !item.finalized {
            return None;
        }
        let mut proof = Vec::with_capacity(1 + 8);
        proof.push(item.confidence.min(u8::MAX as u32) as u8);
        proof.extend_from_slice(&item.final_round.to_be_bytes());
        Some(Certificate::new(
            *id,
            item.height,
            PolicyId::SampleConvergence,
            proof,
            Vec::new(),
        ))
    }

    fn verify(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        if certificate.policy_id != PolicyId::SampleConvergence {
            return Err(ConsensusError::Integrity(format!(
                "certificate policy is {}, expected SampleConvergence",
                certificate.policy_id
            )));
        }
        if certificate.proof.len() != 9 {
            return Err(ConsensusError::Integrity(format!(
                "convergence proof is {} bytes, expected 9",
                certificate.proof.len()
            )));
        }
        if u32::from(certificate.proof[0]) < self.beta {
            return Err(ConsensusError::Integrity(format!(
                "convergence proof records confidence {}, need {}",
                certificate.proof[0], self.beta
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate::genesis(b"d".to_vec(), b"p".to_vec())
    }

    #[test]
    fn finalizes_after_beta_consecutive_clear_rounds() {
        let c = candidate();
        let mut policy = SampleConvergencePolicy::new(3, 2, 2).unwrap();
        policy.on_candidate(&c);

        policy.on_poll_round(&c.id, Round::new(0), 3, 0);
        assert!(policy.maybe_finalize(&c.id).is_none());
        policy.on_poll_round(&c.id, Round::new(1), 3, 0);

        let cert = policy.maybe_finalize(&c.id).unwrap();
        assert_eq!(cert.proof.len(), 9);
        assert_eq!(cert.proof[0], 2);
        assert_eq!(&cert.proof[1..], &1u64.to_be_bytes());
        assert!(cert.signers.is_empty());
        policy.verify(&cert).unwrap();
    }

    #[test]
    fn split_round_resets_the_streak() {
        let c = candidate();
        let mut policy = SampleConvergencePolicy::new(4, 3, 2).unwrap();
        policy.on_candidate(&c);

        policy.on_poll_round(&c.id, Round::new(0), 4, 0);
        assert_eq!(policy.confidence(&c.id), 1);
        // 2-2 split: neither side reaches alpha, confidence resets.
        policy.on_poll_round(&c.id, Round::new(1), 2, 2);
        assert_eq!(policy.confidence(&c.id), 0);
        for round in 2..4 {
            policy.on_poll_round(&c.id, Round::new(round), 4, 0);
        }
        assert!(policy.maybe_finalize(&c.id).is_some());
    }

    #[test]
    fn expired_round_with_zeroed_counts_resets_the_streak() {
        let c = candidate();
        let mut policy = SampleConvergencePolicy::new(3, 2, 2).unwrap();
        policy.on_candidate(&c);

        policy.on_poll_round(&c.id, Round::new(0), 3, 0);
        assert_eq!(policy.confidence(&c.id), 1);
        policy.on_poll_round(&c.id, Round::new(1), 0, 0);
        assert_eq!(policy.confidence(&c.id), 0);
    }

    #[test]
    fn reject_convergence_never_finalizes() {
        let c = candidate();
        let mut policy = SampleConvergencePolicy::new(3, 2, 1).unwrap();
        policy.on_candidate(&c);
        policy.on_poll_round(&c.id, Round::new(0), 0, 3);
        // The preference converged to reject; there is nothing to certify.
        assert!(policy.maybe_finalize(&c.id).is_none());
    }

    #[test]
    fn rounds_after_finalization_are_frozen() {
        let c = candidate();
        let mut policy = SampleConvergencePolicy::new(3, 2, 1).unwrap();
        policy.on_candidate(&c);
        policy.on_poll_round(&c.id, Round::new(0), 3, 0);
        let before = policy.maybe_finalize(&c.id).unwrap();

        policy.on_poll_round(&c.id, Round::new(1), 0, 3);
        let after = policy.maybe_finalize(&c.id).unwrap();
        assert_eq!(before.proof, after.proof);
        assert_eq!(policy.confidence(&c.id), 1);
    }

    #[test]
    fn verify_rejects_insufficient_confidence() {
        let policy = SampleConvergencePolicy::new(3, 2, 5).unwrap();
        let mut proof = vec![2u8];
        proof.extend_from_slice(&7u64.to_be_bytes());
        let cert = Certificate::new(
            CandidateId::of(b"d", b"p"),
            Height::new(0),
            PolicyId::SampleConvergence,
            proof,
            Vec::new(),
        );
        assert!(policy.verify(&cert).is_err());
    }

    #[test]
    fn parameter_validation() {
        assert!(SampleConvergencePolicy::new(0, 1, 1).is_err());
        assert!(SampleConvergencePolicy::new(3, 4, 1).is_err());
        assert!(SampleConvergencePolicy::new(3, 2, 0).is_err());
    }
}
