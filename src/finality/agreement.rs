/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Two-phase agreement: a fast "soft" policy for low-latency commitment and a slower
//! "hard" policy for settlement-grade finality, tracked per candidate.

use std::collections::HashMap;

use crate::errors::ConsensusError;
use crate::finality::FinalityPolicy;
use crate::types::basic::{CandidateId, Round, SignatureScheme};
use crate::types::candidate::Candidate;
use crate::types::certificate::{AgreementState, Certificate};
use crate::types::vote::Vote;

/// Certificates newly issued by one advancement attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Advancement {
    pub soft: Option<Certificate>,
    pub hard: Option<Certificate>,
}

impl Advancement {
    pub fn is_empty(&self) -> bool {
        self.soft.is_none() && self.hard.is_none()
    }
}

/// Drives a soft and a hard [`FinalityPolicy`] in parallel over the same vote stream.
///
/// Every vote feeds the soft policy. Votes carrying aggregatable signatures (BLS,
/// Ringtail or Quasar) also feed the hard policy; plain or unsigned votes cannot
/// contribute to settlement evidence. Hard finality implies soft finality: a candidate
/// whose hard certificate lands first is soft-finalized with that same certificate.
pub struct TwoPhaseAgreement {
    soft: Box<dyn FinalityPolicy>,
    hard: Box<dyn FinalityPolicy>,
    states: HashMap<CandidateId, AgreementState>,
}

impl TwoPhaseAgreement {
    pub fn new(soft: Box<dyn FinalityPolicy>, hard: Box<dyn FinalityPolicy>) -> Self {
        Self {
            soft,
            hard,
            states: HashMap::new(),
        }
    }

    pub fn on_candidate(&mut self, candidate: &Candidate) {
        self.soft.on_candidate(candidate);
        self.hard.on_candidate(candidate);
        self.states
            .entry(candidate.id)
            .or_insert_with(|| AgreementState::new(candidate.id));
    }

    /// Routes one vote to the phases it can contribute to.
    pub fn on_vote(&mut self, vote: &Vote) -> Result<(), ConsensusError> {
        self.soft.on_vote(vote)?;
        match vote.scheme() {
            SignatureScheme::Bls | SignatureScheme::Ringtail | SignatureScheme::Quasar => {
                self.hard.on_vote(vote)
            }
            SignatureScheme::None | SignatureScheme::Ed25519 => Ok(()),
        }
    }

    pub fn on_poll_round(&mut self, id: &CandidateId, round: Round, yes: u32, no: u32) {
        self.soft.on_poll_round(id, round, yes, no);
        self.hard.on_poll_round(id, round, yes, no);
    }

    /// Attempts to advance both phases for a candidate, returning any certificates
    /// issued by this call. Already-finalized phases are not re-issued.
    pub fn try_advance(&mut self, id: &CandidateId) -> Advancement {
        let Some(state) = self.states.get_mut(id) else {
            return Advancement::default();
        };
        let mut out = Advancement::default();

        if !state.soft_finalized {
            if let Some(cert) = self.soft.maybe_finalize(id) {
                state.soft_finalized = true;
                state.soft_cert = Some(cert.clone());
                out.soft = Some(cert);
            }
        }
        if !state.hard_finalized {
            if let Some(cert) = self.hard.maybe_finalize(id) {
                state.hard_finalized = true;
                state.hard_cert = Some(cert.clone());
                if !state.soft_finalized {
                    // Settlement-grade evidence subsumes the fast phase.
                    state.soft_finalized = true;
                    state.soft_cert = Some(cert.clone());
                    out.soft = Some(cert.clone());
                }
                out.hard = Some(cert);
            }
        }
        out
    }

    pub fn state(&self, id: &CandidateId) -> Option<&AgreementState> {
        self.states.get(id)
    }

    pub fn is_soft_final(&self, id: &CandidateId) -> bool {
        self.states.get(id).map(|s| s.soft_finalized).unwrap_or(false)
    }

    pub fn is_hard_final(&self, id: &CandidateId) -> bool {
        self.states.get(id).map(|s| s.hard_finalized).unwrap_or(false)
    }

    pub fn verify_soft(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        self.soft.verify(certificate)
    }

    pub fn verify_hard(&self, certificate: &Certificate) -> Result<(), ConsensusError> {
        self.hard.verify(certificate)
    }
}
