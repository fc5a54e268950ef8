/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable finality: how a preferred candidate becomes certified.
//!
//! Consensus decides *preference*; a [`FinalityPolicy`] decides when that preference is
//! *final* and emits a [`Certificate`] as evidence. Policies never initiate network
//! traffic. They are fed observations (`on_candidate`, `on_vote`, `on_poll_round`) and
//! queried (`maybe_finalize`), so different deployments can demand anything from no
//! evidence at all to dual classical + post-quantum signatures without touching the
//! sampling loop.

pub mod agreement;
pub mod l1;
pub mod none;
pub mod quantum;
pub mod quorum;
pub mod sample;

use crate::errors::ConsensusError;
use crate::types::basic::{CandidateId, PolicyId, Round};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;
use crate::types::vote::Vote;

/// One rule for turning votes into certificates.
///
/// Implementations are driven by the engine thread and are not required to be `Sync`;
/// `Send` suffices because each policy instance is owned by exactly one thread.
pub trait FinalityPolicy: Send {
    /// The tag stamped into every certificate this policy produces.
    fn policy_id(&self) -> PolicyId;

    /// Called when a candidate enters processing. Policies use this to learn heights
    /// and to reset any per-candidate vote state.
    fn on_candidate(&mut self, candidate: &Candidate);

    /// Feeds one accept- or reject-vote. Returns an error when the vote is malformed
    /// for this policy (for example a missing post-quantum share); such votes are
    /// dropped by the caller and the voter reported to the sampler.
    fn on_vote(&mut self, vote: &Vote) -> Result<(), ConsensusError>;

    /// Called after each poll round for a candidate with the final tally. Expired
    /// polls are reported with zeroed counts. Only convergence-style policies care.
    fn on_poll_round(&mut self, _id: &CandidateId, _round: Round, _yes: u32, _no: u32) {}

    /// Returns a certificate once the policy's finality condition holds for `id`, or
    /// `None` while evidence is still accumulating. Must be idempotent: asking again
    /// after finalization returns an equivalent certificate.
    fn maybe_finalize(&mut self, id: &CandidateId) -> Option<Certificate>;

    /// Verifies a certificate produced by a peer under the same policy.
    fn verify(&self, certificate: &Certificate) -> Result<(), ConsensusError>;
}
