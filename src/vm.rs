/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The application seam: the state machine whose blocks are being sequenced.

use crate::errors::ConsensusError;
use crate::types::basic::CandidateId;
use crate::types::candidate::Candidate;

/// The state machine driven by consensus.
///
/// All calls are fallible and must be idempotent on the implementation side: the
/// engine may retry `accept` or `reject` after a crash-recovery replay. Accept
/// notifications arrive in strict height order along each branch.
pub trait Vm: Send {
    /// Decodes candidate bytes received from a peer.
    fn parse_block(&mut self, bytes: &[u8]) -> Result<Candidate, ConsensusError>;

    /// Retrieves a candidate the VM already knows.
    fn get_block(&mut self, id: &CandidateId) -> Result<Candidate, ConsensusError>;

    /// The id of the last candidate this VM accepted.
    fn last_accepted(&mut self) -> Result<CandidateId, ConsensusError>;

    /// Informs the VM of the engine's current preferred head.
    fn set_preference(&mut self, id: &CandidateId) -> Result<(), ConsensusError>;

    /// Application-level validity check, run before a candidate enters voting.
    fn verify(&mut self, candidate: &Candidate) -> Result<(), ConsensusError>;

    fn accept(&mut self, candidate: &Candidate) -> Result<(), ConsensusError>;

    fn reject(&mut self, candidate: &Candidate) -> Result<(), ConsensusError>;
}
