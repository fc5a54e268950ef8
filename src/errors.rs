/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The error kinds surfaced by the consensus core.
//!
//! Network-level timeouts and individual vote failures are recovered locally and never
//! reach the library user. [`ConsensusError::Integrity`] and [`ConsensusError::RtRequirement`]
//! are reported and counted, but do not halt the engine. [`ConsensusError::Conflict`] and
//! [`ConsensusError::InvalidParameters`] halt the affected candidate or subsystem.

use std::fmt;

use thiserror::Error;

use crate::types::basic::CandidateId;

/// An application-defined error carried across node boundaries.
///
/// Two `AppError`s are equal when their codes are equal; the message is advisory.
#[derive(Clone, Debug, Error)]
#[error("app error {code}: {msg}")]
pub struct AppError {
    pub code: u32,
    pub msg: String,
}

impl AppError {
    pub fn new(code: u32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

impl PartialEq for AppError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for AppError {}

/// Every failure mode of the consensus core.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Construction-time validation failed. Fatal for the component being built.
    #[error("invalid parameters: {field}: {reason}")]
    InvalidParameters {
        field: &'static str,
        reason: String,
    },

    /// Content id mismatch, malformed wire frame, or bad signature framing.
    /// The offending message is rejected and the sender is penalized.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// The referenced candidate is not known locally.
    #[error("candidate not found: {0}")]
    NotFound(CandidateId),

    /// A poll or fetch deadline was exceeded.
    #[error("timed out: {0}")]
    Timeout(&'static str),

    /// Cooperative cancellation. Returned up; never logged as an error.
    #[error("cancelled")]
    Cancelled,

    /// The quantum policy saw a non-Quasar or malformed dual signature.
    #[error("ringtail requirement: {0}")]
    RtRequirement(String),

    /// A peer address was an IP literal instead of a hostname.
    #[error("invalid peer address {addr:?}: must be a hostname, not an IP literal")]
    HostnameValidation { addr: String },

    /// An accept would violate the chain's branch invariants. Fatal for the candidate.
    #[error("conflict on {0}: {1}")]
    Conflict(CandidateId, String),

    /// An application error relayed from a remote node.
    #[error(transparent)]
    App(#[from] AppError),
}

impl ConsensusError {
    pub fn invalid_parameters(field: &'static str, reason: impl fmt::Display) -> Self {
        ConsensusError::InvalidParameters {
            field,
            reason: reason.to_string(),
        }
    }

    /// Whether this error is recovered locally rather than surfaced to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConsensusError::Timeout(_)
                | ConsensusError::Integrity(_)
                | ConsensusError::RtRequirement(_)
        )
    }
}
