/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The atom of ordering: any content-addressed blob to be sequenced.

use serde::{Deserialize, Serialize};

use crate::errors::ConsensusError;
use crate::types::basic::{now_ms, serde_hex, CandidateId, Height, NetId, VoterId};

/// Anything being sequenced: a block, a transaction batch, an agent decision.
///
/// Invariants:
/// - `id == SHA-256(domain ‖ payload)`.
/// - `height` is monotone along any parent chain.
/// - Genesis candidates have a zero `parent_id` and height 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Content-addressed identifier, computed from `domain` and `payload`.
    pub id: CandidateId,

    /// Link to the previous candidate. Zero for genesis.
    #[serde(default, skip_serializing_if = "CandidateId::is_zero")]
    pub parent_id: CandidateId,

    /// Sequence number / slot.
    pub height: Height,

    /// The consensus domain this candidate belongs to (chain id, "agent-mesh", ...).
    #[serde(with = "serde_hex")]
    pub domain: Vec<u8>,

    /// The content being ordered.
    #[serde(with = "serde_hex")]
    pub payload: Vec<u8>,

    /// Where the full payload bytes live in the DA layer, if externalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub da_ref: Option<String>,

    pub meta: CandidateMeta,
}

/// Optional metadata attached to a candidate. Not part of the content address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMeta {
    #[serde(default, skip_serializing_if = "VoterId::is_zero")]
    pub proposer_id: VoterId,

    pub timestamp_ms: i64,

    #[serde(default, skip_serializing_if = "is_default_net")]
    pub chain_id: NetId,

    #[serde(default, with = "serde_hex", skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<u8>,
}

fn is_default_net(net: &NetId) -> bool {
    net.int() == 0
}

impl Candidate {
    /// Creates a candidate with its content address computed and filled in.
    pub fn new(
        domain: impl Into<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
        parent_id: CandidateId,
        height: Height,
    ) -> Self {
        let domain = domain.into();
        let payload = payload.into();
        let id = CandidateId::of(&domain, &payload);
        Self {
            id,
            parent_id,
            height,
            domain,
            payload,
            da_ref: None,
            meta: CandidateMeta {
                timestamp_ms: now_ms(),
                ..CandidateMeta::default()
            },
        }
    }

    /// Creates a genesis candidate: zero parent, height 0.
    pub fn genesis(domain: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(domain, payload, CandidateId::ZERO, Height::new(0))
    }

    /// Recomputes the content address from the current fields.
    pub fn compute_id(&self) -> CandidateId {
        CandidateId::of(&self.domain, &self.payload)
    }

    /// Whether the stored id matches the content.
    pub fn verify(&self) -> bool {
        self.id == self.compute_id()
    }

    /// Like [`Candidate::verify`], but surfacing the mismatch as an integrity error.
    pub fn check_integrity(&self) -> Result<(), ConsensusError> {
        if self.verify() {
            Ok(())
        } else {
            Err(ConsensusError::Integrity(format!(
                "candidate {} does not match its content address",
                self.id
            )))
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.parent_id.is_zero() && self.height.int() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_candidate_id_is_hash_of_domain_and_payload() {
        let c = Candidate::new(b"d".to_vec(), b"p".to_vec(), CandidateId::ZERO, Height::new(1));
        assert_eq!(c.id, CandidateId::of(b"d", b"p"));
        assert!(c.verify());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut c = Candidate::new(b"d".to_vec(), b"p".to_vec(), CandidateId::ZERO, Height::new(1));
        c.payload = b"q".to_vec();
        assert!(!c.verify());
        assert!(c.check_integrity().is_err());
    }

    #[test]
    fn json_round_trip_preserves_equality() {
        let mut c = Candidate::new(b"dom".to_vec(), b"pay".to_vec(), CandidateId::ZERO, Height::new(3));
        c.da_ref = Some("ipfs://bafy".to_string());
        c.meta.proposer_id = VoterId::from_agent("proposer-1");
        let json = serde_json::to_string(&c).unwrap();
        let back: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
