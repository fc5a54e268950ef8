/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Proofs of finalized agreement, and the two-phase agreement record.

use serde::{Deserialize, Serialize};

use crate::types::basic::{now_ms, serde_hex, CandidateId, Height, PolicyId};

/// The proof that a candidate reached finality under some policy.
///
/// The `proof` layout is policy specific:
/// - Quorum: concatenated accept-vote signatures; `signers` concatenates voter ids.
/// - SampleConvergence: `[confidence: u8 ‖ final_round: u64 BE]`.
/// - Quantum: `[0x04 ‖ SHA-256(bls_sigs ‖ ringtail_sigs)]`, signatures sorted by voter id.
/// - L1Inclusion: the merkle inclusion proof supplied by the external verifier.
/// - None: the literal bytes `"self"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub candidate_id: CandidateId,
    pub height: Height,
    pub policy_id: PolicyId,
    #[serde(with = "serde_hex")]
    pub proof: Vec<u8>,
    #[serde(default, with = "serde_hex", skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<u8>,
    pub timestamp_ms: i64,
}

impl Certificate {
    pub fn new(
        candidate_id: CandidateId,
        height: Height,
        policy_id: PolicyId,
        proof: Vec<u8>,
        signers: Vec<u8>,
    ) -> Self {
        Self {
            candidate_id,
            height,
            policy_id,
            proof,
            signers,
            timestamp_ms: now_ms(),
        }
    }

    /// The number of 32-byte voter ids recorded in `signers`.
    pub fn signer_count(&self) -> usize {
        self.signers.len() / 32
    }
}

/// Per-candidate progression through the soft and hard finality phases.
///
/// Invariant: once `hard_finalized` is true, `soft_finalized` is true and both
/// certificates refer to the same candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementState {
    pub candidate_id: CandidateId,
    pub soft_finalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_cert: Option<Certificate>,
    pub hard_finalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_cert: Option<Certificate>,
}

impl AgreementState {
    pub fn new(candidate_id: CandidateId) -> Self {
        Self {
            candidate_id,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let cert = Certificate::new(
            CandidateId::of(b"d", b"p"),
            Height::new(9),
            PolicyId::Quorum,
            vec![1, 2, 3],
            vec![0; 64],
        );
        let json = serde_json::to_string(&cert).unwrap();
        let back: Certificate = serde_json::from_str(&json).unwrap();
        assert_eq!(cert, back);
        assert_eq!(back.signer_count(), 2);
    }
}
