/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Attestations over candidates, with scheme-tagged signatures.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::errors::ConsensusError;
use crate::types::basic::{now_ms, serde_hex, CandidateId, Round, SignatureScheme, VoterId};

/// Produces the two components of a Quasar dual signature.
///
/// The engine treats both signatures as opaque bytes; deployments plug in their BLS and
/// Ringtail implementations here. `sign_bls` and `sign_ringtail` must be deterministic
/// over the same message for certificate commitments to be reproducible.
pub trait QuantumSigner: Send {
    fn sign_bls(&self, message: &[u8]) -> Result<Vec<u8>, ConsensusError>;

    fn sign_ringtail(&self, message: &[u8]) -> Result<Vec<u8>, ConsensusError>;

    /// Verifies a (BLS, Ringtail) pair over `message`.
    fn verify(&self, message: &[u8], bls: &[u8], ringtail: &[u8]) -> Result<(), ConsensusError>;
}

/// A single voter's attestation on a candidate in one poll round.
///
/// The first signature byte is the scheme tag (see [`SignatureScheme`]). A vote's `round`
/// equals the poll round it was solicited in; out-of-round votes are ignored by the
/// finality layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub candidate_id: CandidateId,
    pub voter_id: VoterId,
    pub round: Round,
    /// true = accept, false = reject.
    pub preference: bool,
    #[serde(default, with = "serde_hex", skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
    pub timestamp_ms: i64,
}

impl Vote {
    /// Creates an unsigned vote.
    pub fn new(candidate_id: CandidateId, voter_id: VoterId, round: Round, preference: bool) -> Self {
        Self {
            candidate_id,
            voter_id,
            round,
            preference,
            signature: Vec::new(),
            timestamp_ms: now_ms(),
        }
    }

    /// The bytes an attached signature commits to.
    pub fn message_bytes(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(32 + 8 + 1);
        msg.extend_from_slice(&self.candidate_id.bytes());
        msg.extend_from_slice(&self.round.to_be_bytes());
        msg.push(self.preference as u8);
        msg
    }

    /// Signs the vote with an Ed25519 key, replacing any existing signature.
    pub fn sign_ed25519(&mut self, key: &SigningKey) {
        let sig = key.sign(&self.message_bytes());
        let mut framed = Vec::with_capacity(1 + 64);
        framed.push(SignatureScheme::Ed25519.tag());
        framed.extend_from_slice(&sig.to_bytes());
        self.signature = framed;
    }

    /// Verifies an Ed25519-scheme signature against the given key.
    pub fn verify_ed25519(&self, key: &VerifyingKey) -> bool {
        if self.scheme() != SignatureScheme::Ed25519 || self.signature.len() != 65 {
            return false;
        }
        let Ok(sig_bytes) = <[u8; 64]>::try_from(&self.signature[1..]) else {
            return false;
        };
        let sig = Signature::from_bytes(&sig_bytes);
        key.verify(&self.message_bytes(), &sig).is_ok()
    }

    /// Attaches an externally produced signature under the given scheme.
    pub fn attach_signature(&mut self, scheme: SignatureScheme, raw: &[u8]) {
        let mut framed = Vec::with_capacity(1 + raw.len());
        framed.push(scheme.tag());
        framed.extend_from_slice(raw);
        self.signature = framed;
    }

    /// Attaches a Quasar dual signature: `[0x04][bls_len: u16 BE][bls_sig][ringtail_sig]`.
    pub fn attach_quasar(&mut self, bls_sig: &[u8], ringtail_sig: &[u8]) {
        let mut framed = Vec::with_capacity(3 + bls_sig.len() + ringtail_sig.len());
        framed.push(SignatureScheme::Quasar.tag());
        framed.extend_from_slice(&(bls_sig.len() as u16).to_be_bytes());
        framed.extend_from_slice(bls_sig);
        framed.extend_from_slice(ringtail_sig);
        self.signature = framed;
    }

    /// Signs the vote with a [`QuantumSigner`], attaching the Quasar dual framing.
    pub fn sign_quasar(&mut self, signer: &dyn QuantumSigner) -> Result<(), ConsensusError> {
        let message = self.message_bytes();
        let bls = signer.sign_bls(&message)?;
        let ringtail = signer.sign_ringtail(&message)?;
        self.attach_quasar(&bls, &ringtail);
        Ok(())
    }

    /// The scheme tag of the attached signature. Unsigned votes report `None`.
    pub fn scheme(&self) -> SignatureScheme {
        match self.signature.first() {
            Some(&tag) => SignatureScheme::from_tag(tag).unwrap_or(SignatureScheme::None),
            None => SignatureScheme::None,
        }
    }

    /// Splits a Quasar-framed signature into its (BLS, Ringtail) components.
    ///
    /// Malformed framing (short buffer, bls_len mismatch, missing Ringtail component) and
    /// non-Quasar schemes are rejected with the Ringtail-requirement error class.
    pub fn quasar_parts(&self) -> Result<(&[u8], &[u8]), ConsensusError> {
        if self.scheme() != SignatureScheme::Quasar {
            return Err(ConsensusError::RtRequirement(format!(
                "vote on {} carries scheme tag {:#04x}, expected Quasar",
                self.candidate_id,
                self.signature.first().copied().unwrap_or(0)
            )));
        }
        if self.signature.len() < 3 {
            return Err(ConsensusError::RtRequirement(
                "quasar signature shorter than its framing header".to_string(),
            ));
        }
        let bls_len = u16::from_be_bytes([self.signature[1], self.signature[2]]) as usize;
        let body = &self.signature[3..];
        if body.len() <= bls_len {
            return Err(ConsensusError::RtRequirement(format!(
                "quasar signature missing ringtail component (bls_len={bls_len}, body={})",
                body.len()
            )));
        }
        Ok((&body[..bls_len], &body[bls_len..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use sha2::Digest;

    fn vote() -> Vote {
        Vote::new(
            CandidateId::of(b"d", b"p"),
            VoterId::from_agent("voter-a"),
            Round::new(2),
            true,
        )
    }

    #[test]
    fn ed25519_sign_and_verify() {
        let key = SigningKey::generate(&mut OsRng);
        let mut v = vote();
        v.sign_ed25519(&key);
        assert_eq!(v.scheme(), SignatureScheme::Ed25519);
        assert!(v.verify_ed25519(&key.verifying_key()));

        v.preference = false;
        assert!(!v.verify_ed25519(&key.verifying_key()));
    }

    /// A stand-in signer: SHA-256 of the message under two domain prefixes.
    struct HashSigner;

    impl QuantumSigner for HashSigner {
        fn sign_bls(&self, message: &[u8]) -> Result<Vec<u8>, ConsensusError> {
            Ok(sha2::Sha256::digest([b"bls".as_slice(), message].concat()).to_vec())
        }

        fn sign_ringtail(&self, message: &[u8]) -> Result<Vec<u8>, ConsensusError> {
            Ok(sha2::Sha256::digest([b"rt".as_slice(), message].concat()).to_vec())
        }

        fn verify(
            &self,
            message: &[u8],
            bls: &[u8],
            ringtail: &[u8],
        ) -> Result<(), ConsensusError> {
            if bls == self.sign_bls(message)? && ringtail == self.sign_ringtail(message)? {
                Ok(())
            } else {
                Err(ConsensusError::Integrity("signature mismatch".to_string()))
            }
        }
    }

    #[test]
    fn quantum_signer_produces_verifiable_quasar_votes() {
        let mut v = vote();
        v.sign_quasar(&HashSigner).unwrap();
        assert_eq!(v.scheme(), SignatureScheme::Quasar);
        let (bls, rt) = v.quasar_parts().unwrap();
        HashSigner.verify(&v.message_bytes(), bls, rt).unwrap();
    }

    #[test]
    fn quasar_framing_round_trips() {
        let mut v = vote();
        v.attach_quasar(&[0xaa; 96], &[0xbb; 100]);
        assert_eq!(v.scheme(), SignatureScheme::Quasar);
        let (bls, rt) = v.quasar_parts().unwrap();
        assert_eq!(bls, &[0xaa; 96]);
        assert_eq!(rt, &[0xbb; 100]);
    }

    #[test]
    fn quasar_parse_rejects_missing_ringtail() {
        let mut v = vote();
        // bls_len claims the entire body, leaving no ringtail component.
        v.signature = vec![0x04, 0x00, 0x04, 1, 2, 3, 4];
        assert!(matches!(
            v.quasar_parts(),
            Err(ConsensusError::RtRequirement(_))
        ));
    }

    #[test]
    fn quasar_parse_rejects_other_schemes() {
        let mut v = vote();
        v.attach_signature(SignatureScheme::Bls, &[0xaa; 96]);
        assert!(matches!(
            v.quasar_parts(),
            Err(ConsensusError::RtRequirement(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let mut v = vote();
        v.attach_quasar(&[1; 8], &[2; 8]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Vote = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
