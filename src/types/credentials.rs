/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! ML-DSA spending credentials for UTXO-style outputs.
//!
//! ML-DSA (FIPS 204) provides the post-quantum credential types used at the wire boundary:
//! - ML-DSA-44: category 2 (128-bit security)
//! - ML-DSA-65: category 3 (192-bit security), the recommended default
//! - ML-DSA-87: category 5 (256-bit security)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::ConsensusError;
use crate::types::basic::serde_hex;

/// Credential type tag for Ed25519 outputs.
pub const CREDENTIAL_ED25519: u8 = 0x01;
/// Credential type tag for BLS12-381 outputs.
pub const CREDENTIAL_BLS: u8 = 0x02;
/// Credential type tag for ML-DSA-44 outputs.
pub const CREDENTIAL_MLDSA_44: u8 = 0x10;
/// Credential type tag for ML-DSA-65 outputs. Recommended default.
pub const CREDENTIAL_MLDSA_65: u8 = 0x11;
/// Credential type tag for ML-DSA-87 outputs.
pub const CREDENTIAL_MLDSA_87: u8 = 0x12;

/// Signature size in bytes for an ML-DSA credential type, or `None` for types without a
/// fixed size requirement.
pub const fn signature_size(cred_type: u8) -> Option<usize> {
    match cred_type {
        CREDENTIAL_MLDSA_44 => Some(2420),
        CREDENTIAL_MLDSA_65 => Some(3293),
        CREDENTIAL_MLDSA_87 => Some(4595),
        _ => None,
    }
}

/// Public key size in bytes for an ML-DSA credential type.
pub const fn public_key_size(cred_type: u8) -> Option<usize> {
    match cred_type {
        CREDENTIAL_MLDSA_44 => Some(1312),
        CREDENTIAL_MLDSA_65 => Some(1952),
        CREDENTIAL_MLDSA_87 => Some(2592),
        _ => None,
    }
}

/// The recommended credential type for new outputs.
pub const fn recommended_mldsa_type() -> u8 {
    CREDENTIAL_MLDSA_65
}

/// A spending credential: a type tag plus the signatures satisfying the output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub cred_type: u8,
    pub signatures: Vec<Signature>,
}

/// One raw signature inside a credential, hex-encoded on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(#[serde(with = "serde_hex")] pub Vec<u8>);

impl Credential {
    pub fn new(cred_type: u8) -> Self {
        Self {
            cred_type,
            signatures: Vec::new(),
        }
    }

    pub fn add_signature(&mut self, sig: Vec<u8>) {
        self.signatures.push(Signature(sig));
    }

    pub fn is_post_quantum(&self) -> bool {
        matches!(
            self.cred_type,
            CREDENTIAL_MLDSA_44 | CREDENTIAL_MLDSA_65 | CREDENTIAL_MLDSA_87
        )
    }

    /// Checks every signature against the fixed size of this credential type.
    pub fn validate_signature_sizes(&self) -> Result<(), ConsensusError> {
        let Some(expected) = signature_size(self.cred_type) else {
            return Ok(());
        };
        for (i, sig) in self.signatures.iter().enumerate() {
            if sig.0.len() != expected {
                return Err(ConsensusError::Integrity(format!(
                    "credential signature {i}: expected {expected} bytes, got {}",
                    sig.0.len()
                )));
            }
        }
        Ok(())
    }

    /// Binary framing: `[type][num_sigs: u16 BE]([sig_len: u16 BE][sig])*`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            3 + self.signatures.iter().map(|s| 2 + s.0.len()).sum::<usize>(),
        );
        buf.push(self.cred_type);
        buf.extend_from_slice(&(self.signatures.len() as u16).to_be_bytes());
        for sig in &self.signatures {
            buf.extend_from_slice(&(sig.0.len() as u16).to_be_bytes());
            buf.extend_from_slice(&sig.0);
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ConsensusError> {
        let too_short =
            || ConsensusError::Integrity("credential frame truncated".to_string());
        if data.len() < 3 {
            return Err(too_short());
        }
        let cred_type = data[0];
        let num_sigs = u16::from_be_bytes([data[1], data[2]]) as usize;
        let mut signatures = Vec::with_capacity(num_sigs);
        let mut offset = 3;
        for _ in 0..num_sigs {
            if offset + 2 > data.len() {
                return Err(too_short());
            }
            let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
            offset += 2;
            if offset + len > data.len() {
                return Err(too_short());
            }
            signatures.push(Signature(data[offset..offset + len].to_vec()));
            offset += len;
        }
        Ok(Self {
            cred_type,
            signatures,
        })
    }
}

/// Who can spend an output. For ML-DSA types, addresses are SHA-256 hashes of ML-DSA
/// public keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOwners {
    pub locktime: u64,
    pub threshold: u32,
    pub address_type: u8,
    pub addresses: Vec<Address>,
}

/// A 32-byte public key hash, hex-encoded on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(#[serde(with = "serde_hex")] pub Vec<u8>);

impl OutputOwners {
    /// Creates ML-DSA output owners from raw public keys.
    pub fn mldsa(threshold: u32, public_keys: &[Vec<u8>], mldsa_type: u8) -> Self {
        let addresses = public_keys
            .iter()
            .map(|pk| Address(Sha256::digest(pk).to_vec()))
            .collect();
        Self {
            locktime: 0,
            threshold,
            address_type: mldsa_type,
            addresses,
        }
    }

    pub fn is_post_quantum(&self) -> bool {
        matches!(
            self.address_type,
            CREDENTIAL_MLDSA_44 | CREDENTIAL_MLDSA_65 | CREDENTIAL_MLDSA_87
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_round_trips() {
        let mut cred = Credential::new(CREDENTIAL_MLDSA_65);
        cred.add_signature(vec![0xab; 3293]);
        cred.add_signature(vec![0xcd; 3293]);
        let bytes = cred.to_bytes();
        let back = Credential::from_bytes(&bytes).unwrap();
        assert_eq!(cred, back);
    }

    #[test]
    fn size_validation_catches_short_signatures() {
        let mut cred = Credential::new(CREDENTIAL_MLDSA_44);
        cred.add_signature(vec![0; 2420]);
        assert!(cred.validate_signature_sizes().is_ok());

        cred.add_signature(vec![0; 100]);
        assert!(matches!(
            cred.validate_signature_sizes(),
            Err(ConsensusError::Integrity(_))
        ));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let mut cred = Credential::new(CREDENTIAL_MLDSA_87);
        cred.add_signature(vec![1; 16]);
        let mut bytes = cred.to_bytes();
        bytes.truncate(bytes.len() - 4);
        assert!(Credential::from_bytes(&bytes).is_err());
    }

    #[test]
    fn recommended_default_is_mldsa_65() {
        assert_eq!(recommended_mldsa_type(), CREDENTIAL_MLDSA_65);
        assert_eq!(signature_size(CREDENTIAL_MLDSA_65), Some(3293));
        assert_eq!(public_key_size(CREDENTIAL_MLDSA_65), Some(1952));
    }
}
