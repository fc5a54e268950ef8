/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" newtypes shared across the consensus subsystems.
//!
//! These types follow the newtype pattern: they are sent around and inspected, but have no
//! active behavior of their own. On the wire every 32-byte identifier is hex-encoded inside
//! the JSON envelope, which the serde implementations in this module take care of.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A 32-byte content-addressed candidate identifier.
///
/// `CandidateId = SHA-256(domain ‖ payload)`, so the "same decision" hashes to a
/// bit-identical id at every node regardless of who proposed it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CandidateId([u8; 32]);

impl CandidateId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The zero id. Used as the parent of genesis candidates.
    pub const ZERO: CandidateId = CandidateId([0u8; 32]);

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Computes the content address of a (domain, payload) pair.
    pub fn of(domain: &[u8], payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(payload);
        Self(hasher.finalize().into())
    }
}

impl Debug for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CandidateId({})", hex::encode(self.0))
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for CandidateId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for CandidateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserialize_hex_array::<D>(deserializer)?;
        Ok(Self(bytes))
    }
}

/// A 32-byte voter identifier.
///
/// Derived from a public key for validators, or from the hash of a string id for named
/// agents. Equality is content equality.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VoterId([u8; 32]);

impl VoterId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const ZERO: VoterId = VoterId([0u8; 32]);

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Derives a voter id from a named agent's string identifier.
    pub fn from_agent(id: &str) -> Self {
        Self(Sha256::digest(id.as_bytes()).into())
    }

    /// Derives a voter id from raw public key bytes.
    pub fn from_public_key(pk: &[u8]) -> Self {
        Self(Sha256::digest(pk).into())
    }
}

impl Debug for VoterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "VoterId({})", hex::encode(self.0))
    }
}

impl Display for VoterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for VoterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for VoterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = deserialize_hex_array::<D>(deserializer)?;
        Ok(Self(bytes))
    }
}

fn deserialize_hex_array<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<[u8; 32], D::Error> {
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(de::Error::custom)?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| de::Error::custom(format!("expected 32 bytes, got {}", b.len())))
}

/// Height of a candidate in its chain. Genesis candidates have height 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Height(u64);

impl Height {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for Height {
    type Output = Height;
    fn add(self, rhs: u64) -> Height {
        Height(self.0 + rhs)
    }
}

impl AddAssign<u64> for Height {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub<Height> for Height {
    type Output = u64;
    fn sub(self, rhs: Height) -> u64 {
        self.0 - rhs.0
    }
}

/// A voting round within one item's lifetime.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Round(u64);

impl Round {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for Round {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

/// Identifies one outbound request on the wire. Unique within a node's lifetime.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(u32);

impl RequestId {
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies the network a chain belongs to (formerly the subnet id).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NetId(u64);

impl NetId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// The signature scheme tag carried in the first byte of every signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    None,
    Ed25519,
    Bls,
    Ringtail,
    /// Dual BLS ‖ Ringtail, framed as `[tag][bls_len: u16 BE][bls_sig][ringtail_sig]`.
    Quasar,
}

impl SignatureScheme {
    pub const fn tag(&self) -> u8 {
        match self {
            SignatureScheme::None => 0x00,
            SignatureScheme::Ed25519 => 0x01,
            SignatureScheme::Bls => 0x02,
            SignatureScheme::Ringtail => 0x03,
            SignatureScheme::Quasar => 0x04,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<SignatureScheme> {
        match tag {
            0x00 => Some(SignatureScheme::None),
            0x01 => Some(SignatureScheme::Ed25519),
            0x02 => Some(SignatureScheme::Bls),
            0x03 => Some(SignatureScheme::Ringtail),
            0x04 => Some(SignatureScheme::Quasar),
            _ => None,
        }
    }
}

/// Tag identifying which finality policy produced a certificate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyId {
    None,
    Quorum,
    SampleConvergence,
    L1Inclusion,
    Quantum,
}

impl PolicyId {
    pub const fn int(&self) -> u16 {
        match self {
            PolicyId::None => 0,
            PolicyId::Quorum => 1,
            PolicyId::SampleConvergence => 2,
            PolicyId::L1Inclusion => 3,
            PolicyId::Quantum => 4,
        }
    }

    pub const fn from_int(int: u16) -> Option<PolicyId> {
        match int {
            0 => Some(PolicyId::None),
            1 => Some(PolicyId::Quorum),
            2 => Some(PolicyId::SampleConvergence),
            3 => Some(PolicyId::L1Inclusion),
            4 => Some(PolicyId::Quantum),
            _ => None,
        }
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyId::None => "None",
            PolicyId::Quorum => "Quorum",
            PolicyId::SampleConvergence => "SampleConvergence",
            PolicyId::L1Inclusion => "L1Inclusion",
            PolicyId::Quantum => "Quantum",
        };
        f.write_str(name)
    }
}

impl Serialize for PolicyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.int())
    }
}

impl<'de> Deserialize<'de> for PolicyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let int = u16::deserialize(deserializer)?;
        PolicyId::from_int(int)
            .ok_or_else(|| de::Error::custom(format!("unknown policy id {int}")))
    }
}

/// Lifecycle status of a candidate. Transitions are monotonic and
/// `Accepted`/`Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unknown,
    Processing,
    Accepted,
    Rejected,
}

impl Status {
    pub const fn is_decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }
}

/// Milliseconds since the Unix epoch. The single wall-clock representation used by the
/// wire model.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// serde adapter for `Vec<u8>` fields that travel hex-encoded in JSON.
pub(crate) mod serde_hex {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(de::Error::custom)
    }
}

/// serde adapter for `Duration` fields represented as integer milliseconds.
pub(crate) mod serde_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
