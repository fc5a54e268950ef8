/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Abstraction over the networking stack.
//!
//! The engine provides an implementation of [`Transport`] on construction and never
//! assumes anything about the medium. Outbound calls are fire-and-forget; responses
//! and failures come back through [`Transport::recv`] as [`TransportEvent`]s keyed by
//! the request id the engine chose.

use std::time::Instant;

use crate::errors::ConsensusError;
use crate::types::basic::{CandidateId, Height, RequestId, VoterId};

/// Who an outbound message goes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// The current validator set.
    Validators(Vec<VoterId>),
    /// An explicit peer list, for example a sampled committee.
    Specific(Vec<VoterId>),
    /// Every connected peer.
    Broadcast,
}

/// A peer's vote response packet: its current preference, its preference at the
/// queried height, and its last accepted candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chits {
    pub peer: VoterId,
    pub request_id: RequestId,
    pub preference: CandidateId,
    pub preference_at_height: CandidateId,
    pub accepted: CandidateId,
}

/// Inbound traffic and failure notifications, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Chits(Chits),
    /// Response to a Get: the serialized candidate.
    Put {
        peer: VoterId,
        request_id: RequestId,
        payload: Vec<u8>,
    },
    /// Response to a GetAncestors: serialized candidates, child first.
    Ancestors {
        peer: VoterId,
        request_id: RequestId,
        payloads: Vec<Vec<u8>>,
    },
    QueryFailed {
        peer: VoterId,
        request_id: RequestId,
    },
    GetFailed {
        peer: VoterId,
        request_id: RequestId,
    },
    GetAncestorsFailed {
        peer: VoterId,
        request_id: RequestId,
    },
}

impl TransportEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            TransportEvent::Chits(chits) => chits.request_id,
            TransportEvent::Put { request_id, .. }
            | TransportEvent::Ancestors { request_id, .. }
            | TransportEvent::QueryFailed { request_id, .. }
            | TransportEvent::GetFailed { request_id, .. }
            | TransportEvent::GetAncestorsFailed { request_id, .. } => *request_id,
        }
    }

    pub fn peer(&self) -> VoterId {
        match self {
            TransportEvent::Chits(chits) => chits.peer,
            TransportEvent::Put { peer, .. }
            | TransportEvent::Ancestors { peer, .. }
            | TransportEvent::QueryFailed { peer, .. }
            | TransportEvent::GetFailed { peer, .. }
            | TransportEvent::GetAncestorsFailed { peer, .. } => *peer,
        }
    }
}

/// Provides the networking functionality that the engine needs.
pub trait Transport: Send {
    /// Asks each recipient for its preference on `candidate_id`.
    fn send_pull_query(
        &mut self,
        recipients: Recipients,
        request_id: RequestId,
        candidate_id: CandidateId,
        requested_height: Height,
    ) -> Result<(), ConsensusError>;

    /// Pushes a candidate's bytes to the recipients and asks for their preference.
    fn send_push_query(
        &mut self,
        recipients: Recipients,
        request_id: RequestId,
        payload: Vec<u8>,
        requested_height: Height,
    ) -> Result<(), ConsensusError>;

    /// Requests one candidate by id.
    fn send_get(
        &mut self,
        peer: VoterId,
        request_id: RequestId,
        candidate_id: CandidateId,
    ) -> Result<(), ConsensusError>;

    /// Requests a candidate and its ancestors, child first.
    fn send_get_ancestors(
        &mut self,
        peer: VoterId,
        request_id: RequestId,
        candidate_id: CandidateId,
    ) -> Result<(), ConsensusError>;

    /// Receives the next inbound event, blocking until `deadline` at the latest.
    fn recv(&mut self, deadline: Instant) -> Option<TransportEvent>;
}
