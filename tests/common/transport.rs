/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    thread,
    time::Instant,
};

use lux_consensus::errors::ConsensusError;
use lux_consensus::transport::{Chits, Recipients, Transport, TransportEvent};
use lux_consensus::types::basic::{CandidateId, Height, RequestId, VoterId};
use lux_consensus::types::candidate::Candidate;

/// A transport stub standing in for a whole cluster of peers.
///
/// Every recipient of a push or pull query answers immediately with chits for the cluster's
/// current preference, which the test controls through [`ClusterHandle`]. GetAncestors
/// requests are served from a candidate store, child first.
pub(crate) struct ClusterTransport {
    preferred: Arc<Mutex<CandidateId>>,
    accepted: Arc<Mutex<CandidateId>>,
    store: Arc<Mutex<HashMap<CandidateId, Candidate>>>,
    queue: VecDeque<TransportEvent>,
}

/// The test side of a [`ClusterTransport`]: sets what the simulated peers vote for.
#[derive(Clone)]
pub(crate) struct ClusterHandle {
    preferred: Arc<Mutex<CandidateId>>,
    store: Arc<Mutex<HashMap<CandidateId, Candidate>>>,
}

impl ClusterHandle {
    pub(crate) fn prefer(&self, id: CandidateId) {
        *self.preferred.lock().unwrap() = id;
    }

    /// Makes a candidate servable to Get/GetAncestors requests.
    pub(crate) fn host(&self, candidate: Candidate) {
        self.store
            .lock()
            .unwrap()
            .insert(candidate.id, candidate);
    }
}

pub(crate) fn cluster_transport(genesis: CandidateId) -> (ClusterTransport, ClusterHandle) {
    let preferred = Arc::new(Mutex::new(genesis));
    let store = Arc::new(Mutex::new(HashMap::new()));
    let transport = ClusterTransport {
        preferred: preferred.clone(),
        accepted: Arc::new(Mutex::new(genesis)),
        store: store.clone(),
        queue: VecDeque::new(),
    };
    (transport, ClusterHandle { preferred, store })
}

impl ClusterTransport {
    fn answer_with_chits(&mut self, recipients: Recipients, request_id: RequestId) {
        let peers = match recipients {
            Recipients::Validators(peers) | Recipients::Specific(peers) => peers,
            Recipients::Broadcast => Vec::new(),
        };
        let preference = *self.preferred.lock().unwrap();
        let accepted = *self.accepted.lock().unwrap();
        for peer in peers {
            self.queue.push_back(TransportEvent::Chits(Chits {
                peer,
                request_id,
                preference,
                preference_at_height: preference,
                accepted,
            }));
        }
    }
}

impl Transport for ClusterTransport {
    fn send_pull_query(
        &mut self,
        recipients: Recipients,
        request_id: RequestId,
        _candidate_id: CandidateId,
        _requested_height: Height,
    ) -> Result<(), ConsensusError> {
        self.answer_with_chits(recipients, request_id);
        Ok(())
    }

    fn send_push_query(
        &mut self,
        recipients: Recipients,
        request_id: RequestId,
        payload: Vec<u8>,
        _requested_height: Height,
    ) -> Result<(), ConsensusError> {
        // Pushed bodies become servable, as a real peer would retain them.
        if let Ok(candidate) = serde_json::from_slice::<Candidate>(&payload) {
            self.store.lock().unwrap().insert(candidate.id, candidate);
        }
        self.answer_with_chits(recipients, request_id);
        Ok(())
    }

    fn send_get(
        &mut self,
        peer: VoterId,
        request_id: RequestId,
        candidate_id: CandidateId,
    ) -> Result<(), ConsensusError> {
        let event = match self.store.lock().unwrap().get(&candidate_id) {
            Some(candidate) => TransportEvent::Put {
                peer,
                request_id,
                payload: serde_json::to_vec(candidate).unwrap(),
            },
            None => TransportEvent::GetFailed { peer, request_id },
        };
        self.queue.push_back(event);
        Ok(())
    }

    fn send_get_ancestors(
        &mut self,
        peer: VoterId,
        request_id: RequestId,
        candidate_id: CandidateId,
    ) -> Result<(), ConsensusError> {
        let store = self.store.lock().unwrap();
        let mut payloads = Vec::new();
        let mut cursor = candidate_id;
        while let Some(candidate) = store.get(&cursor) {
            payloads.push(serde_json::to_vec(candidate).unwrap());
            cursor = candidate.parent_id;
        }
        drop(store);
        let event = if payloads.is_empty() {
            TransportEvent::GetAncestorsFailed { peer, request_id }
        } else {
            TransportEvent::Ancestors {
                peer,
                request_id,
                payloads,
            }
        };
        self.queue.push_back(event);
        Ok(())
    }

    fn recv(&mut self, deadline: Instant) -> Option<TransportEvent> {
        match self.queue.pop_front() {
            Some(event) => Some(event),
            None => {
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
                None
            }
        }
    }
}
