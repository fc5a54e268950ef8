/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use lux_consensus::errors::ConsensusError;
use lux_consensus::types::basic::CandidateId;
use lux_consensus::types::candidate::Candidate;
use lux_consensus::vm::Vm;

/// An in-memory state machine that records every decision the engine delivers.
pub(crate) struct MemoryVm {
    blocks: HashMap<CandidateId, Candidate>,
    state: Arc<Mutex<VmState>>,
}

#[derive(Default)]
struct VmState {
    accepted: Vec<CandidateId>,
    rejected: Vec<CandidateId>,
    preference: CandidateId,
}

/// The test side of a [`MemoryVm`]: polls what the engine has delivered so far.
#[derive(Clone)]
pub(crate) struct VmProbe {
    state: Arc<Mutex<VmState>>,
}

impl VmProbe {
    pub(crate) fn accepted(&self) -> Vec<CandidateId> {
        self.state.lock().unwrap().accepted.clone()
    }

    pub(crate) fn rejected(&self) -> Vec<CandidateId> {
        self.state.lock().unwrap().rejected.clone()
    }

    pub(crate) fn preference(&self) -> CandidateId {
        self.state.lock().unwrap().preference
    }
}

pub(crate) fn memory_vm(genesis: &Candidate) -> (MemoryVm, VmProbe) {
    let state = Arc::new(Mutex::new(VmState {
        accepted: vec![genesis.id],
        rejected: Vec::new(),
        preference: genesis.id,
    }));
    let mut blocks = HashMap::new();
    blocks.insert(genesis.id, genesis.clone());
    (
        MemoryVm {
            blocks,
            state: state.clone(),
        },
        VmProbe { state },
    )
}

impl Vm for MemoryVm {
    fn parse_block(&mut self, bytes: &[u8]) -> Result<Candidate, ConsensusError> {
        serde_json::from_slice(bytes)
            .map_err(|err| ConsensusError::Integrity(format!("unparseable candidate: {err}")))
    }

    fn get_block(&mut self, id: &CandidateId) -> Result<Candidate, ConsensusError> {
        self.blocks
            .get(id)
            .cloned()
            .ok_or(ConsensusError::NotFound(*id))
    }

    fn last_accepted(&mut self) -> Result<CandidateId, ConsensusError> {
        let state = self.state.lock().unwrap();
        Ok(*state.accepted.last().expect("genesis is always accepted"))
    }

    fn set_preference(&mut self, id: &CandidateId) -> Result<(), ConsensusError> {
        self.state.lock().unwrap().preference = *id;
        Ok(())
    }

    fn verify(&mut self, candidate: &Candidate) -> Result<(), ConsensusError> {
        candidate.check_integrity()?;
        self.blocks.insert(candidate.id, candidate.clone());
        Ok(())
    }

    fn accept(&mut self, candidate: &Candidate) -> Result<(), ConsensusError> {
        let mut state = self.state.lock().unwrap();
        if !state.accepted.contains(&candidate.id) {
            state.accepted.push(candidate.id);
        }
        Ok(())
    }

    fn reject(&mut self, candidate: &Candidate) -> Result<(), ConsensusError> {
        let mut state = self.state.lock().unwrap();
        if !state.rejected.contains(&candidate.id) {
            state.rejected.push(candidate.id);
        }
        Ok(())
    }
}
