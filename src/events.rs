/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of consensus events for event handling and logging.
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::basic::{CandidateId, Height, Round, VoterId};
use crate::types::candidate::Candidate;
use crate::types::certificate::Certificate;

pub enum Event {
    // Candidate lifecycle.
    ObserveCandidate(ObserveCandidateEvent),
    AcceptCandidate(AcceptCandidateEvent),
    RejectCandidate(RejectCandidateEvent),
    // Sampling loop.
    StartPoll(StartPollEvent),
    CompletePoll(CompletePollEvent),
    FlipPreference(FlipPreferenceEvent),
    Decide(DecideEvent),
    SampleShortfall(SampleShortfallEvent),
    // Finality.
    SoftFinalize(SoftFinalizeEvent),
    HardFinalize(HardFinalizeEvent),
    RejectVote(RejectVoteEvent),
    // Bootstrap.
    StartBootstrap(StartBootstrapEvent),
    EndBootstrap(EndBootstrapEvent),
    DeferFetch(DeferFetchEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // A closed bus only means the subscriber is gone; events are best-effort.
            let _ = event_publisher.send(event);
        }
    }
}

pub struct ObserveCandidateEvent {
    pub timestamp: SystemTime,
    pub candidate: Candidate,
}

pub struct AcceptCandidateEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
    pub height: Height,
}

pub struct RejectCandidateEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
}

pub struct StartPollEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
    pub round: Round,
    pub committee_size: usize,
}

pub struct CompletePollEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
    pub round: Round,
    pub yes: u32,
    pub no: u32,
}

pub struct FlipPreferenceEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
    pub preference: bool,
}

pub struct DecideEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
    pub preference: bool,
    pub rounds: u64,
}

pub struct SampleShortfallEvent {
    pub timestamp: SystemTime,
    pub requested: usize,
    pub eligible: usize,
}

pub struct SoftFinalizeEvent {
    pub timestamp: SystemTime,
    pub certificate: Certificate,
}

pub struct HardFinalizeEvent {
    pub timestamp: SystemTime,
    pub certificate: Certificate,
}

pub struct RejectVoteEvent {
    pub timestamp: SystemTime,
    pub voter: VoterId,
    pub candidate_id: CandidateId,
    pub reason: String,
}

pub struct StartBootstrapEvent {
    pub timestamp: SystemTime,
    pub target: Height,
}

pub struct EndBootstrapEvent {
    pub timestamp: SystemTime,
    pub fetched: u64,
}

pub struct DeferFetchEvent {
    pub timestamp: SystemTime,
    pub candidate_id: CandidateId,
}
