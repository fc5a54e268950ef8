/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The engine thread: one loop that drives sampling, vote aggregation, finality and VM
//! notification for every in-flight candidate.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::chain::Chain;
use crate::config::Configuration;
use crate::errors::ConsensusError;
use crate::events::*;
use crate::finality::agreement::TwoPhaseAgreement;
use crate::sampler::{Outcome, Prism};
use crate::transport::{Chits, Recipients, Transport, TransportEvent};
use crate::types::basic::{CandidateId, RequestId, Round};
use crate::types::candidate::Candidate;
use crate::types::vote::Vote;
use crate::vm::Vm;
use crate::wave::{PollApplication, PollEffect, WaveEngine};

/// Spawns the engine thread.
///
/// The loop owns every mutable consensus structure; other threads talk to it through
/// `candidates` (locally produced candidates) and the transport, and observe it through
/// the event publisher. Shutdown is cooperative via `shutdown_signal`.
pub(crate) fn start_engine<T: Transport + 'static, V: Vm + 'static>(
    config: Configuration,
    chain: Chain,
    wave: WaveEngine,
    agreement: TwoPhaseAgreement,
    sampler: Prism,
    transport: T,
    vm: V,
    candidates: Receiver<Candidate>,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
) -> JoinHandle<()> {
    let mut engine = Engine {
        config,
        chain,
        wave,
        agreement,
        sampler,
        transport,
        vm,
        poll_index: HashMap::new(),
        deferred_accepts: Vec::new(),
        pending_hard_accepts: Vec::new(),
        finality_deadlines: HashMap::new(),
        event_publisher,
    };
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("engine thread disconnected from main thread")
            }
        }

        while let Ok(candidate) = candidates.try_recv() {
            if let Err(err) = engine.on_candidate(candidate) {
                log::warn!("Engine, candidate refused: {err}");
            }
        }
        engine.tick();
    })
}

struct Engine<T: Transport, V: Vm> {
    config: Configuration,
    chain: Chain,
    wave: WaveEngine,
    agreement: TwoPhaseAgreement,
    sampler: Prism,
    transport: T,
    vm: V,
    /// Outstanding polls: request id to the (item, round) on the wire.
    poll_index: HashMap<RequestId, (CandidateId, Round)>,
    /// Decided-accept candidates whose parents have not been accepted yet.
    deferred_accepts: Vec<CandidateId>,
    /// Hard-finalized candidates waiting for their parent's VM accept.
    pending_hard_accepts: Vec<CandidateId>,
    /// Deadlines for decided-accept candidates to reach hard finality.
    finality_deadlines: HashMap<CandidateId, Instant>,
    event_publisher: Option<Sender<Event>>,
}

impl<T: Transport, V: Vm> Engine<T, V> {
    /// Admits one candidate into voting.
    fn on_candidate(&mut self, candidate: Candidate) -> Result<(), ConsensusError> {
        candidate.check_integrity()?;
        if self.chain.contains(&candidate.id) {
            return Ok(());
        }
        self.vm.verify(&candidate)?;
        self.chain.add(candidate.clone())?;
        self.wave.observe(candidate.id);
        self.agreement.on_candidate(&candidate);
        Event::publish(
            &self.event_publisher,
            Event::ObserveCandidate(ObserveCandidateEvent {
                timestamp: SystemTime::now(),
                candidate,
            }),
        );
        Ok(())
    }

    /// One pass: open due polls, drain the transport, expire overdue polls, flush
    /// deferred VM notifications.
    fn tick(&mut self) {
        self.open_polls();
        self.drain_transport();
        for application in self.wave.sweep_expired(Instant::now()) {
            self.poll_index.remove(&application.request_id);
            self.apply_poll(application);
        }
        self.retry_deferred_accepts();
        self.flush_pending_accepts();
        self.check_finality_deadlines();
    }

    /// Warns once for every decided candidate that has outlived its finality deadline
    /// without a hard certificate.
    fn check_finality_deadlines(&mut self) {
        let now = Instant::now();
        let overdue: Vec<CandidateId> = self
            .finality_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for item in overdue {
            self.finality_deadlines.remove(&item);
            log::warn!(
                "Engine, candidate {item} still awaiting hard finality after {:?}",
                self.config.finality_timeout
            );
        }
    }

    fn open_polls(&mut self) {
        let mut items = self.wave.undecided_items();
        items.sort();
        for item in items {
            if !self.wave.can_poll(&item) {
                continue;
            }
            let sample = self
                .sampler
                .sample(self.config.parameters.k as usize, &item.bytes());
            if sample.shortfall {
                Event::publish(
                    &self.event_publisher,
                    Event::SampleShortfall(SampleShortfallEvent {
                        timestamp: SystemTime::now(),
                        requested: self.config.parameters.k as usize,
                        eligible: sample.committee.len(),
                    }),
                );
            }
            if sample.committee.is_empty() {
                continue;
            }
            let deadline = Instant::now() + self.config.round_timeout;
            let Some((request_id, round)) =
                self.wave.begin_poll(item, &sample.committee, deadline)
            else {
                continue;
            };
            let height = self.chain.height_of(&item).unwrap_or_default();
            // The first round pushes the body so sampled peers that have not seen the
            // candidate can still answer; later rounds query by id.
            let payload = if round == Round::new(0) {
                self.chain.get(&item).and_then(|c| serde_json::to_vec(c).ok())
            } else {
                None
            };
            let sent = match payload {
                Some(payload) => self.transport.send_push_query(
                    Recipients::Specific(sample.committee.clone()),
                    request_id,
                    payload,
                    height,
                ),
                None => self.transport.send_pull_query(
                    Recipients::Specific(sample.committee.clone()),
                    request_id,
                    item,
                    height,
                ),
            };
            if let Err(err) = sent {
                log::warn!("Engine, query failed to send: {err}");
            }
            self.poll_index.insert(request_id, (item, round));
            Event::publish(
                &self.event_publisher,
                Event::StartPoll(StartPollEvent {
                    timestamp: SystemTime::now(),
                    candidate_id: item,
                    round,
                    committee_size: sample.committee.len(),
                }),
            );
        }
    }

    fn drain_transport(&mut self) {
        let deadline = Instant::now() + Duration::from_millis(10);
        while let Some(event) = self.transport.recv(deadline) {
            match event {
                TransportEvent::Chits(chits) => self.on_chits(chits),
                TransportEvent::QueryFailed { peer, request_id } => {
                    self.sampler.report(peer, Outcome::Timeout);
                    if let Some(application) = self.wave.record_failure(request_id, peer) {
                        self.poll_index.remove(&request_id);
                        self.apply_poll(application);
                    }
                }
                // Gets and ancestor fetches belong to the bootstrap worker; stale
                // responses that land here are dropped.
                TransportEvent::Put { .. }
                | TransportEvent::Ancestors { .. }
                | TransportEvent::GetFailed { .. }
                | TransportEvent::GetAncestorsFailed { .. } => (),
            }
        }
    }

    fn on_chits(&mut self, chits: Chits) {
        let Some(&(item, round)) = self.poll_index.get(&chits.request_id) else {
            return;
        };
        let preference =
            chits.preference_at_height == item || chits.preference == item;
        self.sampler.report(chits.peer, Outcome::Good);

        // A chit doubles as an unsigned vote for the finality layer.
        let vote = Vote::new(item, chits.peer, round, preference);
        if let Err(err) = self.agreement.on_vote(&vote) {
            self.sampler.report(chits.peer, Outcome::BadSig);
            Event::publish(
                &self.event_publisher,
                Event::RejectVote(RejectVoteEvent {
                    timestamp: SystemTime::now(),
                    voter: chits.peer,
                    candidate_id: item,
                    reason: err.to_string(),
                }),
            );
        }

        if let Some(application) =
            self.wave
                .record_chit(chits.request_id, chits.peer, round, preference)
        {
            self.poll_index.remove(&chits.request_id);
            self.apply_poll(application);
        }
        self.advance_finality(item);
    }

    fn apply_poll(&mut self, application: PollApplication) {
        let item = application.item;
        Event::publish(
            &self.event_publisher,
            Event::CompletePoll(CompletePollEvent {
                timestamp: SystemTime::now(),
                candidate_id: item,
                round: application.round,
                yes: application.yes,
                no: application.no,
            }),
        );
        // Expired polls carry zeroed counts; convergence policies reset on them just
        // like the wave state does.
        self.agreement
            .on_poll_round(&item, application.round, application.yes, application.no);

        match application.effect {
            PollEffect::Flipped => {
                let preference = self.wave.preference(&item).unwrap_or(true);
                Event::publish(
                    &self.event_publisher,
                    Event::FlipPreference(FlipPreferenceEvent {
                        timestamp: SystemTime::now(),
                        candidate_id: item,
                        preference,
                    }),
                );
            }
            PollEffect::Decided(preference) => {
                Event::publish(
                    &self.event_publisher,
                    Event::Decide(DecideEvent {
                        timestamp: SystemTime::now(),
                        candidate_id: item,
                        preference,
                        rounds: self.wave.rounds(&item),
                    }),
                );
                if preference {
                    self.finality_deadlines
                        .insert(item, Instant::now() + self.config.finality_timeout);
                    self.accept_in_chain(item);
                } else {
                    self.reject_in_chain(item);
                }
            }
            PollEffect::Inconclusive | PollEffect::Reinforced | PollEffect::Frozen => (),
        }
        self.advance_finality(item);
    }

    fn accept_in_chain(&mut self, item: CandidateId) {
        match self.chain.accept(&item) {
            Ok(outcome) => {
                let height = self.chain.height_of(&item).unwrap_or_default();
                Event::publish(
                    &self.event_publisher,
                    Event::AcceptCandidate(AcceptCandidateEvent {
                        timestamp: SystemTime::now(),
                        candidate_id: item,
                        height,
                    }),
                );
                for rejected in outcome.rejected {
                    self.notify_reject(rejected);
                }
                let preference = self.chain.preference();
                if let Err(err) = self.vm.set_preference(&preference) {
                    log::warn!("Engine, set_preference failed: {err}");
                }
            }
            Err(_) if self.parent_still_processing(&item) => {
                // The child decided before its parent; retry once the parent lands.
                if !self.deferred_accepts.contains(&item) {
                    self.deferred_accepts.push(item);
                }
            }
            Err(err) => log::warn!("Engine, accept failed: {err}"),
        }
    }

    fn parent_still_processing(&self, item: &CandidateId) -> bool {
        self.chain
            .get(item)
            .map(|c| !self.chain.status(&c.parent_id).is_decided())
            .unwrap_or(false)
    }

    /// Retries accepts that were blocked on an undecided parent, parents first.
    fn retry_deferred_accepts(&mut self) {
        let mut ready: Vec<CandidateId> = self
            .deferred_accepts
            .iter()
            .copied()
            .filter(|id| !self.parent_still_processing(id))
            .collect();
        if ready.is_empty() {
            return;
        }
        ready.sort_by_key(|id| self.chain.height_of(id).unwrap_or_default());
        self.deferred_accepts.retain(|id| !ready.contains(id));
        for item in ready {
            self.accept_in_chain(item);
        }
    }

    fn reject_in_chain(&mut self, item: CandidateId) {
        match self.chain.reject(&item) {
            Ok(rejected) => {
                for id in rejected {
                    self.notify_reject(id);
                }
            }
            Err(err) => log::warn!("Engine, reject failed: {err}"),
        }
    }

    fn notify_reject(&mut self, id: CandidateId) {
        Event::publish(
            &self.event_publisher,
            Event::RejectCandidate(RejectCandidateEvent {
                timestamp: SystemTime::now(),
                candidate_id: id,
            }),
        );
        if let Some(candidate) = self.chain.get(&id).cloned() {
            if let Err(err) = self.vm.reject(&candidate) {
                log::warn!("Engine, vm reject failed: {err}");
            }
        }
    }

    /// Advances the two-phase agreement for `item`. The VM learns of an accept only
    /// once the hard certificate exists, in height order along each branch.
    fn advance_finality(&mut self, item: CandidateId) {
        let advancement = self.agreement.try_advance(&item);
        if let Some(cert) = advancement.soft {
            Event::publish(
                &self.event_publisher,
                Event::SoftFinalize(SoftFinalizeEvent {
                    timestamp: SystemTime::now(),
                    certificate: cert,
                }),
            );
        }
        if let Some(cert) = advancement.hard {
            self.finality_deadlines.remove(&item);
            Event::publish(
                &self.event_publisher,
                Event::HardFinalize(HardFinalizeEvent {
                    timestamp: SystemTime::now(),
                    certificate: cert,
                }),
            );
            self.pending_hard_accepts.push(item);
            self.flush_pending_accepts();
        }
    }

    /// Delivers VM accepts whose parents have already been delivered. Children whose
    /// parents are still waiting stay queued for a later pass.
    fn flush_pending_accepts(&mut self) {
        self.pending_hard_accepts.sort_by_key(|id| {
            self.chain
                .height_of(id)
                .unwrap_or_default()
        });
        let mut remaining = Vec::new();
        for id in std::mem::take(&mut self.pending_hard_accepts) {
            if !self.chain.is_accepted(&id) {
                // The wave decision has not caught up with the certificate yet.
                if self.chain.accept(&id).is_err() {
                    remaining.push(id);
                    continue;
                }
            }
            match self.chain.get(&id).cloned() {
                Some(candidate) => {
                    if let Err(err) = self.vm.accept(&candidate) {
                        log::warn!("Engine, vm accept failed: {err}");
                        remaining.push(id);
                    }
                }
                None => (),
            }
        }
        self.pending_hard_accepts = remaining;
    }
}
