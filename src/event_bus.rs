/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that distributes published events to registered handlers.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) observe_candidate_handlers: Vec<HandlerPtr<ObserveCandidateEvent>>,
    pub(crate) accept_candidate_handlers: Vec<HandlerPtr<AcceptCandidateEvent>>,
    pub(crate) reject_candidate_handlers: Vec<HandlerPtr<RejectCandidateEvent>>,
    pub(crate) start_poll_handlers: Vec<HandlerPtr<StartPollEvent>>,
    pub(crate) complete_poll_handlers: Vec<HandlerPtr<CompletePollEvent>>,
    pub(crate) flip_preference_handlers: Vec<HandlerPtr<FlipPreferenceEvent>>,
    pub(crate) decide_handlers: Vec<HandlerPtr<DecideEvent>>,
    pub(crate) sample_shortfall_handlers: Vec<HandlerPtr<SampleShortfallEvent>>,
    pub(crate) soft_finalize_handlers: Vec<HandlerPtr<SoftFinalizeEvent>>,
    pub(crate) hard_finalize_handlers: Vec<HandlerPtr<HardFinalizeEvent>>,
    pub(crate) reject_vote_handlers: Vec<HandlerPtr<RejectVoteEvent>>,
    pub(crate) start_bootstrap_handlers: Vec<HandlerPtr<StartBootstrapEvent>>,
    pub(crate) end_bootstrap_handlers: Vec<HandlerPtr<EndBootstrapEvent>>,
    pub(crate) defer_fetch_handlers: Vec<HandlerPtr<DeferFetchEvent>>,
}

impl EventHandlers {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        log_events: bool,
        on_observe_candidate: Option<HandlerPtr<ObserveCandidateEvent>>,
        on_accept_candidate: Option<HandlerPtr<AcceptCandidateEvent>>,
        on_reject_candidate: Option<HandlerPtr<RejectCandidateEvent>>,
        on_start_poll: Option<HandlerPtr<StartPollEvent>>,
        on_complete_poll: Option<HandlerPtr<CompletePollEvent>>,
        on_flip_preference: Option<HandlerPtr<FlipPreferenceEvent>>,
        on_decide: Option<HandlerPtr<DecideEvent>>,
        on_sample_shortfall: Option<HandlerPtr<SampleShortfallEvent>>,
        on_soft_finalize: Option<HandlerPtr<SoftFinalizeEvent>>,
        on_hard_finalize: Option<HandlerPtr<HardFinalizeEvent>>,
        on_reject_vote: Option<HandlerPtr<RejectVoteEvent>>,
        on_start_bootstrap: Option<HandlerPtr<StartBootstrapEvent>>,
        on_end_bootstrap: Option<HandlerPtr<EndBootstrapEvent>>,
        on_defer_fetch: Option<HandlerPtr<DeferFetchEvent>>,
    ) -> Self {
        let mut handlers = Self {
            observe_candidate_handlers: on_observe_candidate.into_iter().collect(),
            accept_candidate_handlers: on_accept_candidate.into_iter().collect(),
            reject_candidate_handlers: on_reject_candidate.into_iter().collect(),
            start_poll_handlers: on_start_poll.into_iter().collect(),
            complete_poll_handlers: on_complete_poll.into_iter().collect(),
            flip_preference_handlers: on_flip_preference.into_iter().collect(),
            decide_handlers: on_decide.into_iter().collect(),
            sample_shortfall_handlers: on_sample_shortfall.into_iter().collect(),
            soft_finalize_handlers: on_soft_finalize.into_iter().collect(),
            hard_finalize_handlers: on_hard_finalize.into_iter().collect(),
            reject_vote_handlers: on_reject_vote.into_iter().collect(),
            start_bootstrap_handlers: on_start_bootstrap.into_iter().collect(),
            end_bootstrap_handlers: on_end_bootstrap.into_iter().collect(),
            defer_fetch_handlers: on_defer_fetch.into_iter().collect(),
        };
        if log_events {
            handlers.add_logging_handlers();
        }
        handlers
    }

    pub(crate) fn add_logging_handlers(&mut self) {
        self.observe_candidate_handlers.push(ObserveCandidateEvent::get_logger());
        self.accept_candidate_handlers.push(AcceptCandidateEvent::get_logger());
        self.reject_candidate_handlers.push(RejectCandidateEvent::get_logger());
        self.start_poll_handlers.push(StartPollEvent::get_logger());
        self.complete_poll_handlers.push(CompletePollEvent::get_logger());
        self.flip_preference_handlers.push(FlipPreferenceEvent::get_logger());
        self.decide_handlers.push(DecideEvent::get_logger());
        self.sample_shortfall_handlers.push(SampleShortfallEvent::get_logger());
        self.soft_finalize_handlers.push(SoftFinalizeEvent::get_logger());
        self.hard_finalize_handlers.push(HardFinalizeEvent::get_logger());
        self.reject_vote_handlers.push(RejectVoteEvent::get_logger());
        self.start_bootstrap_handlers.push(StartBootstrapEvent::get_logger());
        self.end_bootstrap_handlers.push(EndBootstrapEvent::get_logger());
        self.defer_fetch_handlers.push(DeferFetchEvent::get_logger());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observe_candidate_handlers.is_empty()
            && self.accept_candidate_handlers.is_empty()
            && self.reject_candidate_handlers.is_empty()
            && self.start_poll_handlers.is_empty()
            && self.complete_poll_handlers.is_empty()
            && self.flip_preference_handlers.is_empty()
            && self.decide_handlers.is_empty()
            && self.sample_shortfall_handlers.is_empty()
            && self.soft_finalize_handlers.is_empty()
            && self.hard_finalize_handlers.is_empty()
            && self.reject_vote_handlers.is_empty()
            && self.start_bootstrap_handlers.is_empty()
            && self.end_bootstrap_handlers.is_empty()
            && self.defer_fetch_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::ObserveCandidate(ev) => {
                self.observe_candidate_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::AcceptCandidate(ev) => {
                self.accept_candidate_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::RejectCandidate(ev) => {
                self.reject_candidate_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::StartPoll(ev) => {
                self.start_poll_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::CompletePoll(ev) => {
                self.complete_poll_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::FlipPreference(ev) => {
                self.flip_preference_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::Decide(ev) => self.decide_handlers.iter().for_each(|handler| handler(&ev)),
            Event::SampleShortfall(ev) => {
                self.sample_shortfall_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::SoftFinalize(ev) => {
                self.soft_finalize_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::HardFinalize(ev) => {
                self.hard_finalize_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::RejectVote(ev) => {
                self.reject_vote_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::StartBootstrap(ev) => {
                self.start_bootstrap_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::EndBootstrap(ev) => {
                self.end_bootstrap_handlers.iter().for_each(|handler| handler(&ev))
            }
            Event::DeferFetch(ev) => {
                self.defer_fetch_handlers.iter().for_each(|handler| handler(&ev))
            }
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.try_recv() {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(TryRecvError::Empty) => thread::yield_now(),
            Err(TryRecvError::Disconnected) => {
                // The engine thread (event publisher) exited; drain is done.
                return;
            }
        }
    })
}
