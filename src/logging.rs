/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! Logging goes through the [log](https://docs.rs/log/latest/log/) crate; enable it per
//! node via [`Configuration`](crate::config::Configuration)'s `log_events` flag and set
//! up a logging implementation (for example `fern`) to get the messages onto a terminal
//! or into a file.
//!
//! ## Log message format
//!
//! Log messages are CSVs with at least two values. The first two are always:
//! 1. The name of the [event](crate::events) in PascalCase (the constants below).
//! 2. The time the event was emitted (seconds since the Unix Epoch).
//!
//! The rest differ per event. For example, a completed poll prints as:
//!
//! ```text
//! CompletePoll, 1756412384, Gm4oYx9, 3, 14, 1
//! ```
//!
//! where the third value is the first seven characters of the Base64 encoding of the
//! candidate id, followed by the round and the yes/no counts.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;
use crate::event_bus::HandlerPtr;

// Names of each event in PascalCase for printing:
pub const OBSERVE_CANDIDATE: &str = "ObserveCandidate";
pub const ACCEPT_CANDIDATE: &str = "AcceptCandidate";
pub const REJECT_CANDIDATE: &str = "RejectCandidate";

pub const START_POLL: &str = "StartPoll";
pub const COMPLETE_POLL: &str = "CompletePoll";
pub const FLIP_PREFERENCE: &str = "FlipPreference";
pub const DECIDE: &str = "Decide";
pub const SAMPLE_SHORTFALL: &str = "SampleShortfall";

pub const SOFT_FINALIZE: &str = "SoftFinalize";
pub const HARD_FINALIZE: &str = "HardFinalize";
pub const REJECT_VOTE: &str = "RejectVote";

pub const START_BOOTSTRAP: &str = "StartBootstrap";
pub const END_BOOTSTRAP: &str = "EndBootstrap";
pub const DEFER_FETCH: &str = "DeferFetch";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> HandlerPtr<Self>;
}

impl Logger for ObserveCandidateEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &ObserveCandidateEvent| {
            log::info!(
                "{}, {}, {}, {}",
                OBSERVE_CANDIDATE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate.id.bytes()),
                ev.candidate.height
            )
        })
    }
}

impl Logger for AcceptCandidateEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &AcceptCandidateEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ACCEPT_CANDIDATE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes()),
                ev.height
            )
        })
    }
}

impl Logger for RejectCandidateEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &RejectCandidateEvent| {
            log::info!(
                "{}, {}, {}",
                REJECT_CANDIDATE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes())
            )
        })
    }
}

impl Logger for StartPollEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &StartPollEvent| {
            log::debug!(
                "{}, {}, {}, {}, {}",
                START_POLL,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes()),
                ev.round,
                ev.committee_size
            )
        })
    }
}

impl Logger for CompletePollEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &CompletePollEvent| {
            log::debug!(
                "{}, {}, {}, {}, {}, {}",
                COMPLETE_POLL,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes()),
                ev.round,
                ev.yes,
                ev.no
            )
        })
    }
}

impl Logger for FlipPreferenceEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &FlipPreferenceEvent| {
            log::info!(
                "{}, {}, {}, {}",
                FLIP_PREFERENCE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes()),
                ev.preference
            )
        })
    }
}

impl Logger for DecideEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &DecideEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                DECIDE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes()),
                ev.preference,
                ev.rounds
            )
        })
    }
}

impl Logger for SampleShortfallEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &SampleShortfallEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                SAMPLE_SHORTFALL,
                secs_since_unix_epoch(ev.timestamp),
                ev.requested,
                ev.eligible
            )
        })
    }
}

impl Logger for SoftFinalizeEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &SoftFinalizeEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SOFT_FINALIZE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.certificate.candidate_id.bytes()),
                ev.certificate.policy_id
            )
        })
    }
}

impl Logger for HardFinalizeEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &HardFinalizeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                HARD_FINALIZE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.certificate.candidate_id.bytes()),
                ev.certificate.policy_id,
                ev.certificate.signer_count()
            )
        })
    }
}

impl Logger for RejectVoteEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &RejectVoteEvent| {
            log::warn!(
                "{}, {}, {}, {}, {}",
                REJECT_VOTE,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.voter.bytes()),
                first_seven_base64_chars(&ev.candidate_id.bytes()),
                ev.reason
            )
        })
    }
}

impl Logger for StartBootstrapEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &StartBootstrapEvent| {
            log::info!(
                "{}, {}, {}",
                START_BOOTSTRAP,
                secs_since_unix_epoch(ev.timestamp),
                ev.target
            )
        })
    }
}

impl Logger for EndBootstrapEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &EndBootstrapEvent| {
            log::info!(
                "{}, {}, {}",
                END_BOOTSTRAP,
                secs_since_unix_epoch(ev.timestamp),
                ev.fetched
            )
        })
    }
}

impl Logger for DeferFetchEvent {
    fn get_logger() -> HandlerPtr<Self> {
        Box::new(|ev: &DeferFetchEvent| {
            log::warn!(
                "{}, {}, {}",
                DEFER_FETCH,
                secs_since_unix_epoch(ev.timestamp),
                first_seven_base64_chars(&ev.candidate_id.bytes())
            )
        })
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
