/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A metastable consensus engine built on repeated randomized sampling.
//!
//! Nodes converge on one candidate per height by polling small, stake-weighted
//! committees and reinforcing whichever side a supermajority of responses supports.
//! Convergence produces a *soft* decision; a pluggable [finality] policy then upgrades
//! it to a *hard*, externally checkable [Certificate](types::certificate::Certificate).
//!
//! ## Using this library
//!
//! Implement [Transport](transport::Transport) over your networking stack,
//! [Vm](vm::Vm) over your application state machine, and
//! [Membership](sequencer::Membership) over your validator registry, then hand all
//! three to a [SequencerSpec](sequencer::SequencerSpec):
//!
//! ```ignore
//! let sequencer = SequencerSpec::builder()
//!     .vm(vm)
//!     .transport(transport)
//!     .membership(membership)
//!     .genesis(genesis)
//!     .configuration(presets::blockchain())
//!     .build()
//!     .start()?;
//! sequencer.submit(candidate)?;
//! ```
//!
//! Dropping the returned [Sequencer](sequencer::Sequencer) shuts the background
//! threads down gracefully.

pub mod types;

pub mod parameters;

pub mod errors;

pub mod chain;

pub mod wave;

pub mod sampler;

pub mod finality;

pub mod bootstrap;

pub mod transport;

pub mod vm;

pub mod sequencer;

pub mod config;

pub mod events;

pub mod health;

pub mod logging;

pub(crate) mod engine;

pub(crate) mod event_bus;
