/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The metastable sampling core.
//!
//! Repeated sampled polls pull each undecided item toward one of two attractors
//! (accept or reject); beta consecutive super-majority rounds freeze the decision.
//! [`state`] holds the per-item counters, [`polls`] the in-flight poll registry, and
//! [`engine`] ties them together.

pub mod engine;
pub mod polls;
pub mod state;

pub use engine::{PollApplication, WaveEngine};
pub use polls::{PollManager, PollResult};
pub use state::{PollEffect, WaveState};
