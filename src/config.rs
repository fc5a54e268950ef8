/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-node configuration, threaded explicitly through constructors.

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::errors::ConsensusError;
use crate::parameters::Parameters;
use crate::types::basic::{NetId, PolicyId};

/// Configuration of the consensus engine.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. Required:
    - `.parameters(...)`
    - `.soft_policy(...)`
    - `.hard_policy(...)`
"))]
pub struct Configuration {
    /// The sampling parameters (K, alphas, beta, budgets).
    pub parameters: Parameters,

    /// Which finality policy fills the soft slot.
    pub soft_policy: PolicyId,

    /// Which finality policy fills the hard slot.
    pub hard_policy: PolicyId,

    /// Deadline for one poll round.
    #[builder(default = Duration::from_secs(2))]
    pub round_timeout: Duration,

    /// Deadline for a candidate to progress from decided to hard-finalized before a
    /// warning is logged.
    #[builder(default = Duration::from_secs(60))]
    pub finality_timeout: Duration,

    /// Upper bound on the catch-up phase that runs before the voting engine starts.
    #[builder(default = Duration::from_secs(120))]
    pub bootstrap_timeout: Duration,

    /// Whether the Quantum policy must see Ringtail shares (dual signatures).
    #[builder(default = true)]
    pub require_rt: bool,

    /// Smallest committee the sampler may return without a shortfall warning.
    #[builder(default = 1)]
    pub min_peers: usize,

    /// Largest committee the sampler will return.
    #[builder(default = 128)]
    pub max_peers: usize,

    /// The network this chain belongs to.
    #[builder(default)]
    pub net_id: NetId,

    /// Opaque top-level network tag carried in gossip envelopes.
    #[builder(default = 0)]
    pub quantum_id: u32,

    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl Configuration {
    /// Validates the combination of parameters and policy slots.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        self.parameters.validate()?;
        if self.min_peers == 0 {
            return Err(ConsensusError::invalid_parameters(
                "min_peers",
                "min_peers must be at least 1",
            ));
        }
        if self.max_peers < self.min_peers {
            return Err(ConsensusError::invalid_parameters(
                "max_peers",
                "max_peers must be at least min_peers",
            ));
        }
        if self.round_timeout.is_zero() {
            return Err(ConsensusError::invalid_parameters(
                "round_timeout",
                "round_timeout must be positive",
            ));
        }
        Ok(())
    }
}
