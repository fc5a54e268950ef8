/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validated consensus knobs.
//!
//! The alpha thresholds encode a 69% super-majority when `alpha >= ceil(0.69 * k)`,
//! tolerating up to `floor(0.31 * k)` Byzantine peers in a committee.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConsensusError;
use crate::types::basic::serde_duration_ms;

/// The consensus parameters. Construct via [`Parameters::default`] or a preset, then
/// adjust and [`validate`](Parameters::validate); invalid combinations fail construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Committee size sampled per poll round.
    pub k: u32,

    /// Votes required to change a preference. Must satisfy `k/2 < alpha_preference <= k`.
    pub alpha_preference: u32,

    /// Votes required to grow confidence. Must satisfy
    /// `alpha_preference <= alpha_confidence <= k`.
    pub alpha_confidence: u32,

    /// Consecutive agreeing rounds required to decide.
    pub beta: u32,

    /// Maximum polls outstanding for one item at a time.
    pub concurrent_polls: u32,

    /// Maximum items processed concurrently. Must be at least `k`.
    pub max_outstanding_items: u32,

    /// How long an item may stay undecided before the health check degrades.
    #[serde(with = "serde_duration_ms")]
    pub max_item_processing_time: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha_preference: 15,
            alpha_confidence: 15,
            beta: 20,
            concurrent_polls: 2,
            max_outstanding_items: 1024,
            max_item_processing_time: Duration::from_secs(30),
        }
    }
}

impl Parameters {
    /// Parameters for the main network: K=21 with a 15-vote super-majority.
    pub fn mainnet() -> Self {
        Self {
            k: 21,
            alpha_preference: 15,
            alpha_confidence: 15,
            beta: 20,
            ..Self::default()
        }
    }

    /// Parameters for the test network: K=11, alpha=8.
    pub fn testnet() -> Self {
        Self {
            k: 11,
            alpha_preference: 8,
            alpha_confidence: 8,
            beta: 11,
            ..Self::default()
        }
    }

    /// Parameters for local development: K=5, alpha=4, fast convergence.
    pub fn local() -> Self {
        Self {
            k: 5,
            alpha_preference: 4,
            alpha_confidence: 4,
            beta: 5,
            ..Self::default()
        }
    }

    /// Validates the parameter combination, naming the offending field on failure.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.k < 1 {
            return Err(ConsensusError::invalid_parameters("k", "k must be >= 1"));
        }
        if self.alpha_preference <= self.k / 2 {
            return Err(ConsensusError::invalid_parameters(
                "alpha_preference",
                format!(
                    "k = {}, alpha_preference = {}: fails k/2 < alpha_preference",
                    self.k, self.alpha_preference
                ),
            ));
        }
        if self.alpha_preference > self.k {
            return Err(ConsensusError::invalid_parameters(
                "alpha_preference",
                format!(
                    "k = {}, alpha_preference = {}: fails alpha_preference <= k",
                    self.k, self.alpha_preference
                ),
            ));
        }
        if self.alpha_confidence < self.alpha_preference {
            return Err(ConsensusError::invalid_parameters(
                "alpha_confidence",
                format!(
                    "alpha_preference = {}, alpha_confidence = {}: fails alpha_preference <= alpha_confidence",
                    self.alpha_preference, self.alpha_confidence
                ),
            ));
        }
        if self.alpha_confidence > self.k {
            return Err(ConsensusError::invalid_parameters(
                "alpha_confidence",
                format!(
                    "k = {}, alpha_confidence = {}: fails alpha_confidence <= k",
                    self.k, self.alpha_confidence
                ),
            ));
        }
        if self.beta < 1 {
            return Err(ConsensusError::invalid_parameters("beta", "beta must be >= 1"));
        }
        if self.concurrent_polls < 1 {
            return Err(ConsensusError::invalid_parameters(
                "concurrent_polls",
                "concurrent_polls must be >= 1",
            ));
        }
        if self.max_outstanding_items < self.k {
            return Err(ConsensusError::invalid_parameters(
                "max_outstanding_items",
                format!(
                    "max_outstanding_items = {} must be >= k = {}",
                    self.max_outstanding_items, self.k
                ),
            ));
        }
        if self.max_item_processing_time.is_zero() {
            return Err(ConsensusError::invalid_parameters(
                "max_item_processing_time",
                "max_item_processing_time must be > 0",
            ));
        }
        Ok(())
    }

    /// The number of Byzantine committee members tolerated per round.
    pub fn byzantine_tolerance(&self) -> u32 {
        self.k - self.alpha_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_presets_validate() {
        Parameters::default().validate().unwrap();
        Parameters::mainnet().validate().unwrap();
        Parameters::testnet().validate().unwrap();
        Parameters::local().validate().unwrap();
    }

    #[test]
    fn alpha_preference_must_exceed_half_k() {
        let params = Parameters {
            k: 20,
            alpha_preference: 10,
            ..Parameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConsensusError::InvalidParameters {
                field: "alpha_preference",
                ..
            })
        ));
    }

    #[test]
    fn alpha_confidence_cannot_be_below_preference() {
        let params = Parameters {
            alpha_confidence: 12,
            ..Parameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConsensusError::InvalidParameters {
                field: "alpha_confidence",
                ..
            })
        ));
    }

    #[test]
    fn outstanding_items_must_cover_k() {
        let params = Parameters {
            max_outstanding_items: 4,
            ..Parameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn mainnet_is_a_69_percent_supermajority() {
        let p = Parameters::mainnet();
        assert!(p.alpha_confidence >= (p.k as f64 * 0.69).ceil() as u32);
        assert_eq!(p.byzantine_tolerance(), 6);
    }
}
