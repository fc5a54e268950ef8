/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The Prism peer sampler: stake-weighted, health-aware committee selection.
//!
//! Each call splits the validator set into a committee of `k` unique peers, drawn without
//! replacement with weight `stake * (1 + health * 0.05)`. The health adjustment is capped
//! so a healthy peer never dominates beyond a factor of two over its bare stake. Sampling
//! for the same topic is deterministic until a health score or stake changes.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::health::HealthCheck;
use crate::types::basic::VoterId;

/// The lowest health score a peer can fall to. A peer at the floor has zero sampling
/// weight and is ineligible until it recovers.
pub const HEALTH_FLOOR: f64 = -20.0;
/// The highest health score a peer can climb to.
pub const HEALTH_CEIL: f64 = 20.0;

/// The outcome of one interaction with a peer, reported back to the sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The peer answered correctly and in time.
    Good,
    /// The peer failed to answer before the deadline.
    Timeout,
    /// The peer sent a message that failed integrity or signature checks.
    BadSig,
    /// The peer answered with a provably wrong response.
    WrongAnswer,
}

impl Outcome {
    fn health_delta(&self) -> f64 {
        match self {
            Outcome::Good => 1.0,
            Outcome::Timeout => -1.0,
            Outcome::BadSig => -2.0,
            Outcome::WrongAnswer => -1.0,
        }
    }
}

/// Bounds and seed for a [`Prism`] sampler.
#[derive(Clone, Debug)]
pub struct SamplerOptions {
    /// The smallest committee the sampler will aim for.
    pub min_peers: usize,
    /// The largest committee the sampler will return.
    pub max_peers: usize,
    /// Node-local seed mixed into the per-topic PRF.
    pub seed: [u8; 32],
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            min_peers: 1,
            max_peers: 128,
            seed: [0u8; 32],
        }
    }
}

/// The result of one sampling call.
#[derive(Clone, Debug)]
pub struct Sample {
    pub committee: Vec<VoterId>,
    /// True when fewer than `min_peers` eligible peers existed and the sampler returned
    /// every eligible peer instead of failing.
    pub shortfall: bool,
}

/// Stake-weighted, health-aware peer sampler.
///
/// The peer list is fixed at construction; health scores and stakes are mutable.
/// Sampling only reads the maps, `report` takes the short exclusive path, so callers can
/// wrap the sampler in a reader-writer lock.
pub struct Prism {
    peers: Vec<VoterId>,
    health: HashMap<VoterId, f64>,
    stake: HashMap<VoterId, f64>,
    options: SamplerOptions,
}

impl Prism {
    pub fn new(peers: Vec<VoterId>, options: SamplerOptions) -> Self {
        Self {
            peers,
            health: HashMap::new(),
            stake: HashMap::new(),
            options,
        }
    }

    /// Sets the stake weight for a peer. Peers default to weight 1.0.
    pub fn set_stake(&mut self, id: VoterId, weight: f64) {
        self.stake.insert(id, weight.max(0.0));
    }

    /// The current health score of a peer, default 1.0, clamped to
    /// [`HEALTH_FLOOR`]..=[`HEALTH_CEIL`].
    pub fn health(&self, id: &VoterId) -> f64 {
        self.health.get(id).copied().unwrap_or(1.0)
    }

    /// Records the outcome of an interaction, nudging the peer's health score.
    pub fn report(&mut self, id: VoterId, outcome: Outcome) {
        let score = self.health(&id) + outcome.health_delta();
        self.health.insert(id, score.clamp(HEALTH_FLOOR, HEALTH_CEIL));
    }

    /// The effective sampling weight of a peer.
    ///
    /// Health folds in as `1 + health * 0.05`, clamped to [0, 2] so health alone never
    /// more than doubles (or fully erases) a peer's stake.
    fn weight(&self, id: &VoterId) -> f64 {
        let stake = self.stake.get(id).copied().unwrap_or(1.0);
        let health_factor = (1.0 + self.health(id) * 0.05).clamp(0.0, 2.0);
        stake * health_factor
    }

    /// Draws a committee of `k` unique peers for `topic`.
    ///
    /// The target size is `clamp(k, min_peers, max_peers)`. If fewer eligible peers
    /// exist, all of them are returned and the sample is flagged as a shortfall; callers
    /// surface that as a warning event rather than an error.
    pub fn sample(&self, k: usize, topic: &[u8]) -> Sample {
        let target = k.clamp(self.options.min_peers, self.options.max_peers);

        let mut candidates: Vec<(VoterId, f64)> = self
            .peers
            .iter()
            .map(|id| (*id, self.weight(id)))
            .filter(|(_, w)| *w > 0.0)
            .collect();

        if candidates.len() <= target {
            let shortfall = candidates.len() < self.options.min_peers.min(target);
            return Sample {
                committee: candidates.into_iter().map(|(id, _)| id).collect(),
                shortfall,
            };
        }

        let mut rng = self.topic_rng(topic);
        let mut committee = Vec::with_capacity(target);
        while committee.len() < target && !candidates.is_empty() {
            let total: f64 = candidates.iter().map(|(_, w)| w).sum();
            let mut point = rng.gen_range(0.0..total);
            let mut chosen = candidates.len() - 1;
            for (i, (_, w)) in candidates.iter().enumerate() {
                if point < *w {
                    chosen = i;
                    break;
                }
                point -= w;
            }
            committee.push(candidates.swap_remove(chosen).0);
        }

        Sample {
            committee,
            shortfall: false,
        }
    }

    /// Per-call PRF: the same (seed, topic) pair always produces the same draw order.
    fn topic_rng(&self, topic: &[u8]) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.options.seed);
        hasher.update(topic);
        StdRng::from_seed(hasher.finalize().into())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn health_check(&self) -> HealthCheck {
        let eligible = self.peers.iter().filter(|id| self.weight(id) > 0.0).count();
        let mut check = HealthCheck::healthy();
        check.insert("peers", self.peers.len() as u64);
        check.insert("eligible_peers", eligible as u64);
        check.healthy = eligible >= self.options.min_peers;
        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(n: usize) -> Vec<VoterId> {
        (0..n)
            .map(|i| VoterId::from_agent(&format!("peer-{i}")))
            .collect()
    }

    #[test]
    fn same_topic_yields_same_committee() {
        let prism = Prism::new(peers(50), SamplerOptions::default());
        let a = prism.sample(10, b"item-1");
        let b = prism.sample(10, b"item-1");
        assert_eq!(a.committee, b.committee);
        assert_eq!(a.committee.len(), 10);
    }

    #[test]
    fn different_topics_diverge() {
        let prism = Prism::new(peers(50), SamplerOptions::default());
        let a = prism.sample(10, b"item-1");
        let b = prism.sample(10, b"item-2");
        assert_ne!(a.committee, b.committee);
    }

    #[test]
    fn committees_hold_unique_peers() {
        let prism = Prism::new(peers(30), SamplerOptions::default());
        let sample = prism.sample(20, b"t");
        let mut seen = sample.committee.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), sample.committee.len());
    }

    #[test]
    fn health_report_changes_scores_and_committees() {
        let ids = peers(50);
        let mut prism = Prism::new(ids.clone(), SamplerOptions::default());
        let before = prism.sample(10, b"item-1");

        for id in &ids[..25] {
            prism.report(*id, Outcome::BadSig);
            prism.report(*id, Outcome::BadSig);
        }
        assert_eq!(prism.health(&ids[0]), -3.0);
        let after = prism.sample(10, b"item-1");
        assert_ne!(before.committee, after.committee);
    }

    #[test]
    fn floored_health_makes_peer_ineligible() {
        let ids = peers(3);
        let mut prism = Prism::new(ids.clone(), SamplerOptions::default());
        for _ in 0..30 {
            prism.report(ids[0], Outcome::BadSig);
        }
        assert_eq!(prism.health(&ids[0]), HEALTH_FLOOR);
        let sample = prism.sample(3, b"t");
        assert!(!sample.committee.contains(&ids[0]));
    }

    #[test]
    fn shortfall_returns_all_eligible() {
        let prism = Prism::new(
            peers(2),
            SamplerOptions {
                min_peers: 5,
                ..SamplerOptions::default()
            },
        );
        let sample = prism.sample(5, b"t");
        assert_eq!(sample.committee.len(), 2);
        assert!(sample.shortfall);
    }

    #[test]
    fn stake_biases_selection() {
        let ids = peers(20);
        let mut prism = Prism::new(ids.clone(), SamplerOptions::default());
        prism.set_stake(ids[0], 1000.0);
        let mut hits = 0;
        for round in 0..50u32 {
            let sample = prism.sample(5, &round.to_be_bytes());
            if sample.committee.contains(&ids[0]) {
                hits += 1;
            }
        }
        assert!(hits > 40, "heavily staked peer sampled only {hits}/50 times");
    }
}
