/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Health reporting and bootstrap progress tracking.
//!
//! Every sub-engine exposes a side-effect-free `health_check()`. The bootstrap tracker
//! and stats are plain atomics so readers never block writers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::basic::now_ms;

/// Coarse health classification of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// A point-in-time health report from one sub-engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub healthy: bool,
    pub metrics: BTreeMap<String, u64>,
}

impl HealthCheck {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            metrics: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, value: u64) {
        self.metrics.insert(key.to_string(), value);
    }

    pub fn status(&self) -> HealthStatus {
        if self.healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Tracks whether the node has completed bootstrap. Lock-free.
#[derive(Debug, Default)]
pub struct BootstrapTracker {
    started: AtomicBool,
    completed: AtomicBool,
    started_at_ms: AtomicI64,
    completed_at_ms: AtomicI64,
}

impl BootstrapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_bootstrap_started(&self) {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.started_at_ms.store(now_ms(), Ordering::SeqCst);
        }
        self.completed.store(false, Ordering::SeqCst);
    }

    pub fn on_bootstrap_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
        self.completed_at_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> HealthStatus {
        if !self.started.load(Ordering::SeqCst) {
            HealthStatus::Unknown
        } else if self.completed.load(Ordering::SeqCst) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// Counters maintained by the bootstrap pipeline.
#[derive(Debug, Default)]
pub struct BootstrapStats {
    num_fetched: AtomicU64,
    num_accepted: AtomicU64,
    num_rejected: AtomicU64,
}

/// A copy of the bootstrap counters at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapStatsSnapshot {
    pub num_fetched: u64,
    pub num_accepted: u64,
    pub num_rejected: u64,
}

impl BootstrapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetched(&self) {
        self.num_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.num_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.num_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BootstrapStatsSnapshot {
        BootstrapStatsSnapshot {
            num_fetched: self.num_fetched.load(Ordering::Relaxed),
            num_accepted: self.num_accepted.load(Ordering::Relaxed),
            num_rejected: self.num_rejected.load(Ordering::Relaxed),
        }
    }
}
