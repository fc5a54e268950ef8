/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The facade that binds membership, proposal, data availability, finality and
//! transport into one running pipeline.

use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use typed_builder::TypedBuilder;

use crate::bootstrap::Bootstrapper;
use crate::chain::Chain;
use crate::config::Configuration;
use crate::engine::start_engine;
use crate::errors::ConsensusError;
use crate::event_bus::{start_event_bus, EventHandlers, HandlerPtr};
use crate::events::*;
use crate::finality::agreement::TwoPhaseAgreement;
use crate::finality::l1::{L1InclusionPolicy, L1Verifier};
use crate::finality::none::NonePolicy;
use crate::finality::quantum::QuantumPolicy;
use crate::finality::quorum::QuorumPolicy;
use crate::finality::sample::SampleConvergencePolicy;
use crate::finality::FinalityPolicy;
use crate::parameters::Parameters;
use crate::sampler::{Prism, SamplerOptions};
use crate::transport::Transport;
use crate::types::basic::{CandidateId, Height, PolicyId, VoterId};
use crate::types::candidate::Candidate;
use crate::vm::Vm;
use crate::wave::WaveEngine;

/// One voting principal, with optional stake and reachable address.
#[derive(Clone, Debug, PartialEq)]
pub struct Validator {
    pub id: VoterId,
    pub stake: u64,
    /// Hostname (optionally `host:port`). IP literals are refused at the membership
    /// boundary.
    pub address: Option<String>,
}

/// The validator set of one epoch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a validator, refusing IP-literal addresses.
    pub fn add(&mut self, validator: Validator) -> Result<(), ConsensusError> {
        if let Some(addr) = &validator.address {
            validate_hostname(addr)?;
        }
        if !self.validators.iter().any(|v| v.id == validator.id) {
            self.validators.push(validator);
        }
        Ok(())
    }

    pub fn contains(&self, id: &VoterId) -> bool {
        self.validators.iter().any(|v| v.id == *id)
    }

    pub fn ids(&self) -> Vec<VoterId> {
        self.validators.iter().map(|v| v.id).collect()
    }

    pub fn total_stake(&self) -> u64 {
        self.validators.iter().map(|v| v.stake).sum()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }
}

/// Checks that a peer address is a hostname, not an IP literal.
///
/// Accepts `host` and `host:port` forms. Rejects IPv4 and IPv6 literals in any form,
/// including `a.b.c.d:port` and `[v6]:port`.
pub fn validate_hostname(addr: &str) -> Result<(), ConsensusError> {
    use std::net::{Ipv4Addr, Ipv6Addr};

    let refused = |addr: &str| ConsensusError::HostnameValidation {
        addr: addr.to_string(),
    };

    if addr.is_empty() {
        return Err(refused(addr));
    }
    // Bracketed IPv6, with or without a port.
    if addr.starts_with('[') {
        return Err(refused(addr));
    }
    // Bare IPv6.
    if addr.parse::<Ipv6Addr>().is_ok() {
        return Err(refused(addr));
    }
    // Split a trailing `:port`, if any, and inspect the host part.
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        Some(_) => return Err(refused(addr)),
        None => addr,
    };
    if host.is_empty() || host.parse::<Ipv4Addr>().is_ok() || host.parse::<Ipv6Addr>().is_ok() {
        return Err(refused(addr));
    }
    Ok(())
}

/// Provides the validator set per epoch and deterministic committee sampling.
pub trait Membership: Send {
    fn validator_set(&self, epoch: u64) -> ValidatorSet;

    /// Samples a size-`k` committee for `topic`, deterministic for a given epoch,
    /// topic and seed.
    fn sample(&self, epoch: u64, k: usize, topic: &[u8]) -> Vec<VoterId> {
        let set = self.validator_set(epoch);
        let mut prism = Prism::new(set.ids(), SamplerOptions::default());
        for validator in set.iter() {
            prism.set_stake(validator.id, validator.stake as f64);
        }
        prism.sample(k, topic).committee
    }
}

/// Creates the next candidate to sequence from a raw payload. For a single-node
/// deployment this is always the local node; for committees, leader rotation decides,
/// and an implementation may refuse when this node is not the round's leader.
pub trait Proposer: Send {
    fn next_candidate(
        &mut self,
        parent: CandidateId,
        height: Height,
        payload: Vec<u8>,
    ) -> Result<Candidate, ConsensusError>;
}

/// The single-node proposer: every payload becomes the next candidate under a fixed
/// domain, stamped with the local node's id.
pub struct LocalProposer {
    domain: Vec<u8>,
    proposer_id: VoterId,
}

impl LocalProposer {
    pub fn new(domain: impl Into<Vec<u8>>, proposer_id: VoterId) -> Self {
        Self {
            domain: domain.into(),
            proposer_id,
        }
    }
}

impl Proposer for LocalProposer {
    fn next_candidate(
        &mut self,
        parent: CandidateId,
        height: Height,
        payload: Vec<u8>,
    ) -> Result<Candidate, ConsensusError> {
        let mut candidate = Candidate::new(self.domain.clone(), payload, parent, height);
        candidate.meta.proposer_id = self.proposer_id;
        Ok(candidate)
    }
}

/// Where externalized payload bytes live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DaType {
    Local,
    Ipfs,
    Blob,
    Warp,
    P2p,
    Mcp,
}

impl DaType {
    pub const fn scheme(&self) -> &'static str {
        match self {
            DaType::Local => "local",
            DaType::Ipfs => "ipfs",
            DaType::Blob => "blob",
            DaType::Warp => "warp",
            DaType::P2p => "p2p",
            DaType::Mcp => "mcp",
        }
    }
}

/// A reference to payload bytes held by a data-availability layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaRef {
    pub da_type: DaType,
    pub uri: String,
}

impl DaRef {
    pub fn new(da_type: DaType, uri: impl Into<String>) -> Self {
        Self {
            da_type,
            uri: uri.into(),
        }
    }

    /// Parses a `scheme://rest` reference string.
    pub fn parse(s: &str) -> Result<Self, ConsensusError> {
        let (scheme, _) = s.split_once("://").ok_or_else(|| {
            ConsensusError::invalid_parameters("da_ref", format!("missing scheme in {s:?}"))
        })?;
        let da_type = match scheme {
            "local" => DaType::Local,
            "ipfs" => DaType::Ipfs,
            "blob" => DaType::Blob,
            "warp" => DaType::Warp,
            "p2p" => DaType::P2p,
            "mcp" => DaType::Mcp,
            other => {
                return Err(ConsensusError::invalid_parameters(
                    "da_ref",
                    format!("unknown da scheme {other:?}"),
                ))
            }
        };
        Ok(Self {
            da_type,
            uri: s.to_string(),
        })
    }
}

impl std::fmt::Display for DaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Stores and retrieves candidate payloads by reference.
pub trait DataAvailability: Send {
    fn store(&mut self, payload: &[u8]) -> Result<DaRef, ConsensusError>;
    fn retrieve(&mut self, reference: &DaRef) -> Result<Vec<u8>, ConsensusError>;
}

/// In-process data availability, addressed by payload hash.
#[derive(Default)]
pub struct LocalDa {
    blobs: HashMap<String, Vec<u8>>,
}

impl LocalDa {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataAvailability for LocalDa {
    fn store(&mut self, payload: &[u8]) -> Result<DaRef, ConsensusError> {
        let uri = format!("local://{}", CandidateId::of(b"da", payload));
        self.blobs.insert(uri.clone(), payload.to_vec());
        Ok(DaRef::new(DaType::Local, uri))
    }

    fn retrieve(&mut self, reference: &DaRef) -> Result<Vec<u8>, ConsensusError> {
        self.blobs.get(&reference.uri).cloned().ok_or_else(|| {
            ConsensusError::Integrity(format!("dangling da reference {}", reference.uri))
        })
    }
}

/// A discovered frontier to catch up to before voting starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootstrapTarget {
    /// The head candidate whose ancestry is fetched.
    pub frontier: CandidateId,
    /// The height the local chain must cover.
    pub height: Height,
}

/// Ready-made configurations for common deployments.
pub mod presets {
    use super::*;

    /// A single local node: no peers, immediate self-attested finality.
    pub fn single_node() -> Configuration {
        let parameters = Parameters {
            k: 1,
            alpha_preference: 1,
            alpha_confidence: 1,
            beta: 1,
            max_outstanding_items: 64,
            ..Parameters::default()
        };
        Configuration::builder()
            .parameters(parameters)
            .soft_policy(PolicyId::None)
            .hard_policy(PolicyId::None)
            .log_events(false)
            .build()
    }

    /// A mesh of `k` agents converging by repeated sampling, settling on a quorum.
    pub fn agent_mesh(k: u32) -> Configuration {
        let alpha = (k * 69).div_ceil(100).max(k / 2 + 1);
        let parameters = Parameters {
            k,
            alpha_preference: alpha,
            alpha_confidence: alpha,
            beta: 8,
            max_outstanding_items: 1024.max(k),
            ..Parameters::default()
        };
        Configuration::builder()
            .parameters(parameters)
            .soft_policy(PolicyId::SampleConvergence)
            .hard_policy(PolicyId::Quorum)
            .log_events(false)
            .build()
    }

    /// A validator chain: sampled soft finality, post-quantum hard finality.
    pub fn blockchain() -> Configuration {
        Configuration::builder()
            .parameters(Parameters::mainnet())
            .soft_policy(PolicyId::SampleConvergence)
            .hard_policy(PolicyId::Quantum)
            .log_events(false)
            .build()
    }

    /// A rollup settling to an L1: quorum soft finality, L1 inclusion as the hard
    /// proof.
    pub fn rollup() -> Configuration {
        Configuration::builder()
            .parameters(Parameters::mainnet())
            .soft_policy(PolicyId::Quorum)
            .hard_policy(PolicyId::L1Inclusion)
            .log_events(false)
            .build()
    }
}

/// Stores all parameters and trait implementations required to run a [Sequencer].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [SequencerSpec]. Required:
    - `.vm(...)`
    - `.transport(...)`
    - `.membership(...)`
    - `.genesis(...)`
    - `.configuration(...)`

    Optional: `.l1_verifier(...)` (required when a policy slot is L1Inclusion),
    `.proposer(...)` and `.da(...)` (required for [Sequencer::submit_payload]),
    `.bootstrap(...)`, and the `.on_*(...)` event handler setters.
"))]
pub struct SequencerSpec<T: Transport, V: Vm, M: Membership> {
    vm: V,
    transport: T,
    membership: M,
    genesis: Candidate,
    configuration: Configuration,

    #[builder(default, setter(strip_option))]
    l1_verifier: Option<Box<dyn L1Verifier>>,

    #[builder(default, setter(strip_option))]
    bootstrap: Option<BootstrapTarget>,

    #[builder(default, setter(strip_option))]
    proposer: Option<Box<dyn Proposer>>,

    #[builder(default, setter(strip_option))]
    da: Option<Box<dyn DataAvailability>>,

    #[builder(default, setter(transform = |handler: impl Fn(&ObserveCandidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ObserveCandidateEvent>)))]
    on_observe_candidate: Option<HandlerPtr<ObserveCandidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AcceptCandidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AcceptCandidateEvent>)))]
    on_accept_candidate: Option<HandlerPtr<AcceptCandidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectCandidateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectCandidateEvent>)))]
    on_reject_candidate: Option<HandlerPtr<RejectCandidateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartPollEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartPollEvent>)))]
    on_start_poll: Option<HandlerPtr<StartPollEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CompletePollEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CompletePollEvent>)))]
    on_complete_poll: Option<HandlerPtr<CompletePollEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FlipPreferenceEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FlipPreferenceEvent>)))]
    on_flip_preference: Option<HandlerPtr<FlipPreferenceEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DecideEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DecideEvent>)))]
    on_decide: Option<HandlerPtr<DecideEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SampleShortfallEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SampleShortfallEvent>)))]
    on_sample_shortfall: Option<HandlerPtr<SampleShortfallEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SoftFinalizeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SoftFinalizeEvent>)))]
    on_soft_finalize: Option<HandlerPtr<SoftFinalizeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&HardFinalizeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<HardFinalizeEvent>)))]
    on_hard_finalize: Option<HandlerPtr<HardFinalizeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectVoteEvent>)))]
    on_reject_vote: Option<HandlerPtr<RejectVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartBootstrapEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartBootstrapEvent>)))]
    on_start_bootstrap: Option<HandlerPtr<StartBootstrapEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndBootstrapEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndBootstrapEvent>)))]
    on_end_bootstrap: Option<HandlerPtr<EndBootstrapEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&DeferFetchEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<DeferFetchEvent>)))]
    on_defer_fetch: Option<HandlerPtr<DeferFetchEvent>>,
}

impl<T: Transport + 'static, V: Vm + 'static, M: Membership + 'static> SequencerSpec<T, V, M> {
    /// Starts the engine and event-bus threads and returns their handle.
    pub fn start(mut self) -> Result<Sequencer, ConsensusError> {
        self.configuration.validate()?;

        let mut chain = Chain::new(self.genesis.clone())?;
        let wave = WaveEngine::new(self.configuration.parameters.clone())?;

        let soft = self.make_policy(self.configuration.soft_policy)?;
        let hard = self.make_policy(self.configuration.hard_policy)?;
        let mut agreement = TwoPhaseAgreement::new(soft, hard);
        agreement.on_candidate(&self.genesis);

        let set = self.membership.validator_set(0);
        let mut sampler = Prism::new(
            set.ids(),
            SamplerOptions {
                min_peers: self.configuration.min_peers,
                max_peers: self.configuration.max_peers,
                seed: self.genesis.id.bytes(),
            },
        );
        for validator in set.iter() {
            sampler.set_stake(validator.id, validator.stake as f64);
        }

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_observe_candidate,
            self.on_accept_candidate,
            self.on_reject_candidate,
            self.on_start_poll,
            self.on_complete_poll,
            self.on_flip_preference,
            self.on_decide,
            self.on_sample_shortfall,
            self.on_soft_finalize,
            self.on_hard_finalize,
            self.on_reject_vote,
            self.on_start_bootstrap,
            self.on_end_bootstrap,
            self.on_defer_fetch,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            let (tx, rx) = mpsc::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                let handle = start_event_bus(event_handlers, subscriber, shutdown_receiver);
                (Some(handle), Some(shutdown))
            }
            None => (None, None),
        };

        // Catch up to the discovered frontier before any vote is cast.
        if let Some(target) = self.bootstrap {
            let mut bootstrapper = Bootstrapper::new(target.height);
            let deadline = Instant::now() + self.configuration.bootstrap_timeout;
            let result = bootstrapper.run(
                &mut chain,
                &mut self.transport,
                &mut self.vm,
                &set.ids(),
                target.frontier,
                deadline,
                &event_publisher,
            );
            if let Err(err) = result {
                // Wind the event bus back down; the engine thread does not exist yet.
                if let Some(shutdown) = &event_bus_shutdown {
                    let _ = shutdown.send(());
                }
                if let Some(handle) = event_bus {
                    let _ = handle.join();
                }
                return Err(err);
            }
        }

        // Local sequencing extends from the bootstrapped frontier, or genesis on a
        // fresh start.
        let tip = match self.bootstrap {
            Some(target) => (target.frontier, target.height),
            None => (self.genesis.id, self.genesis.height),
        };

        let (candidate_tx, candidate_rx) = mpsc::channel();
        let (engine_shutdown, engine_shutdown_receiver) = mpsc::channel();
        let engine = start_engine(
            self.configuration,
            chain,
            wave,
            agreement,
            sampler,
            self.transport,
            self.vm,
            candidate_rx,
            engine_shutdown_receiver,
            event_publisher,
        );

        Ok(Sequencer {
            engine: Some(engine),
            engine_shutdown,
            event_bus,
            event_bus_shutdown,
            candidate_tx,
            proposer: self.proposer,
            da: self.da,
            tip,
        })
    }

    fn make_policy(
        &mut self,
        policy_id: PolicyId,
    ) -> Result<Box<dyn FinalityPolicy>, ConsensusError> {
        let parameters = &self.configuration.parameters;
        let threshold = parameters.alpha_confidence as usize;
        Ok(match policy_id {
            PolicyId::None => Box::new(NonePolicy::new()),
            PolicyId::Quorum => Box::new(QuorumPolicy::new(threshold)?),
            PolicyId::SampleConvergence => Box::new(SampleConvergencePolicy::new(
                parameters.k as usize,
                parameters.alpha_confidence,
                parameters.beta,
            )?),
            PolicyId::Quantum => Box::new(QuantumPolicy::new(
                threshold,
                self.configuration.require_rt,
            )?),
            PolicyId::L1Inclusion => {
                let verifier = self.l1_verifier.take().ok_or_else(|| {
                    ConsensusError::invalid_parameters(
                        "l1_verifier",
                        "the L1Inclusion policy needs an L1 verifier",
                    )
                })?;
                Box::new(L1InclusionPolicy::new(verifier))
            }
        })
    }
}

/// A handle to the background threads of a running sequencer. Dropping it shuts all
/// threads down gracefully.
pub struct Sequencer {
    engine: Option<JoinHandle<()>>,
    engine_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
    candidate_tx: Sender<Candidate>,
    proposer: Option<Box<dyn Proposer>>,
    da: Option<Box<dyn DataAvailability>>,
    /// The local sequencing head: the last candidate this node proposed (or the
    /// bootstrap frontier), and its height.
    tip: (CandidateId, Height),
}

impl Sequencer {
    /// Submits a locally produced candidate for sequencing.
    pub fn submit(&self, candidate: Candidate) -> Result<(), ConsensusError> {
        self.candidate_tx
            .send(candidate)
            .map_err(|_| ConsensusError::Cancelled)
    }

    /// Turns a raw payload into the next candidate using the bound [Proposer],
    /// externalizes its bytes through the bound [DataAvailability] layer, and
    /// submits it for sequencing. Returns the new candidate's id.
    ///
    /// Fails if the spec was built without a `.proposer(...)`.
    pub fn submit_payload(&mut self, payload: Vec<u8>) -> Result<CandidateId, ConsensusError> {
        let proposer = self.proposer.as_mut().ok_or_else(|| {
            ConsensusError::invalid_parameters(
                "proposer",
                "submit_payload needs a proposer bound on the spec",
            )
        })?;
        let height = self.tip.1 + 1;
        let mut candidate = proposer.next_candidate(self.tip.0, height, payload)?;
        if let Some(da) = self.da.as_mut() {
            // The DA reference is not part of the content address, so stamping it
            // after construction leaves the id intact.
            candidate.da_ref = Some(da.store(&candidate.payload)?.to_string());
        }
        let id = candidate.id;
        self.submit(candidate)?;
        self.tip = (id, height);
        Ok(id)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        // The engine publishes to the event bus, so it goes down first; the bus then
        // drains and exits when its sender disconnects or on its own signal.
        let _ = self.engine_shutdown.send(());
        if let Some(engine) = self.engine.take() {
            let _ = engine.join();
        }
        if let Some(shutdown) = &self.event_bus_shutdown {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
    }
}
