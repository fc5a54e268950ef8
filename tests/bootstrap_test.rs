/*
    Copyright © 2025, Lux Industries Inc.
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Catch-up from genesis to a discovered frontier: ancestors are fetched, ordered, and
//! executed before the voting engine starts.

use std::time::{Duration, Instant};

use log::LevelFilter;

use lux_consensus::bootstrap::Bootstrapper;
use lux_consensus::chain::Chain;
use lux_consensus::errors::ConsensusError;
use lux_consensus::sequencer::{presets, BootstrapTarget, SequencerSpec};
use lux_consensus::types::basic::Height;
use lux_consensus::types::candidate::Candidate;

mod common;

use crate::common::{
    logging::setup_logger, membership::FixedMembership, transport::cluster_transport,
    vm::memory_vm, wait_until,
};

fn chain_of(genesis: &Candidate, len: u64) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut parent = genesis.clone();
    for i in 0..len {
        let child = Candidate::new(
            b"test-chain".to_vec(),
            format!("block {}", i + 1).into_bytes(),
            parent.id,
            parent.height + 1,
        );
        out.push(child.clone());
        parent = child;
    }
    out
}

#[test]
fn ancestors_are_fetched_and_executed_in_order() {
    setup_logger(LevelFilter::Debug);

    let genesis = Candidate::genesis(b"test-chain".to_vec(), b"genesis".to_vec());
    let blocks = chain_of(&genesis, 3);
    let (mut transport, cluster) = cluster_transport(genesis.id);
    for block in &blocks {
        cluster.host(block.clone());
    }
    let (mut vm, probe) = memory_vm(&genesis);
    let mut chain = Chain::new(genesis.clone()).unwrap();
    let peers = FixedMembership::with_peers(2).peer_ids();

    let mut bootstrapper = Bootstrapper::new(Height::new(3));
    bootstrapper
        .run(
            &mut chain,
            &mut transport,
            &mut vm,
            &peers,
            blocks[2].id,
            Instant::now() + Duration::from_secs(10),
            &None,
        )
        .unwrap();

    assert!(bootstrapper.is_complete());
    assert!(bootstrapper.tracker.is_bootstrapped());
    assert_eq!(bootstrapper.stats_snapshot().num_fetched, 3);
    assert_eq!(
        probe.accepted(),
        vec![genesis.id, blocks[0].id, blocks[1].id, blocks[2].id]
    );
    assert!(chain.is_accepted(&blocks[2].id));
    assert!(bootstrapper.health_check().healthy);
}

#[test]
fn an_unreachable_frontier_times_out() {
    setup_logger(LevelFilter::Debug);

    let genesis = Candidate::genesis(b"test-chain".to_vec(), b"genesis".to_vec());
    let orphan = Candidate::new(
        b"test-chain".to_vec(),
        b"unhosted".to_vec(),
        genesis.id,
        genesis.height + 1,
    );
    // Nothing is hosted, so every GetAncestors fails.
    let (mut transport, _cluster) = cluster_transport(genesis.id);
    let (mut vm, _probe) = memory_vm(&genesis);
    let mut chain = Chain::new(genesis.clone()).unwrap();
    let peers = FixedMembership::with_peers(1).peer_ids();

    let mut bootstrapper = Bootstrapper::new(Height::new(1));
    let result = bootstrapper.run(
        &mut chain,
        &mut transport,
        &mut vm,
        &peers,
        orphan.id,
        Instant::now() + Duration::from_millis(300),
        &None,
    );
    assert!(matches!(result, Err(ConsensusError::Timeout(_))));
    assert!(!bootstrapper.tracker.is_bootstrapped());
}

#[test]
fn sequencer_bootstraps_before_voting() {
    setup_logger(LevelFilter::Debug);

    let genesis = Candidate::genesis(b"test-chain".to_vec(), b"genesis".to_vec());
    let blocks = chain_of(&genesis, 2);
    let (transport, cluster) = cluster_transport(genesis.id);
    for block in &blocks {
        cluster.host(block.clone());
    }
    let (vm, probe) = memory_vm(&genesis);
    let membership = FixedMembership::with_peers(1);

    let sequencer = SequencerSpec::builder()
        .vm(vm)
        .transport(transport)
        .membership(membership)
        .genesis(genesis.clone())
        .configuration(presets::single_node())
        .bootstrap(BootstrapTarget {
            frontier: blocks[1].id,
            height: Height::new(2),
        })
        .build()
        .start()
        .unwrap();

    // History was executed during startup, before any candidate was submitted.
    assert_eq!(
        probe.accepted(),
        vec![genesis.id, blocks[0].id, blocks[1].id]
    );

    // Normal sequencing continues on top of the restored tip.
    let next = Candidate::new(
        b"test-chain".to_vec(),
        b"block 3".to_vec(),
        blocks[1].id,
        blocks[1].height + 1,
    );
    cluster.prefer(next.id);
    sequencer.submit(next.clone()).unwrap();
    assert!(wait_until(Duration::from_secs(30), || {
        probe.accepted().last() == Some(&next.id)
    }));

    drop(sequencer);
}
