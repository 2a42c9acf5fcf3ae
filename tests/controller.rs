mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{eventually, wait_active, RecordingDialer};
use murmur_lib::config::ControllerConfig;
use murmur_lib::controller::node::LinkState;
use murmur_lib::controller::ControllerService;
use murmur_lib::models::{ControllerSettings, NodeDefinition};
use murmur_lib::store::MemoryStore;

fn config(definitions: Vec<NodeDefinition>) -> ControllerConfig {
    ControllerConfig {
        local_address: String::new(),
        node_definitions: definitions,
        retry_backoff_ms: 30,
        ..ControllerConfig::default()
    }
}

#[tokio::test]
async fn blackout_zeros_and_sends_every_owned_universe() {
    let (dialer, wire) = RecordingDialer::new();
    let mut controller = ControllerService::new(
        Arc::new(MemoryStore::new()),
        dialer,
        &config(vec![NodeDefinition::new("2.0.0.2", vec![0, 1, 2, 3, 4, 5])]),
    );
    controller.setup().await;
    controller.startup().await;
    let node = controller.node_for(0).unwrap();
    wait_active(&node).await;

    for universe in 0..6 {
        node.buffer(universe).unwrap().with_mut(|d| d.fill(0xFF));
    }

    assert_eq!(controller.blackout().await, 6);
    eventually("six blackout frames", || wire.count() == 6).await;

    let mut universes: Vec<u16> = wire
        .frames_for("2.0.0.2")
        .into_iter()
        .map(|frame| {
            assert!(frame.data.iter().all(|&b| b == 0), "universe {} not dark", frame.universe);
            assert_eq!(frame.data.len(), 512);
            frame.universe
        })
        .collect();
    universes.sort_unstable();
    assert_eq!(universes, vec![0, 1, 2, 3, 4, 5]);
    for universe in 0..6 {
        assert!(node.buffer(universe).unwrap().snapshot().iter().all(|&b| b == 0));
    }

    // nothing extra shows up later
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(wire.count(), 6);
    controller.shutdown().await;
}

#[tokio::test]
async fn two_nodes_send_concurrently_without_mixing_buffers() {
    let (dialer, wire) = RecordingDialer::new();
    let mut controller = ControllerService::new(
        Arc::new(MemoryStore::new()),
        dialer,
        &config(vec![
            NodeDefinition::new("10.0.0.1", vec![0, 1]),
            NodeDefinition::new("10.0.0.2", vec![2, 3]),
        ]),
    );
    controller.setup().await;
    controller.startup().await;
    for node in controller.nodes() {
        wait_active(node).await;
    }

    for universe in 0..4u16 {
        let node = controller.node_for(universe).unwrap();
        node.buffer(universe).unwrap().with_mut(|d| d.fill(universe as u8 + 1));
    }

    let rounds = 25;
    let mut sends = tokio::task::JoinSet::new();
    for universe in 0..4u16 {
        let node = controller.node_for(universe).unwrap();
        sends.spawn(async move {
            let mut accepted = 0;
            for _ in 0..rounds {
                if node.request_send(universe).await {
                    accepted += 1;
                }
            }
            accepted
        });
    }
    let mut accepted = 0;
    while let Some(result) = sends.join_next().await {
        accepted += result.unwrap();
    }
    assert_eq!(accepted, 4 * rounds);
    eventually("every frame written", || wire.count() == 4 * rounds).await;

    for (address, owned) in [("10.0.0.1", [0u16, 1]), ("10.0.0.2", [2, 3])] {
        let frames = wire.frames_for(address);
        assert_eq!(frames.len(), 2 * rounds);
        for frame in frames {
            assert!(owned.contains(&frame.universe), "{address} sent universe {}", frame.universe);
            let fill = frame.universe as u8 + 1;
            assert!(frame.data.iter().all(|&b| b == fill));
        }
    }
    controller.shutdown().await;
}

#[tokio::test]
async fn failed_write_reconnects_after_backoff() {
    let (dialer, wire) = RecordingDialer::new();
    let mut controller = ControllerService::new(
        Arc::new(MemoryStore::new()),
        dialer,
        &config(vec![NodeDefinition::new("10.0.0.7", vec![9])]),
    );
    controller.setup().await;
    controller.startup().await;
    let node = controller.node_for(9).unwrap();
    wait_active(&node).await;
    assert_eq!(wire.dials.load(Ordering::SeqCst), 1);

    let mut states = node.subscribe_state();
    wire.break_next_write.store(true, Ordering::SeqCst);
    assert!(node.request_send(9).await);

    tokio::time::timeout(Duration::from_secs(2), states.wait_for(|s| *s != LinkState::Active))
        .await
        .expect("link failure went unnoticed")
        .unwrap();
    wait_active(&node).await;
    assert_eq!(wire.dials.load(Ordering::SeqCst), 2);
    assert_eq!(wire.count(), 0);

    // the same actor carries on without a restart
    assert!(node.request_send(9).await);
    eventually("frame after reconnect", || wire.count() == 1).await;
    let frames = wire.frames_for("10.0.0.7");
    assert_eq!(frames[0].universe, 9);
    assert_eq!(frames[0].sequence, 2);
    controller.shutdown().await;
}

#[tokio::test]
async fn stop_twice_and_restart_runs_one_actor() {
    let (dialer, wire) = RecordingDialer::new();
    let mut controller = ControllerService::new(
        Arc::new(MemoryStore::new()),
        dialer,
        &config(vec![NodeDefinition::new("10.0.0.1", vec![0])]),
    );
    controller.setup().await;
    controller.startup().await;
    controller.startup().await;
    let node = controller.node_for(0).unwrap();
    wait_active(&node).await;

    controller.shutdown().await;
    controller.shutdown().await;
    assert_eq!(node.state(), LinkState::Idle);
    assert_eq!(wire.dials.load(Ordering::SeqCst), 1);

    controller.startup().await;
    wait_active(&node).await;
    assert_eq!(wire.dials.load(Ordering::SeqCst), 2);
    controller.shutdown().await;
}

#[tokio::test]
async fn replacing_definitions_rebuilds_the_node_set() {
    let (dialer, wire) = RecordingDialer::new();
    let mut controller = ControllerService::new(
        Arc::new(MemoryStore::new()),
        dialer,
        &config(vec![NodeDefinition::new("10.0.0.1", vec![0, 1])]),
    );
    controller.setup().await;
    controller.startup().await;
    let old = controller.node_for(0).unwrap();
    wait_active(&old).await;

    let next = ControllerSettings {
        local_address: String::new(),
        node_definitions: vec![
            NodeDefinition::new("10.0.0.5", vec![3, 1]),
            NodeDefinition::new("10.0.0.6", vec![0]),
        ],
    };
    controller.set_settings(next.clone()).await.unwrap();
    assert_eq!(controller.settings(), next);

    // old actor is gone before the new ones run
    assert!(!old.is_running().await);
    assert!(!old.request_send(0).await);

    let owner = controller.node_for(1).unwrap();
    assert_eq!(owner.address(), "10.0.0.5");
    wait_active(&owner).await;
    assert!(owner.request_send(1).await);
    eventually("frame from the new node", || !wire.frames_for("10.0.0.5").is_empty()).await;
    controller.shutdown().await;
}
