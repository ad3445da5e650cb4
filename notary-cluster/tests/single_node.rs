//! Single-node cluster tests.
//!
//! A one-voter cluster commits through the same log, state machine and
//! snapshot path as a full cluster.

mod common;

use common::{node_config, party, state, tx};
use notary_cluster::{ClusterNode, RaftUniquenessProvider, ReadMode};
use notary_core::{CommitResult, ConsumingTransaction, NotaryCommand, NotaryResponse, UniquenessProvider};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

async fn start_node(data_dir: &Path) -> Arc<ClusterNode> {
    let addr = format!("127.0.0.1:{}", common::get_test_port());
    let config = node_config(1, &addr, data_dir.to_path_buf(), &[]);

    // The previous instance may still be releasing its database files.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match ClusterNode::start(config.clone()).await {
            Ok(node) => return Arc::new(node),
            Err(e) if Instant::now() < deadline => {
                tracing::debug!(error = %e, "retrying node start");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => panic!("Failed to start node: {e}"),
        }
    }
}

async fn wait_until_leader(node: &ClusterNode) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !node.is_leader().await {
        assert!(Instant::now() < deadline, "Single node should become leader");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Test that a single node can start and initialize.
#[tokio::test]
async fn test_single_node_start_and_initialize() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let node = start_node(temp_dir.path()).await;

    node.initialize().await.expect("Failed to initialize");
    wait_until_leader(&node).await;

    assert_eq!(node.leader().await, Some(1));
    assert_eq!(node.node_id(), 1);

    node.shutdown().await.expect("Failed to shutdown");
}

/// Test commit, double spend and audit lookup through the provider.
#[tokio::test]
async fn test_single_node_commit_and_conflict() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let node = start_node(temp_dir.path()).await;
    node.initialize().await.expect("Failed to initialize");
    wait_until_leader(&node).await;

    let provider = RaftUniquenessProvider::new(Arc::clone(&node));

    let result = provider
        .commit(vec![state("issue", 0), state("issue", 1)], tx("move-1"), party("alice"))
        .await
        .expect("Commit should work");
    assert_eq!(result, CommitResult::Success);

    // Spends output 1 again and output 2 for the first time.
    let result = provider
        .commit(vec![state("issue", 2), state("issue", 1)], tx("move-2"), party("bob"))
        .await
        .expect("Commit should work");
    let conflict = result.conflict().expect("Double spend should conflict");
    assert_eq!(conflict.state_history.len(), 1);
    assert_eq!(
        conflict.state_history[&state("issue", 1)],
        ConsumingTransaction::new(tx("move-1"), 1, party("alice"))
    );

    // The refused claim wrote nothing.
    assert_eq!(provider.get(state("issue", 2)).await.unwrap(), None);
    assert_eq!(provider.size().await.unwrap(), 2);
    assert_eq!(
        provider.get(state("issue", 0)).await.unwrap(),
        Some(ConsumingTransaction::new(tx("move-1"), 0, party("alice")))
    );

    node.shutdown().await.expect("Failed to shutdown");
}

/// Test that retrying a committed claim names the caller's own transaction.
#[tokio::test]
async fn test_single_node_retry_is_recognisable() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let node = start_node(temp_dir.path()).await;
    node.initialize().await.expect("Failed to initialize");
    wait_until_leader(&node).await;

    let provider = RaftUniquenessProvider::new(Arc::clone(&node));
    let inputs = vec![state("issue", 0)];

    let first = provider
        .commit(inputs.clone(), tx("move"), party("alice"))
        .await
        .unwrap();
    assert!(first.is_success());

    let retry = provider
        .commit(inputs, tx("move"), party("alice"))
        .await
        .unwrap();
    let conflict = retry.conflict().expect("Retry should conflict");
    assert!(conflict.conflicts_only_with(&tx("move")));

    node.shutdown().await.expect("Failed to shutdown");
}

/// Test local queries against the applied state.
#[tokio::test]
async fn test_single_node_local_query() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let node = start_node(temp_dir.path()).await;
    node.initialize().await.expect("Failed to initialize");
    wait_until_leader(&node).await;

    let resp = node
        .execute(NotaryCommand::claim(vec![state("issue", 0)], tx("move"), party("alice")))
        .await
        .expect("Execute should work");
    assert_eq!(resp, NotaryResponse::Committed);

    assert_eq!(node.query(&NotaryCommand::Size).unwrap(), NotaryResponse::Size(1));
    assert!(
        node.query(&NotaryCommand::claim(vec![], tx("x"), party("alice")))
            .is_err(),
        "Claims cannot be answered locally"
    );

    let local = RaftUniquenessProvider::with_read_mode(Arc::clone(&node), ReadMode::Local);
    assert_eq!(local.size().await.unwrap(), 1);

    node.shutdown().await.expect("Failed to shutdown");
}

/// Test that snapshots are built and that state survives a restart.
#[tokio::test]
async fn test_single_node_snapshot_and_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    {
        let node = start_node(temp_dir.path()).await;
        node.initialize().await.expect("Failed to initialize");
        wait_until_leader(&node).await;

        let provider = RaftUniquenessProvider::new(Arc::clone(&node));
        for i in 0..20 {
            let result = provider
                .commit(vec![state("issue", i)], tx(&format!("move-{i}")), party("alice"))
                .await
                .unwrap();
            assert!(result.is_success());
        }

        node.trigger_snapshot().await.expect("Snapshot trigger");

        let deadline = Instant::now() + Duration::from_secs(5);
        while node.metrics().snapshot.is_none() {
            assert!(Instant::now() < deadline, "Snapshot should be built");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(node.state_machine().current_snapshot_meta().is_some());

        node.shutdown().await.expect("Failed to shutdown");
    }

    let node = start_node(temp_dir.path()).await;
    wait_until_leader(&node).await;

    let provider = RaftUniquenessProvider::new(Arc::clone(&node));
    assert_eq!(provider.size().await.unwrap(), 20);
    assert_eq!(
        provider.get(state("issue", 7)).await.unwrap(),
        Some(ConsumingTransaction::new(tx("move-7"), 0, party("alice")))
    );

    let result = provider
        .commit(vec![state("issue", 7)], tx("double-spend"), party("mallory"))
        .await
        .unwrap();
    assert!(!result.is_success(), "Restarted node must remember claims");

    node.shutdown().await.expect("Failed to shutdown");
}
