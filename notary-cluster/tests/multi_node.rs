//! Multi-node cluster tests.
//!
//! Claims committed anywhere in the cluster end up applied, in the same
//! order, on every replica.

mod common;

use common::{TestCluster, party, state, tx};
use notary_cluster::{NotaryClient, RaftUniquenessProvider, RetryPolicy};
use notary_core::{CommitResult, ConsumingTransaction, NotaryCommand, NotaryResponse, UniquenessProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn snapshot_bytes(cluster: &TestCluster, index: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    cluster.nodes[index]
        .state_machine()
        .machine()
        .take_snapshot(&mut bytes)
        .expect("Snapshot should be taken");
    bytes
}

/// Test that a 3-node cluster can start and elect a leader.
#[tokio::test]
async fn test_multi_node_leader_election() {
    let cluster = TestCluster::new(3).await;
    cluster.initialize().await;
    cluster.add_all_nodes().await;

    let leader = cluster
        .wait_for_leader(3000)
        .await
        .expect("Should elect a leader");
    assert_eq!(leader, 1, "First node should be leader after initialize");

    cluster.wait_for_convergence().await;

    for (i, node) in cluster.nodes.iter().enumerate() {
        let node_leader = node.leader().await;
        assert_eq!(
            node_leader,
            Some(1),
            "Node {} should agree on leader, got {:?}",
            i + 1,
            node_leader
        );
        let voters = node.metrics().membership_config.voter_ids().count();
        assert_eq!(voters, 3, "Node {} should see 3 voters", i + 1);
    }

    cluster.shutdown().await;
}

/// Test that claims are replicated to every node.
#[tokio::test]
async fn test_multi_node_replication() {
    let cluster = TestCluster::new(3).await;
    cluster.initialize().await;
    cluster.add_all_nodes().await;

    let provider = RaftUniquenessProvider::new(Arc::clone(&cluster.nodes[0]));
    for i in 0..10 {
        let result = provider
            .commit(vec![state("issue", i)], tx(&format!("move-{i}")), party("alice"))
            .await
            .expect("Commit should work");
        assert_eq!(result, CommitResult::Success);
    }
    let result = provider
        .commit(vec![state("issue", 3)], tx("double-spend"), party("mallory"))
        .await
        .unwrap();
    assert!(!result.is_success());

    cluster.wait_for_convergence().await;

    for (i, node) in cluster.nodes.iter().enumerate() {
        assert_eq!(
            node.query(&NotaryCommand::Size).unwrap(),
            NotaryResponse::Size(10),
            "Node {} should hold every claim",
            i + 1
        );
        assert_eq!(
            node.query(&NotaryCommand::Get { key: state("issue", 3) }).unwrap(),
            NotaryResponse::Value(Some(ConsumingTransaction::new(
                tx("move-3"),
                0,
                party("alice")
            ))),
            "Node {} should record the first claim",
            i + 1
        );
    }

    let leader_bytes = snapshot_bytes(&cluster, 0);
    for i in 1..cluster.nodes.len() {
        assert_eq!(snapshot_bytes(&cluster, i), leader_bytes, "Replicas must be identical");
    }

    cluster.shutdown().await;
}

/// Test leader forwarding - commands sent to followers are forwarded.
#[tokio::test]
async fn test_multi_node_leader_forwarding() {
    let cluster = TestCluster::new(3).await;
    cluster.initialize().await;
    cluster.add_all_nodes().await;
    cluster.wait_for_convergence().await;

    let follower = RaftUniquenessProvider::new(Arc::clone(&cluster.nodes[1]));
    let result = follower
        .commit(vec![state("issue", 0)], tx("forwarded"), party("bob"))
        .await
        .expect("Commit via follower should work");
    assert_eq!(result, CommitResult::Success);

    let other = RaftUniquenessProvider::new(Arc::clone(&cluster.nodes[2]));
    let result = other
        .commit(vec![state("issue", 0)], tx("late"), party("carol"))
        .await
        .expect("Commit via follower should work");
    assert!(result.conflict().unwrap().state_history.contains_key(&state("issue", 0)));

    cluster.wait_for_convergence().await;

    for (i, node) in cluster.nodes.iter().enumerate() {
        assert_eq!(
            node.query(&NotaryCommand::Size).unwrap(),
            NotaryResponse::Size(1),
            "Node {} should have the forwarded claim",
            i + 1
        );
    }

    cluster.shutdown().await;
}

/// Test that a replica joining after log compaction is bootstrapped from a
/// snapshot.
#[tokio::test]
async fn test_multi_node_snapshot_bootstrap() {
    let cluster = TestCluster::new(3).await;
    cluster.initialize().await;

    let provider = RaftUniquenessProvider::new(Arc::clone(&cluster.nodes[0]));
    for i in 0..60 {
        let result = provider
            .commit(
                vec![state("issue", i), state("issue", i + 1000)],
                tx(&format!("move-{i}")),
                party("alice"),
            )
            .await
            .unwrap();
        assert!(result.is_success());
    }

    let leader = &cluster.nodes[0];
    leader.trigger_snapshot().await.expect("Snapshot trigger");
    let last_applied = leader.metrics().last_applied.expect("Entries applied").index;
    let deadline = Instant::now() + Duration::from_secs(5);
    while leader
        .metrics()
        .purged
        .is_none_or(|purged| purged.index < last_applied)
    {
        assert!(Instant::now() < deadline, "Log should be compacted");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    cluster.add_all_nodes().await;
    cluster.wait_for_convergence().await;

    let leader_bytes = snapshot_bytes(&cluster, 0);
    for i in 1..cluster.nodes.len() {
        let node = &cluster.nodes[i];
        assert_eq!(
            node.query(&NotaryCommand::Size).unwrap(),
            NotaryResponse::Size(120),
            "Node {} should be bootstrapped",
            i + 1
        );
        assert!(
            node.state_machine().current_snapshot_meta().is_some(),
            "Node {} should keep the installed snapshot",
            i + 1
        );
        assert_eq!(snapshot_bytes(&cluster, i), leader_bytes);
    }

    cluster.shutdown().await;
}

/// Test cluster metrics.
#[tokio::test]
async fn test_multi_node_metrics() {
    let cluster = TestCluster::new(3).await;
    cluster.initialize().await;
    cluster.add_all_nodes().await;
    cluster.wait_for_convergence().await;

    let leader_metrics = cluster.nodes[0].metrics();
    assert_eq!(leader_metrics.state, openraft::ServerState::Leader);
    assert_eq!(leader_metrics.current_leader, Some(1));

    for i in 1..cluster.nodes.len() {
        let metrics = cluster.nodes[i].metrics();
        assert_eq!(
            metrics.state,
            openraft::ServerState::Follower,
            "Node {} should be follower",
            i + 1
        );
        assert_eq!(metrics.current_leader, Some(1));
    }

    cluster.shutdown().await;
}

/// Test the gRPC client against a running cluster.
#[tokio::test]
async fn test_multi_node_client() {
    let cluster = TestCluster::new(3).await;
    cluster.initialize().await;
    cluster.add_all_nodes().await;
    cluster.wait_for_convergence().await;

    // Point the client at a follower first so it has to follow the hint.
    let client = NotaryClient::new([cluster.addresses[2].clone(), cluster.addresses[0].clone()])
        .expect("Client")
        .with_retry_policy(RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 20,
            max_backoff_ms: 200,
        });

    let result = client
        .commit(vec![state("issue", 0), state("issue", 1)], tx("move"), party("alice"))
        .await
        .expect("Commit should work");
    assert_eq!(result, CommitResult::Success);

    let result = UniquenessProvider::commit(
        &client,
        vec![state("issue", 1)],
        tx("double-spend"),
        party("mallory"),
    )
    .await
    .expect("Commit should work");
    let conflict = result.conflict().expect("Should conflict");
    assert!(conflict.conflicts_only_with(&tx("move")));

    assert_eq!(client.size().await.unwrap(), 2);
    assert_eq!(
        client.get(state("issue", 1)).await.unwrap(),
        Some(ConsumingTransaction::new(tx("move"), 1, party("alice")))
    );

    cluster.wait_for_convergence().await;
    assert_eq!(
        client
            .get_local(&cluster.addresses[1], state("issue", 0))
            .await
            .unwrap()
            .map(|c| c.id),
        Some(tx("move"))
    );

    let status = client.status(Some(&cluster.addresses[0])).await.unwrap();
    assert_eq!(status.state, "leader");
    assert_eq!(status.members.len(), 3);
    assert!(status.members.iter().all(|m| m.is_voter));

    cluster.shutdown().await;
}
