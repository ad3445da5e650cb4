//! End-to-end behaviour of the single-node provider.

use notary_core::{
    CommitResult, ConsumingTransaction, NotaryError, Party, PersistentUniquenessProvider,
    SecureHash, StateRef, UniquenessProvider,
};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn open_provider() -> (TempDir, PersistentUniquenessProvider) {
    let temp_dir = TempDir::new().unwrap();
    let provider = PersistentUniquenessProvider::open(temp_dir.path().join("notary.redb")).unwrap();
    (temp_dir, provider)
}

fn issued(tx: &str, index: u32) -> StateRef {
    StateRef::new(SecureHash::sha256(tx), index)
}

#[tokio::test]
async fn test_fresh_commit_then_lookup() {
    let (_dir, provider) = open_provider();
    let h1 = SecureHash::sha256("h1");
    let alice = Party::from_name("alice");

    let result = provider
        .commit(vec![issued("issue", 0), issued("issue", 1)], h1, alice.clone())
        .await
        .unwrap();

    assert_eq!(result, CommitResult::Success);
    assert_eq!(provider.size().await.unwrap(), 2);
    assert_eq!(
        provider.get(issued("issue", 1)).await.unwrap(),
        Some(ConsumingTransaction::new(h1, 1, alice))
    );
}

#[tokio::test]
async fn test_double_spend_is_rejected() {
    let (_dir, provider) = open_provider();
    let alice = Party::from_name("alice");
    let bob = Party::from_name("bob");
    let a = issued("issue", 0);
    let c = issued("issue", 2);

    provider
        .commit(vec![a], SecureHash::sha256("h1"), alice.clone())
        .await
        .unwrap();
    let result = provider
        .commit(vec![a, c], SecureHash::sha256("h2"), bob)
        .await
        .unwrap();

    let conflict = result.into_result().unwrap_err();
    assert_eq!(conflict.state_history.len(), 1);
    assert_eq!(
        conflict.state_history[&a],
        ConsumingTransaction::new(SecureHash::sha256("h1"), 0, alice)
    );
    assert_eq!(provider.get(c).await.unwrap(), None);
    assert_eq!(provider.size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_retry_is_recognisable() {
    let (_dir, provider) = open_provider();
    let h1 = SecureHash::sha256("h1");
    let inputs = vec![issued("issue", 0), issued("issue", 1)];

    provider
        .commit(inputs.clone(), h1, Party::from_name("alice"))
        .await
        .unwrap();
    let retry = provider
        .commit(inputs.clone(), h1, Party::from_name("alice"))
        .await
        .unwrap();

    let conflict = retry.conflict().unwrap();
    assert!(conflict.conflicts_only_with(&h1));
    for (position, input) in inputs.iter().enumerate() {
        assert_eq!(
            conflict.state_history[input],
            ConsumingTransaction::new(h1, position as u32, Party::from_name("alice"))
        );
    }
    assert_eq!(provider.size().await.unwrap(), 2);
}

#[tokio::test]
async fn test_commits_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notary.redb");
    let a = issued("issue", 0);

    {
        let provider = PersistentUniquenessProvider::open(&path).unwrap();
        provider
            .commit(vec![a], SecureHash::sha256("h1"), Party::from_name("alice"))
            .await
            .unwrap();
    }

    let provider = PersistentUniquenessProvider::open(&path).unwrap();
    let result = provider
        .commit(vec![a], SecureHash::sha256("h2"), Party::from_name("bob"))
        .await
        .unwrap();
    assert!(!result.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disjoint_commits_all_succeed() {
    let (_dir, provider) = open_provider();
    let provider = Arc::new(provider);

    let mut handles = Vec::new();
    for n in 0..100u32 {
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            let inputs = vec![issued(&format!("issue-{n}"), 0), issued(&format!("issue-{n}"), 1)];
            provider
                .commit(inputs, SecureHash::sha256(format!("tx-{n}")), Party::from_name("alice"))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_success());
    }

    assert_eq!(provider.size().await.unwrap(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overlapping_commits_have_one_winner() {
    let (_dir, provider) = open_provider();
    let provider = Arc::new(provider);
    let contested = issued("issue", 0);

    let mut handles = Vec::new();
    for n in 0..16u32 {
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            let tx = SecureHash::sha256(format!("tx-{n}"));
            let result = provider
                .commit(vec![contested, issued(&format!("own-{n}"), 0)], tx, Party::from_name("alice"))
                .await?;
            Ok::<_, NotaryError>((tx, result))
        }));
    }

    let mut winners = HashSet::new();
    for handle in handles {
        let (tx, result) = handle.await.unwrap().unwrap();
        if result.is_success() {
            winners.insert(tx);
        }
    }

    assert_eq!(winners.len(), 1);
    let owner = provider.get(contested).await.unwrap().unwrap();
    assert!(winners.contains(&owner.id));
    assert_eq!(provider.size().await.unwrap(), 2);
}
