//! Bench command - notarise a batch of dummy transactions.
//!
//! Each transaction spends the single output of a fresh issuance, so every
//! commit should succeed. Re-notarising one of them afterwards must be
//! refused with a conflict naming the original transaction.

use anyhow::{Result, bail};
use notary_core::{CommitResult, Party, SecureHash, StateRef};
use std::time::{Duration, Instant};

/// Outcome of a bench run.
#[derive(Debug)]
pub struct BenchReport {
    /// Transactions notarised.
    pub committed: usize,
    /// Mean latency of a commit.
    pub average: Duration,
    /// Slowest commit.
    pub max: Duration,
    /// Whether the double spend was refused.
    pub double_spend_refused: bool,
}

/// Run the bench command.
pub async fn run(addrs: &[String], count: usize, party: &str) -> Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }
    let client = super::client(addrs)?;
    let party = Party::from_name(party);

    println!("Notarising {count} transactions...");

    let mut first: Option<(StateRef, SecureHash)> = None;
    let mut total = Duration::ZERO;
    let mut max = Duration::ZERO;

    for i in 0..count {
        let input = StateRef::new(SecureHash::random(), 0);
        let tx_id = SecureHash::random();

        let started = Instant::now();
        let result = client.commit(vec![input], tx_id, party.clone()).await?;
        let elapsed = started.elapsed();

        if !result.is_success() {
            bail!("fresh transaction {i} ({tx_id}) was refused");
        }
        total += elapsed;
        max = max.max(elapsed);
        first.get_or_insert((input, tx_id));
        tracing::debug!(i, tx_id = %tx_id.short(), elapsed_ms = elapsed.as_millis() as u64, "notarised");
    }

    let (input, original) = match first {
        Some(first) => first,
        None => bail!("no transactions were notarised"),
    };
    let double_spend = client
        .commit(vec![input], SecureHash::random(), party.clone())
        .await?;
    let double_spend_refused = match &double_spend {
        CommitResult::Success => false,
        CommitResult::Conflict(conflict) => conflict.conflicts_only_with(&original),
    };

    let report = BenchReport {
        committed: count,
        average: total / count as u32,
        max,
        double_spend_refused,
    };

    println!();
    println!("Committed:     {}", report.committed);
    println!("Average:       {:.2} ms", report.average.as_secs_f64() * 1000.0);
    println!("Max:           {:.2} ms", report.max.as_secs_f64() * 1000.0);
    println!(
        "Double spend:  {}",
        if report.double_spend_refused { "refused" } else { "ACCEPTED" }
    );

    if !report.double_spend_refused {
        bail!("re-notarising {input} was not refused");
    }
    Ok(())
}
