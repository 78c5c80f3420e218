//! Recovery sweeper (spec §5): a transaction that crashes mid-orchestration
//! can be left in `INITIATED`/`DEBIT_APPLIED` forever if the process dies
//! before `run_transfer_legs`/`run_reversal_legs` reaches a terminal state.
//! This polls for such rows and fails them outright rather than leaving them
//! stuck — the debit leg (if any) is left in place for manual reconciliation,
//! matching spec §5's stance that automatic compensation long after the fact
//! is riskier than a human looking at it.

use std::time::Duration;

use chrono::Utc;
use ledger_core::{TransactionStatus, TransactionType};

use crate::observer::Observer;
use crate::store::SharedTransactionRepository;

/// How old a `PROCESSING` row has to be before the sweeper considers it
/// stuck (spec §5 default).
pub const STUCK_AFTER: chrono::Duration = chrono::Duration::minutes(5);

/// How often the sweeper polls the store.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs forever, polling every [`SWEEP_INTERVAL`]. Intended to be spawned
/// once at process startup via `tokio::spawn`; it never returns under normal
/// operation, so nothing awaits its `JoinHandle`.
pub async fn run<O: Observer>(store: SharedTransactionRepository, observer: O) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(err) = sweep_once(&store, &observer).await {
            tracing::warn!(error = %err, "sweep pass failed, will retry next interval");
        }
    }
}

async fn sweep_once<O: Observer>(store: &SharedTransactionRepository, observer: &O) -> ledger_core::CoreResult<()> {
    let cutoff = Utc::now() - STUCK_AFTER;
    let stuck = store.find_stuck_processing(cutoff).await?;
    if stuck.is_empty() {
        return Ok(());
    }
    tracing::warn!(count = stuck.len(), "sweeping stuck PROCESSING transactions");
    for mut transaction in stuck {
        transaction.status = TransactionStatus::Failed;
        match store.update(&transaction).await {
            Ok(()) => {
                observer.manual_action_required(transaction.id);
                tracing::error!(
                    transaction_id = %transaction.id,
                    transaction_type = ?transaction.transaction_type,
                    processing_state = ?transaction.processing_state,
                    "stuck transaction marked FAILED, debit leg (if any) left for manual reconciliation"
                );
            }
            Err(err) => {
                tracing::warn!(transaction_id = %transaction.id, error = %err, "failed to update stuck transaction, will retry next sweep");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use crate::store::memory::InMemoryTransactionRepository;
    use crate::store::TransactionRepository;
    use ledger_core::{AccountId, ProcessingState, Transaction};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn sweep_fails_stuck_initiated_transactions() {
        let store: SharedTransactionRepository = Arc::new(InMemoryTransactionRepository::new());
        let mut stuck = Transaction::new(
            TransactionType::Transfer,
            AccountId::from("a1"),
            AccountId::from("a2"),
            dec!(10.00),
            "USD",
            "alice",
            None,
            None,
            None,
        );
        stuck.status = TransactionStatus::Processing;
        stuck.processing_state = ProcessingState::DebitApplied;
        stuck.created_at = Utc::now() - chrono::Duration::minutes(10);
        store.insert(&stuck).await.unwrap();

        sweep_once(&store, &NoopObserver).await.unwrap();

        let reloaded = store.get(stuck.id).await.unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_processing_transactions_alone() {
        let store: SharedTransactionRepository = Arc::new(InMemoryTransactionRepository::new());
        let mut fresh = Transaction::new(
            TransactionType::Deposit,
            AccountId::from("EXTERNAL"),
            AccountId::from("a2"),
            dec!(10.00),
            "USD",
            "alice",
            None,
            None,
            None,
        );
        fresh.status = TransactionStatus::Processing;
        fresh.processing_state = ProcessingState::Initiated;
        store.insert(&fresh).await.unwrap();

        sweep_once(&store, &NoopObserver).await.unwrap();

        let reloaded = store.get(fresh.id).await.unwrap();
        assert_eq!(reloaded.status, TransactionStatus::Processing);
    }
}
