//! In-memory [`TransactionRepository`], used by orchestrator and HTTP
//! facade unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{AccountId, CoreError, CoreResult, Transaction, TransactionId, TransactionStatus, TransactionType};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{Page, SearchFilter, SortOrder, TransactionRepository};

#[derive(Default)]
struct State {
    by_id: HashMap<TransactionId, Transaction>,
    // (created_by, type, idempotency_key) -> transaction id, mirroring the
    // unique index the real schema enforces.
    idempotency_index: HashMap<(String, String, String), TransactionId>,
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    state: Mutex<State>,
}

impl InMemoryTransactionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn type_tag(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Transfer => "TRANSFER",
        TransactionType::Deposit => "DEPOSIT",
        TransactionType::Withdrawal => "WITHDRAWAL",
        TransactionType::Reversal => "REVERSAL",
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, transaction: &Transaction) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(key) = &transaction.idempotency_key {
            let index_key = (
                transaction.created_by.clone(),
                type_tag(transaction.transaction_type).to_string(),
                key.clone(),
            );
            if state.idempotency_index.contains_key(&index_key) {
                return Err(CoreError::BusinessRejection(
                    "idempotency key already used for this creator and type".to_string(),
                ));
            }
            state.idempotency_index.insert(index_key, transaction.id);
        }
        state.by_id.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn update(&self, transaction: &Transaction) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.by_id.contains_key(&transaction.id) {
            return Err(CoreError::NotFound(format!("transaction '{}' not found", transaction.id)));
        }
        state.by_id.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> CoreResult<Transaction> {
        let state = self.state.lock().await;
        state
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("transaction '{id}' not found")))
    }

    async fn find_by_idempotency_key(
        &self,
        created_by: &str,
        transaction_type: TransactionType,
        idempotency_key: &str,
    ) -> CoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        let key = (created_by.to_string(), type_tag(transaction_type).to_string(), idempotency_key.to_string());
        Ok(state.idempotency_index.get(&key).and_then(|id| state.by_id.get(id)).cloned())
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: u32,
        size: u32,
        sort: SortOrder,
    ) -> CoreResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let mut matching: Vec<Transaction> = state
            .by_id
            .values()
            .filter(|t| &t.from_account_id == account_id || &t.to_account_id == account_id)
            .cloned()
            .collect();
        sort_transactions(&mut matching, sort);
        Ok(paginate(matching, page, size))
    }

    async fn search(&self, filter: &SearchFilter, page: u32, size: u32) -> CoreResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let mut matching: Vec<Transaction> = state
            .by_id
            .values()
            .filter(|t| matches_filter(t, filter))
            .cloned()
            .collect();
        sort_transactions(&mut matching, SortOrder::CreatedAtDesc);
        Ok(paginate(matching, page, size))
    }

    async fn completed_volume_since(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        since: DateTime<Utc>,
    ) -> CoreResult<Decimal> {
        let state = self.state.lock().await;
        // A deposit's account sits on `to_account_id` (`from_account_id` is
        // the `EXTERNAL` sentinel); every other transaction type books the
        // limited account on `from_account_id`.
        let sum = state
            .by_id
            .values()
            .filter(|t| {
                let booked_account = match transaction_type {
                    TransactionType::Deposit => &t.to_account_id,
                    TransactionType::Transfer | TransactionType::Withdrawal | TransactionType::Reversal => {
                        &t.from_account_id
                    }
                };
                booked_account == account_id
                    && t.transaction_type == transaction_type
                    && t.status == TransactionStatus::Completed
                    && t.created_at >= since
            })
            .map(|t| t.amount)
            .sum();
        Ok(sum)
    }

    async fn find_stuck_processing(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .by_id
            .values()
            .filter(|t| {
                t.status == TransactionStatus::Processing
                    && matches!(
                        t.processing_state,
                        ledger_core::ProcessingState::Initiated | ledger_core::ProcessingState::DebitApplied
                    )
                    && t.created_at < cutoff
            })
            .cloned()
            .collect())
    }
}

fn matches_filter(t: &Transaction, filter: &SearchFilter) -> bool {
    if let Some(account_id) = &filter.account_id {
        if &t.from_account_id != account_id && &t.to_account_id != account_id {
            return false;
        }
    }
    if let Some(transaction_type) = filter.transaction_type {
        if t.transaction_type != transaction_type {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if t.status != status {
            return false;
        }
    }
    if let Some(from_date) = filter.from_date {
        if t.created_at < from_date {
            return false;
        }
    }
    if let Some(to_date) = filter.to_date {
        if t.created_at > to_date {
            return false;
        }
    }
    if let Some(created_by) = &filter.created_by {
        if &t.created_by != created_by {
            return false;
        }
    }
    true
}

fn sort_transactions(transactions: &mut [Transaction], sort: SortOrder) {
    transactions.sort_by(|a, b| match sort {
        SortOrder::CreatedAtAsc => a.created_at.cmp(&b.created_at),
        SortOrder::CreatedAtDesc => b.created_at.cmp(&a.created_at),
    });
}

fn paginate(items: Vec<Transaction>, page: u32, size: u32) -> Page<Transaction> {
    let total_elements = items.len() as u64;
    let start = (page as usize) * (size as usize);
    let content = items.into_iter().skip(start).take(size as usize).collect();
    Page {
        content,
        page,
        size,
        total_elements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{AccountId, ProcessingState};
    use rust_decimal_macros::dec;

    fn sample_transfer(from: &str, to: &str, idempotency_key: Option<&str>) -> Transaction {
        Transaction::new(
            TransactionType::Transfer,
            AccountId::from(from),
            AccountId::from(to),
            dec!(10.00),
            "USD",
            "alice",
            idempotency_key.map(|s| s.to_string()),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let repo = InMemoryTransactionRepository::new();
        let tx = sample_transfer("a1", "a2", Some("key-1"));
        repo.insert(&tx).await.unwrap();
        let other = sample_transfer("a1", "a3", Some("key-1"));
        assert!(repo.insert(&other).await.is_err());
    }

    #[tokio::test]
    async fn finds_by_idempotency_key_scoped_to_creator_and_type() {
        let repo = InMemoryTransactionRepository::new();
        let tx = sample_transfer("a1", "a2", Some("key-2"));
        repo.insert(&tx).await.unwrap();
        let found = repo
            .find_by_idempotency_key("alice", TransactionType::Transfer, "key-2")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, tx.id);
    }

    fn sample_deposit(to: &str, amount: rust_decimal::Decimal) -> Transaction {
        let mut tx = Transaction::new(
            TransactionType::Deposit,
            AccountId::from("EXTERNAL"),
            AccountId::from(to),
            amount,
            "USD",
            "alice",
            None,
            None,
            None,
        );
        tx.status = TransactionStatus::Completed;
        tx
    }

    #[tokio::test]
    async fn completed_volume_since_sums_deposits_by_to_account() {
        let repo = InMemoryTransactionRepository::new();
        repo.insert(&sample_deposit("a1", dec!(40.00))).await.unwrap();
        repo.insert(&sample_deposit("a1", dec!(25.00))).await.unwrap();
        // Different account, must not be counted.
        repo.insert(&sample_deposit("a2", dec!(999.00))).await.unwrap();
        // A completed transfer touching a1 as the destination must not be
        // mistaken for deposit volume either.
        let mut transfer = sample_transfer("a3", "a1", None);
        transfer.status = TransactionStatus::Completed;
        repo.insert(&transfer).await.unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        let volume = repo
            .completed_volume_since(&AccountId::from("a1"), TransactionType::Deposit, since)
            .await
            .unwrap();
        assert_eq!(volume, dec!(65.00));
    }

    #[tokio::test]
    async fn stuck_processing_filters_by_processing_state_and_age() {
        let repo = InMemoryTransactionRepository::new();
        let mut stuck = sample_transfer("a1", "a2", None);
        stuck.status = TransactionStatus::Processing;
        stuck.processing_state = ProcessingState::Initiated;
        stuck.created_at = Utc::now() - chrono::Duration::minutes(10);
        repo.insert(&stuck).await.unwrap();

        let mut fresh = sample_transfer("a1", "a2", None);
        fresh.status = TransactionStatus::Processing;
        fresh.processing_state = ProcessingState::Initiated;
        repo.insert(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        let results = repo.find_stuck_processing(cutoff).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, stuck.id);
    }
}
