//! The Balance Engine (spec §4.1): the single entry point for balance
//! mutations. Row-level serialization, per-`(operation_id, account_id)`
//! deduplication, overdraft policy, and result memoization all live here.

use async_trait::async_trait;
use ledger_core::{
    Account, AccountId, CoreError, CoreResult, OperationId, OperationStatus, TransactionId,
};
use rust_decimal::Decimal;

/// Everything the engine needs to apply one balance operation.
#[derive(Debug, Clone)]
pub struct ApplyOperationRequest {
    pub account_id: AccountId,
    pub operation_id: OperationId,
    pub delta: Decimal,
    pub transaction_id: Option<TransactionId>,
    pub reason: String,
    pub allow_negative: bool,
}

/// The engine's response: spec §6's
/// `{accountId, operationId, applied, newBalance, version, status}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOperationOutcome {
    pub applied: bool,
    pub new_balance: Decimal,
    pub version: u64,
    pub status: OperationStatus,
}

/// Storage backend capable of running the Balance Engine's protocol as one
/// atomic unit (spec §4.1: "under one database transaction").
///
/// Implementations own the row lock / compare-and-swap strategy (spec §9:
/// `SELECT ... FOR UPDATE` for Postgres, or a per-account serialization
/// token for stores without pessimistic locking) — the engine itself never
/// reasons about locking, only about the five numbered steps.
#[async_trait]
pub trait AccountLedgerBackend: Send + Sync {
    /// Runs the full apply-operation protocol (spec §4.1 steps 1-5)
    /// atomically against a single account.
    async fn apply_operation(&self, request: ApplyOperationRequest) -> CoreResult<ApplyOperationOutcome>;

    /// Fetches an account by id.
    async fn get_account(&self, account_id: &AccountId) -> CoreResult<Account>;

    /// Creates a new account (Account HTTP Facade's create endpoint).
    async fn create_account(
        &self,
        owner_id: String,
        account_type: ledger_core::AccountType,
        credit_limit: Option<Decimal>,
        interest_rate: Option<Decimal>,
    ) -> CoreResult<Account>;

    /// Privileged, direct balance write (PUT-balance). Bypasses the
    /// operation log entirely; callers are expected to be privileged
    /// principals only — the engine does not check authorization (spec
    /// §4.1: "No authorization is performed here").
    async fn set_balance(&self, account_id: &AccountId, new_balance: Decimal) -> CoreResult<Account>;
}

/// The Balance Engine: validates the operation shape, then delegates the
/// atomic protocol to an [`AccountLedgerBackend`].
pub struct BalanceEngine<B: AccountLedgerBackend> {
    backend: B,
}

impl<B: AccountLedgerBackend> BalanceEngine<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Applies a single balance operation.
    ///
    /// Validates `INVALID_DELTA` up front (zero is fine; a delta with a
    /// finer-than-cents scale is rejected) before delegating the
    /// lock-dedup-write protocol to the backend.
    pub async fn apply(&self, request: ApplyOperationRequest) -> CoreResult<ApplyOperationOutcome> {
        if !ledger_core::money::has_valid_scale(request.delta) {
            return Err(CoreError::Validation(format!(
                "delta {} has finer precision than the ledger's scale-2 money representation",
                request.delta
            )));
        }
        self.backend.apply_operation(request).await
    }

    pub async fn get_account(&self, account_id: &AccountId) -> CoreResult<Account> {
        self.backend.get_account(account_id).await
    }

    pub async fn create_account(
        &self,
        owner_id: String,
        account_type: ledger_core::AccountType,
        credit_limit: Option<Decimal>,
        interest_rate: Option<Decimal>,
    ) -> CoreResult<Account> {
        self.backend
            .create_account(owner_id, account_type, credit_limit, interest_rate)
            .await
    }

    pub async fn set_balance(&self, account_id: &AccountId, new_balance: Decimal) -> CoreResult<Account> {
        self.backend.set_balance(account_id, new_balance).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryLedgerBackend;
    use rust_decimal_macros::dec;

    fn engine() -> BalanceEngine<InMemoryLedgerBackend> {
        BalanceEngine::new(InMemoryLedgerBackend::new())
    }

    async fn seeded(balance: Decimal) -> (BalanceEngine<InMemoryLedgerBackend>, AccountId) {
        let engine = engine();
        let account = engine
            .create_account("alice".to_string(), ledger_core::AccountType::Checking, None, None)
            .await
            .unwrap();
        if balance != Decimal::ZERO {
            engine.backend.set_balance(&account.id, balance).await.unwrap();
        }
        (engine, account.id)
    }

    #[tokio::test]
    async fn idempotent_debit_replays_identical_outcome() {
        let (engine, account_id) = seeded(dec!(100.00)).await;
        let req = ApplyOperationRequest {
            account_id: account_id.clone(),
            operation_id: OperationId::new("op-1"),
            delta: dec!(-30.00),
            transaction_id: None,
            reason: "test".to_string(),
            allow_negative: false,
        };
        let first = engine.apply(req.clone()).await.unwrap();
        assert!(first.applied);
        assert_eq!(first.new_balance, dec!(70.00));
        assert_eq!(first.status, OperationStatus::Applied);

        let second = engine.apply(req).await.unwrap();
        assert!(second.applied);
        assert_eq!(second.new_balance, dec!(70.00));
        assert_eq!(second.status, OperationStatus::Replayed);

        let account = engine.get_account(&account_id).await.unwrap();
        assert_eq!(account.balance, dec!(70.00));
        assert_eq!(account.version, 1);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_without_mutating_balance() {
        let (engine, account_id) = seeded(dec!(10.00)).await;
        let outcome = engine
            .apply(ApplyOperationRequest {
                account_id: account_id.clone(),
                operation_id: OperationId::new("op-2"),
                delta: dec!(-50.00),
                transaction_id: None,
                reason: "test".to_string(),
                allow_negative: false,
            })
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.new_balance, dec!(10.00));
        assert_eq!(outcome.status, OperationStatus::Rejected);

        let account = engine.get_account(&account_id).await.unwrap();
        assert_eq!(account.balance, dec!(10.00));
    }

    #[tokio::test]
    async fn allow_negative_permits_overdraft() {
        let (engine, account_id) = seeded(dec!(10.00)).await;
        let outcome = engine
            .apply(ApplyOperationRequest {
                account_id,
                operation_id: OperationId::new("op-3"),
                delta: dec!(-50.00),
                transaction_id: None,
                reason: "test".to_string(),
                allow_negative: true,
            })
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.new_balance, dec!(-40.00));
    }

    #[tokio::test]
    async fn invalid_delta_scale_is_rejected_before_touching_storage() {
        let (engine, account_id) = seeded(dec!(10.00)).await;
        let result = engine
            .apply(ApplyOperationRequest {
                account_id,
                operation_id: OperationId::new("op-4"),
                delta: dec!(-0.005),
                transaction_id: None,
                reason: "test".to_string(),
                allow_negative: true,
            })
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let engine = engine();
        let result = engine
            .apply(ApplyOperationRequest {
                account_id: AccountId::from("does-not-exist"),
                operation_id: OperationId::new("op-5"),
                delta: dec!(1.00),
                transaction_id: None,
                reason: "test".to_string(),
                allow_negative: true,
            })
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_same_account_debits_serialize_and_all_succeed() {
        use std::sync::Arc;

        let (engine, account_id) = seeded(dec!(100.00)).await;
        let engine = Arc::new(engine);
        let mut handles = Vec::new();
        for i in 0..100 {
            let engine = Arc::clone(&engine);
            let account_id = account_id.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .apply(ApplyOperationRequest {
                        account_id,
                        operation_id: OperationId::new(format!("concurrent-{i}")),
                        delta: dec!(-1.00),
                        transaction_id: None,
                        reason: "concurrent".to_string(),
                        allow_negative: false,
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut applied_count = 0;
        for handle in handles {
            if handle.await.unwrap().applied {
                applied_count += 1;
            }
        }
        assert_eq!(applied_count, 100);
        let account = engine.get_account(&account_id).await.unwrap();
        assert_eq!(account.balance, dec!(0.00));
        assert_eq!(account.version, 100);
    }
}
