//! In-memory [`AccountLedgerBackend`], used by unit tests and by the engine
//! tests in [`crate::engine`].
//!
//! # Limitations
//!
//! Only a single operation is allowed across the entire backend at any
//! given time (one global mutex stands in for the per-row lock a real
//! database would give us). That is enough to prove the engine's dedup and
//! serialization guarantees without a database, but it is not a model for
//! how a production backend should be built — see [`crate::store::postgres`]
//! for that.

use std::collections::HashMap;

use async_trait::async_trait;
use ledger_core::{
    Account, AccountId, AccountType, BalanceOperation, CoreError, CoreResult, OperationId,
    OperationStatus,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::engine::{AccountLedgerBackend, ApplyOperationOutcome, ApplyOperationRequest};

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    operations: HashMap<(OperationId, AccountId), BalanceOperation>,
    next_id: u64,
}

/// In-memory backend implementing the same atomic apply-operation contract
/// a Postgres-backed implementation would.
pub struct InMemoryLedgerBackend {
    state: Mutex<State>,
}

impl InMemoryLedgerBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Seeds an account directly, bypassing the HTTP-facing create flow.
    /// Handy for tests that want to start from a known balance.
    pub async fn seed(&self, account: Account) {
        let mut state = self.state.lock().await;
        state.accounts.insert(account.id.clone(), account);
    }
}

impl Default for InMemoryLedgerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountLedgerBackend for InMemoryLedgerBackend {
    async fn apply_operation(&self, request: ApplyOperationRequest) -> CoreResult<ApplyOperationOutcome> {
        let mut state = self.state.lock().await;
        let key = (request.operation_id.clone(), request.account_id.clone());

        // Step 1: replay.
        if let Some(existing) = state.operations.get(&key) {
            let account = state
                .accounts
                .get(&request.account_id)
                .ok_or_else(|| CoreError::NotFound(format!("account '{}' not found", request.account_id)))?;
            return Ok(ApplyOperationOutcome {
                applied: existing.applied,
                new_balance: existing.resulting_balance,
                version: account.version,
                status: OperationStatus::Replayed,
            });
        }

        // Step 2: "lock" the row (the outer mutex already serializes us).
        let account = state
            .accounts
            .get(&request.account_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("account '{}' not found", request.account_id)))?;

        // Step 3: compute.
        let new_balance = ledger_core::money::normalize(account.balance + request.delta);

        // Step 4: overdraft policy — spec §4.1 step 4 checks the caller's
        // `allow_negative` flag only; `AccountType::permits_negative_balance`
        // is a policy signal for the Orchestrator/Limit Evaluator to decide
        // what to pass in, not something the engine re-derives here.
        if account.would_overdraw(request.delta) && !request.allow_negative {
            let op = BalanceOperation::rejected(
                request.operation_id.clone(),
                request.account_id.clone(),
                request.transaction_id,
                request.delta,
                request.reason.clone(),
                request.allow_negative,
                account.balance,
            );
            state.operations.insert(key, op);
            return Ok(ApplyOperationOutcome {
                applied: false,
                new_balance: account.balance,
                version: account.version,
                status: OperationStatus::Rejected,
            });
        }

        // Step 5: apply.
        let mut updated = account.clone();
        updated.balance = new_balance;
        updated.version += 1;
        state.accounts.insert(request.account_id.clone(), updated.clone());

        let op = BalanceOperation::applied(
            request.operation_id.clone(),
            request.account_id.clone(),
            request.transaction_id,
            request.delta,
            request.reason.clone(),
            request.allow_negative,
            new_balance,
        );
        state.operations.insert(key, op);

        Ok(ApplyOperationOutcome {
            applied: true,
            new_balance,
            version: updated.version,
            status: OperationStatus::Applied,
        })
    }

    async fn get_account(&self, account_id: &AccountId) -> CoreResult<Account> {
        let state = self.state.lock().await;
        state
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("account '{account_id}' not found")))
    }

    async fn create_account(
        &self,
        owner_id: String,
        account_type: AccountType,
        credit_limit: Option<Decimal>,
        interest_rate: Option<Decimal>,
    ) -> CoreResult<Account> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = AccountId::from(format!("acct-{}", state.next_id));
        let mut account = Account::new(id.clone(), owner_id, account_type);
        account.credit_limit = credit_limit;
        account.interest_rate = interest_rate;
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn set_balance(&self, account_id: &AccountId, new_balance: Decimal) -> CoreResult<Account> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| CoreError::NotFound(format!("account '{account_id}' not found")))?;
        account.balance = ledger_core::money::normalize(new_balance);
        account.version += 1;
        Ok(account.clone())
    }
}
