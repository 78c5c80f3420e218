//! The Transaction Orchestrator (spec §4.2): the heart of the core. Drives
//! a transaction from `INITIATED` to a terminal state, owns the
//! two-leg-plus-compensation state machine, and is the only writer of the
//! Transaction Store.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use ledger_core::{
    is_external, AccountId, CoreError, CoreResult, Principal, ProcessingState, Transaction, TransactionId,
    TransactionStatus, TransactionType,
};
use rust_decimal::Decimal;

use crate::cache::HistoryCache;
use crate::client::{ClientError, ResilientAccountClient};
use crate::limits::{LimitDenial, LimitEvaluator};
use crate::observer::Observer;
use crate::store::{SharedTransactionRepository, TransactionRepository};

/// The reversal window from spec §4.2.4: a completed transaction can be
/// reversed for 30 days after `created_at`.
pub const REVERSAL_WINDOW: ChronoDuration = ChronoDuration::days(30);

/// An [`CoreError`] plus, where one was created before the failure, the
/// transaction id it happened against — spec §7's user-visible shape
/// carries an optional `transactionId` precisely for this.
#[derive(Debug, Clone)]
pub struct OrchestratorError {
    pub core: CoreError,
    pub transaction_id: Option<TransactionId>,
}

impl OrchestratorError {
    fn new(core: CoreError) -> Self {
        Self {
            core,
            transaction_id: None,
        }
    }

    fn with_transaction(core: CoreError, id: TransactionId) -> Self {
        Self {
            core,
            transaction_id: Some(id),
        }
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(core: CoreError) -> Self {
        Self::new(core)
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SingleLegRequest {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReverseRequest {
    pub original_transaction_id: TransactionId,
    pub reason: String,
    pub idempotency_key: Option<String>,
}

/// Drives transfers, deposits, withdrawals and reversals. Holds everything
/// needed to do so: the store it exclusively writes, the resilient client
/// it's the only caller of, the limit evaluator, the cache it invalidates
/// on every write, and an [`Observer`] for cross-cutting concerns.
pub struct TransactionOrchestrator<O: Observer> {
    store: SharedTransactionRepository,
    account_client: Arc<ResilientAccountClient>,
    limits: Arc<LimitEvaluator<SharedTransactionRepository>>,
    cache: Arc<HistoryCache>,
    observer: O,
}

impl<O: Observer + Clone + 'static> TransactionOrchestrator<O> {
    pub fn new(
        store: SharedTransactionRepository,
        account_client: Arc<ResilientAccountClient>,
        limits: Arc<LimitEvaluator<SharedTransactionRepository>>,
        cache: Arc<HistoryCache>,
        observer: O,
    ) -> Self {
        Self {
            store,
            account_client,
            limits,
            cache,
            observer,
        }
    }

    fn require_created_by(created_by: &str) -> CoreResult<()> {
        // SPEC_FULL.md §3 Open Question #2: an unauthenticated/empty
        // `created_by` is rejected here rather than let through to a
        // degenerate idempotency lookup.
        if created_by.trim().is_empty() {
            return Err(CoreError::Validation("created_by must be a non-empty authenticated principal".to_string()));
        }
        Ok(())
    }

    async fn check_idempotency(
        &self,
        created_by: &str,
        transaction_type: TransactionType,
        key: Option<&str>,
    ) -> CoreResult<Option<Transaction>> {
        let Some(key) = key else { return Ok(None) };
        if key.is_empty() || key.len() > 255 {
            return Err(CoreError::Validation("idempotencyKey must be 1-255 characters".to_string()));
        }
        self.store.find_by_idempotency_key(created_by, transaction_type, key).await
    }

    /// Runs the Limit Evaluator and maps a denial to the wire-level
    /// `BUSINESS_REJECTION` category.
    async fn check_limit(
        &self,
        account_id: &AccountId,
        account_type: ledger_core::AccountType,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> CoreResult<()> {
        match self.limits.check(account_id, account_type, transaction_type, amount).await? {
            Ok(()) => Ok(()),
            Err(denial) => {
                let message = limit_denial_message(&denial);
                self.observer.precheck_aborted(&message);
                Err(CoreError::BusinessRejection(message))
            }
        }
    }

    // ---- transfer ----------------------------------------------------

    pub async fn transfer(&self, principal: &Principal, req: TransferRequest) -> OrchestratorResult<Transaction> {
        Self::require_created_by(&principal.name)?;
        if let Some(existing) = self
            .check_idempotency(&principal.name, TransactionType::Transfer, req.idempotency_key.as_deref())
            .await?
        {
            return Ok(existing);
        }
        if is_external(req.from_account_id.as_str()) || is_external(req.to_account_id.as_str()) {
            return Err(CoreError::Validation(
                "transfer requires two real accounts; use deposit/withdrawal for EXTERNAL".to_string(),
            )
            .into());
        }
        if req.from_account_id == req.to_account_id {
            return Err(CoreError::Validation("cannot transfer an account to itself".to_string()).into());
        }
        if req.amount <= Decimal::ZERO {
            return Err(CoreError::Validation("amount must be positive".to_string()).into());
        }

        let from_account = self
            .account_client
            .get_account(&req.from_account_id)
            .await
            .map_err(map_precheck_client_error)?;
        if !principal.may_act_as(&from_account.owner_id) {
            self.observer.precheck_aborted("caller does not own the source account");
            return Err(CoreError::Forbidden("caller does not own the source account".to_string()).into());
        }
        self.check_limit(&req.from_account_id, from_account.account_type, TransactionType::Transfer, req.amount)
            .await?;
        if from_account.balance < req.amount && !from_account.account_type.permits_negative_balance() {
            self.observer.precheck_aborted("insufficient funds");
            return Err(CoreError::BusinessRejection("insufficient funds".to_string()).into());
        }

        let mut transaction = Transaction::new(
            TransactionType::Transfer,
            req.from_account_id.clone(),
            req.to_account_id.clone(),
            req.amount,
            req.currency,
            principal.name.clone(),
            req.idempotency_key,
            req.description,
            req.reference,
        );
        transaction.status = TransactionStatus::Processing;
        self.store.insert(&transaction).await?;
        self.observer.transaction_created(transaction.id, TransactionType::Transfer);

        let store = Arc::clone(&self.store);
        let client = Arc::clone(&self.account_client);
        let cache = Arc::clone(&self.cache);
        let observer = self.observer.clone();
        let handle = tokio::spawn(run_transfer_legs(store, client, cache, observer, transaction));
        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(OrchestratorError::new(CoreError::Internal(format!(
                "transfer orchestration task panicked: {join_err}"
            )))),
        }
    }

    // ---- deposit / withdrawal -----------------------------------------

    pub async fn deposit(&self, principal: &Principal, req: SingleLegRequest) -> OrchestratorResult<Transaction> {
        self.single_leg(
            principal,
            req,
            TransactionType::Deposit,
            AccountId::from(ledger_core::EXTERNAL_SENTINEL),
            true,
            "deposit",
        )
        .await
    }

    pub async fn withdrawal(&self, principal: &Principal, req: SingleLegRequest) -> OrchestratorResult<Transaction> {
        self.single_leg(
            principal,
            req,
            TransactionType::Withdrawal,
            AccountId::from(ledger_core::EXTERNAL_SENTINEL),
            false,
            "withdrawal",
        )
        .await
    }

    async fn single_leg(
        &self,
        principal: &Principal,
        req: SingleLegRequest,
        transaction_type: TransactionType,
        external: AccountId,
        allow_negative: bool,
        leg: &'static str,
    ) -> OrchestratorResult<Transaction> {
        Self::require_created_by(&principal.name)?;
        if let Some(existing) = self
            .check_idempotency(&principal.name, transaction_type, req.idempotency_key.as_deref())
            .await?
        {
            return Ok(existing);
        }
        if req.amount <= Decimal::ZERO {
            return Err(CoreError::Validation("amount must be positive".to_string()).into());
        }

        let account = self.account_client.get_account(&req.account_id).await.map_err(map_precheck_client_error)?;
        if !principal.may_act_as(&account.owner_id) {
            self.observer.precheck_aborted("caller does not own the account");
            return Err(CoreError::Forbidden("caller does not own the account".to_string()).into());
        }
        self.check_limit(&req.account_id, account.account_type, transaction_type, req.amount).await?;
        if !allow_negative && account.balance < req.amount && !account.account_type.permits_negative_balance() {
            self.observer.precheck_aborted("insufficient funds");
            return Err(CoreError::BusinessRejection("insufficient funds".to_string()).into());
        }

        let (from_account_id, to_account_id) = if transaction_type == TransactionType::Deposit {
            (external, req.account_id.clone())
        } else {
            (req.account_id.clone(), external)
        };

        let mut transaction = Transaction::new(
            transaction_type,
            from_account_id,
            to_account_id,
            req.amount,
            req.currency,
            principal.name.clone(),
            req.idempotency_key,
            req.description,
            req.reference,
        );
        transaction.status = TransactionStatus::Processing;
        self.store.insert(&transaction).await?;
        self.observer.transaction_created(transaction.id, transaction_type);

        let delta = if transaction_type == TransactionType::Deposit { req.amount } else { -req.amount };
        let outcome = self
            .account_client
            .apply_balance_operation(&req.account_id, &ledger_core::OperationId::for_leg(&transaction.id, leg), delta, Some(transaction.id), leg, allow_negative)
            .await;

        match outcome {
            Ok(result) if result.applied => {
                self.observer.leg_applied(transaction.id, leg);
                if transaction_type == TransactionType::Deposit {
                    transaction.to_balance_before = Some(result.new_balance - req.amount);
                    transaction.to_balance_after = Some(result.new_balance);
                } else {
                    transaction.from_balance_before = Some(result.new_balance + req.amount);
                    transaction.from_balance_after = Some(result.new_balance);
                }
                transaction.status = TransactionStatus::Completed;
                transaction.processing_state = ProcessingState::Completed;
                transaction.processed_at = Some(Utc::now());
                self.store.update(&transaction).await?;
                self.cache.invalidate_all().await;
                Ok(transaction)
            }
            Ok(_rejected) => {
                self.observer.leg_rejected(transaction.id, leg, "insufficient funds");
                transaction.status = TransactionStatus::Failed;
                self.store.update(&transaction).await?;
                self.cache.invalidate_all().await;
                Err(OrchestratorError::with_transaction(
                    CoreError::BusinessRejection("insufficient funds".to_string()),
                    transaction.id,
                ))
            }
            Err(client_err) => {
                transaction.status = TransactionStatus::Failed;
                self.store.update(&transaction).await?;
                self.cache.invalidate_all().await;
                Err(OrchestratorError::with_transaction(map_client_error(client_err), transaction.id))
            }
        }
    }

    // ---- reverse -------------------------------------------------------

    pub async fn reverse(&self, principal: &Principal, req: ReverseRequest) -> OrchestratorResult<Transaction> {
        Self::require_created_by(&principal.name)?;
        if let Some(existing) = self
            .check_idempotency(&principal.name, TransactionType::Reversal, req.idempotency_key.as_deref())
            .await?
        {
            return Ok(existing);
        }

        let original = self
            .store
            .get(req.original_transaction_id)
            .await
            .map_err(|_| CoreError::NotFound(format!("transaction '{}' not found", req.original_transaction_id)))?;

        if !principal.is_privileged() && principal.name != original.created_by {
            self.observer.precheck_aborted("caller did not originate this transaction");
            return Err(CoreError::Forbidden("caller did not originate this transaction".to_string()).into());
        }
        if original.status != TransactionStatus::Completed {
            self.observer.precheck_aborted("INVALID_STATE: only a completed transaction can be reversed");
            return Err(CoreError::BusinessRejection("INVALID_STATE: only a completed transaction can be reversed".to_string()).into());
        }
        if !Transaction::is_reversible_type(original.transaction_type) {
            self.observer.precheck_aborted("CANNOT_REVERSE_REVERSAL");
            return Err(CoreError::BusinessRejection("CANNOT_REVERSE_REVERSAL".to_string()).into());
        }
        if Utc::now() - original.created_at > REVERSAL_WINDOW {
            self.observer.precheck_aborted("REVERSAL_WINDOW_EXPIRED");
            return Err(CoreError::BusinessRejection("REVERSAL_WINDOW_EXPIRED".to_string()).into());
        }
        if original.reversal_transaction_id.is_some() {
            self.observer.precheck_aborted("ALREADY_REVERSED");
            return Err(CoreError::BusinessRejection("ALREADY_REVERSED".to_string()).into());
        }

        let mut reversal = Transaction::new(
            TransactionType::Reversal,
            original.to_account_id.clone(),
            original.from_account_id.clone(),
            original.amount,
            original.currency.clone(),
            principal.name.clone(),
            req.idempotency_key,
            Some(format!("reversal of {}", original.id)),
            original.reference.clone(),
        );
        reversal.original_transaction_id = Some(original.id);
        reversal.status = TransactionStatus::Processing;
        self.store.insert(&reversal).await?;
        self.observer.transaction_created(reversal.id, TransactionType::Reversal);

        let store = Arc::clone(&self.store);
        let client = Arc::clone(&self.account_client);
        let cache = Arc::clone(&self.cache);
        let observer = self.observer.clone();
        let handle = tokio::spawn(run_reversal_legs(store, client, cache, observer, reversal, original));
        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(OrchestratorError::new(CoreError::Internal(format!(
                "reversal orchestration task panicked: {join_err}"
            )))),
        }
    }
}

/// Applies a single leg, skipping the call entirely when `account_id` is
/// the `EXTERNAL` sentinel (the Balance Engine is never invoked for it).
async fn apply_leg(
    client: &ResilientAccountClient,
    account_id: &AccountId,
    tx_id: TransactionId,
    leg: &str,
    delta: Decimal,
    allow_negative: bool,
    reason: &str,
) -> Result<crate::client::RemoteOperationOutcome, ClientError> {
    if is_external(account_id.as_str()) {
        return Ok(crate::client::RemoteOperationOutcome {
            applied: true,
            new_balance: Decimal::ZERO,
            version: 0,
            status: ledger_core::OperationStatus::Applied,
        });
    }
    let op_id = ledger_core::OperationId::for_leg(&tx_id, leg);
    client.apply_balance_operation(account_id, &op_id, delta, Some(tx_id), reason, allow_negative).await
}

/// The debit→credit→(compensate) continuation for a transfer, run as a
/// detached task (spec §5: a cancelled request must not abort a transaction
/// whose debit leg already applied).
async fn run_transfer_legs(
    store: SharedTransactionRepository,
    client: Arc<ResilientAccountClient>,
    cache: Arc<HistoryCache>,
    observer: impl Observer,
    mut transaction: Transaction,
) -> OrchestratorResult<Transaction> {
    let amount = transaction.amount;

    let debit = apply_leg(
        &client,
        &transaction.from_account_id,
        transaction.id,
        "debit",
        -amount,
        false,
        "transfer:debit",
    )
    .await;

    let debit = match debit {
        Ok(outcome) if outcome.applied => outcome,
        Ok(_rejected) => {
            observer.leg_rejected(transaction.id, "debit", "insufficient funds");
            transaction.status = TransactionStatus::Failed;
            store.update(&transaction).await?;
            cache.invalidate_all().await;
            return Err(OrchestratorError::with_transaction(
                CoreError::BusinessRejection("insufficient funds".to_string()),
                transaction.id,
            ));
        }
        Err(client_err) => {
            // Nothing moved yet: fail the transaction outright, no
            // compensation needed (spec §7 propagation policy).
            transaction.status = TransactionStatus::Failed;
            store.update(&transaction).await?;
            cache.invalidate_all().await;
            return Err(OrchestratorError::with_transaction(map_client_error(client_err), transaction.id));
        }
    };
    observer.leg_applied(transaction.id, "debit");
    transaction.from_balance_before = Some(debit.new_balance + amount);
    transaction.from_balance_after = Some(debit.new_balance);
    transaction.processing_state = ProcessingState::DebitApplied;
    store.update(&transaction).await?;

    let credit = apply_leg(
        &client,
        &transaction.to_account_id,
        transaction.id,
        "credit",
        amount,
        true,
        "transfer:credit",
    )
    .await;

    match credit {
        Ok(outcome) if outcome.applied => {
            observer.leg_applied(transaction.id, "credit");
            transaction.to_balance_before = Some(outcome.new_balance - amount);
            transaction.to_balance_after = Some(outcome.new_balance);
            transaction.processing_state = ProcessingState::CreditApplied;
            transaction.status = TransactionStatus::Completed;
            transaction.processing_state = ProcessingState::Completed;
            transaction.processed_at = Some(Utc::now());
            store.update(&transaction).await?;
            cache.invalidate_all().await;
            Ok(transaction)
        }
        credit_failure => {
            let failure_core = match &credit_failure {
                Ok(rejected) => {
                    observer.leg_rejected(transaction.id, "credit", "credit leg rejected");
                    let _ = rejected;
                    CoreError::BusinessRejection("credit leg rejected".to_string())
                }
                Err(client_err) => map_client_error(client_err.clone()),
            };

            let compensation = apply_leg(
                &client,
                &transaction.from_account_id,
                transaction.id,
                "compensate",
                amount,
                true,
                "transfer:compensate",
            )
            .await;

            match compensation {
                Ok(outcome) if outcome.applied => {
                    observer.compensated(transaction.id);
                    transaction.processing_state = ProcessingState::Compensated;
                    transaction.status = TransactionStatus::Failed;
                    store.update(&transaction).await?;
                    cache.invalidate_all().await;
                    Err(OrchestratorError::with_transaction(failure_core, transaction.id))
                }
                _ => {
                    observer.manual_action_required(transaction.id);
                    transaction.processing_state = ProcessingState::ManualActionRequired;
                    transaction.status = TransactionStatus::FailedRequiresManualAction;
                    store.update(&transaction).await?;
                    cache.invalidate_all().await;
                    Err(OrchestratorError::with_transaction(
                        CoreError::Internal(
                            "compensation failed after credit leg failure; ledger requires manual reconciliation".to_string(),
                        ),
                        transaction.id,
                    ))
                }
            }
        }
    }
}

/// Mirrors [`run_transfer_legs`] for a reversal, whose legs target the
/// swapped accounts and may be skipped outright when the swapped account is
/// `EXTERNAL` (reversing a deposit/withdrawal).
async fn run_reversal_legs(
    store: SharedTransactionRepository,
    client: Arc<ResilientAccountClient>,
    cache: Arc<HistoryCache>,
    observer: impl Observer,
    mut reversal: Transaction,
    mut original: Transaction,
) -> OrchestratorResult<Transaction> {
    let amount = reversal.amount;

    let debit = apply_leg(
        &client,
        &reversal.from_account_id,
        reversal.id,
        "debit",
        -amount,
        true,
        "reversal:debit",
    )
    .await;

    let debit = match debit {
        Ok(outcome) if outcome.applied => outcome,
        Ok(_rejected) => {
            reversal.status = TransactionStatus::Failed;
            store.update(&reversal).await?;
            cache.invalidate_all().await;
            return Err(OrchestratorError::with_transaction(
                CoreError::BusinessRejection("reversal debit leg rejected".to_string()),
                reversal.id,
            ));
        }
        Err(client_err) => {
            reversal.status = TransactionStatus::Failed;
            store.update(&reversal).await?;
            cache.invalidate_all().await;
            return Err(OrchestratorError::with_transaction(map_client_error(client_err), reversal.id));
        }
    };
    observer.leg_applied(reversal.id, "debit");
    reversal.from_balance_before = Some(debit.new_balance + amount);
    reversal.from_balance_after = Some(debit.new_balance);
    reversal.processing_state = ProcessingState::DebitApplied;
    store.update(&reversal).await?;

    let credit = apply_leg(
        &client,
        &reversal.to_account_id,
        reversal.id,
        "credit",
        amount,
        true,
        "reversal:credit",
    )
    .await;

    match credit {
        Ok(outcome) if outcome.applied => {
            observer.leg_applied(reversal.id, "credit");
            reversal.to_balance_before = Some(outcome.new_balance - amount);
            reversal.to_balance_after = Some(outcome.new_balance);
            reversal.status = TransactionStatus::Completed;
            reversal.processing_state = ProcessingState::Completed;
            reversal.processed_at = Some(Utc::now());
            store.update(&reversal).await?;

            original.status = TransactionStatus::Reversed;
            original.reversal_transaction_id = Some(reversal.id);
            original.reversed_at = Some(Utc::now());
            original.reversed_by = Some(reversal.created_by.clone());
            original.reversal_reason = reversal.description.clone();
            store.update(&original).await?;

            cache.invalidate_all().await;
            Ok(reversal)
        }
        credit_failure => {
            let failure_core = match &credit_failure {
                Ok(_) => CoreError::BusinessRejection("reversal credit leg rejected".to_string()),
                Err(client_err) => map_client_error(client_err.clone()),
            };
            let compensation = apply_leg(
                &client,
                &reversal.from_account_id,
                reversal.id,
                "compensate",
                amount,
                true,
                "reversal:compensate",
            )
            .await;
            match compensation {
                Ok(outcome) if outcome.applied => {
                    observer.compensated(reversal.id);
                    reversal.processing_state = ProcessingState::Compensated;
                    reversal.status = TransactionStatus::Failed;
                    store.update(&reversal).await?;
                    cache.invalidate_all().await;
                    Err(OrchestratorError::with_transaction(failure_core, reversal.id))
                }
                _ => {
                    observer.manual_action_required(reversal.id);
                    reversal.processing_state = ProcessingState::ManualActionRequired;
                    reversal.status = TransactionStatus::FailedRequiresManualAction;
                    store.update(&reversal).await?;
                    cache.invalidate_all().await;
                    Err(OrchestratorError::with_transaction(
                        CoreError::Internal("reversal compensation failed; ledger requires manual reconciliation".to_string()),
                        reversal.id,
                    ))
                }
            }
        }
    }
}

fn map_precheck_client_error(err: ClientError) -> OrchestratorError {
    OrchestratorError::new(map_client_error(err))
}

fn map_client_error(err: ClientError) -> CoreError {
    match err {
        ClientError::AccountNotFound => CoreError::NotFound("account not found".to_string()),
        ClientError::BusinessRejection(msg) => CoreError::BusinessRejection(msg),
        ClientError::AccountServiceUnavailable => CoreError::UpstreamUnavailable("account service unavailable".to_string()),
    }
}

fn limit_denial_message(denial: &LimitDenial) -> String {
    denial.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResilienceSettings;
    use crate::limits::LimitProfiles;
    use crate::store::memory::InMemoryTransactionRepository;
    use rust_decimal_macros::dec;

    // These unit tests exercise the orchestrator's pre-check and
    // idempotency logic against an in-memory store; the two-leg
    // interaction against a real Account Service is covered by
    // transaction-service's integration tests (require a live HTTP
    // listener and are gated accordingly), not here.

    fn orchestrator_without_client() -> (TransactionOrchestrator<crate::observer::NoopObserver>, SharedTransactionRepository) {
        let store: SharedTransactionRepository = Arc::new(InMemoryTransactionRepository::new());
        let client = Arc::new(ResilientAccountClient::new("http://localhost:1", "token", ResilienceSettings::default()));
        let limits = Arc::new(LimitEvaluator::new(LimitProfiles::default(), Arc::clone(&store)));
        let cache = Arc::new(HistoryCache::disabled());
        let orchestrator = TransactionOrchestrator::new(Arc::clone(&store), client, limits, cache, crate::observer::NoopObserver);
        (orchestrator, store)
    }

    #[tokio::test]
    async fn transfer_rejects_self_transfer_without_creating_a_row() {
        let (orchestrator, store) = orchestrator_without_client();
        let principal = Principal::owner("alice");
        let result = orchestrator
            .transfer(
                &principal,
                TransferRequest {
                    from_account_id: AccountId::from("acct-1"),
                    to_account_id: AccountId::from("acct-1"),
                    amount: dec!(10.00),
                    currency: "USD".to_string(),
                    description: None,
                    reference: None,
                    idempotency_key: None,
                },
            )
            .await;
        assert!(result.is_err());
        assert!(store.find_stuck_processing(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfer_rejects_external_sentinel_accounts() {
        let (orchestrator, _store) = orchestrator_without_client();
        let principal = Principal::owner("alice");
        let result = orchestrator
            .transfer(
                &principal,
                TransferRequest {
                    from_account_id: AccountId::from("EXTERNAL"),
                    to_account_id: AccountId::from("acct-1"),
                    amount: dec!(10.00),
                    currency: "USD".to_string(),
                    description: None,
                    reference: None,
                    idempotency_key: None,
                },
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError { core: CoreError::Validation(_), .. })));
    }

    #[tokio::test]
    async fn reverse_unknown_transaction_is_not_found() {
        let (orchestrator, _store) = orchestrator_without_client();
        let principal = Principal::owner("alice");
        let result = orchestrator
            .reverse(
                &principal,
                ReverseRequest {
                    original_transaction_id: TransactionId::new(),
                    reason: "test".to_string(),
                    idempotency_key: None,
                },
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError { core: CoreError::NotFound(_), .. })));
    }

    #[tokio::test]
    async fn reverse_outside_window_is_rejected() {
        let (orchestrator, store) = orchestrator_without_client();
        let mut original = Transaction::new(
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
        original.status = TransactionStatus::Completed;
        original.created_at = Utc::now() - ChronoDuration::days(31);
        store.insert(&original).await.unwrap();

        let principal = Principal::owner("alice");
        let result = orchestrator
            .reverse(
                &principal,
                ReverseRequest {
                    original_transaction_id: original.id,
                    reason: "test".to_string(),
                    idempotency_key: None,
                },
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError { core: CoreError::BusinessRejection(msg), .. }) if msg.contains("REVERSAL_WINDOW_EXPIRED")));
    }

    #[tokio::test]
    async fn reverse_a_reversal_is_rejected() {
        let (orchestrator, store) = orchestrator_without_client();
        let mut original = Transaction::new(
            TransactionType::Reversal,
            AccountId::from("a1"),
            AccountId::from("a2"),
            dec!(10.00),
            "USD",
            "alice",
            None,
            None,
            None,
        );
        original.status = TransactionStatus::Completed;
        store.insert(&original).await.unwrap();

        let principal = Principal::owner("alice");
        let result = orchestrator
            .reverse(
                &principal,
                ReverseRequest {
                    original_transaction_id: original.id,
                    reason: "test".to_string(),
                    idempotency_key: None,
                },
            )
            .await;
        assert!(matches!(result, Err(OrchestratorError { core: CoreError::BusinessRejection(msg), .. }) if msg.contains("CANNOT_REVERSE_REVERSAL")));
    }
}
