//! The Transaction Store (spec §2 component 6): persistent ledger of
//! transactions with status/processing-state fields and the unique index on
//! `(created_by, type, idempotency_key)`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{AccountId, CoreResult, Transaction, TransactionId, TransactionType};
use rust_decimal::Decimal;

/// A single page of a larger result set, mirroring the `{content, page,
/// size, totalElements}` envelope the Transaction HTTP Facade serializes.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

/// Sort order for history/search pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    CreatedAtAsc,
    CreatedAtDesc,
}

impl SortOrder {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("createdAt,asc") {
            SortOrder::CreatedAtAsc
        } else {
            SortOrder::CreatedAtDesc
        }
    }
}

/// Filters for the multi-filter search endpoint (spec §6).
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub account_id: Option<AccountId>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<ledger_core::TransactionStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Non-privileged principals have this silently set to their own name
    /// (spec §4.4: "List queries silently rewrite the `ownerId` filter to
    /// `principal.name`" — the closest equivalent field on a [`Transaction`]
    /// is `created_by`, since transactions carry no owner of their own).
    pub created_by: Option<String>,
}

/// Persistence contract for the Transaction Store. Implementations must
/// enforce the unique `(created_by, type, idempotency_key)` index when the
/// key is present, and must never partially write a [`Transaction`] — every
/// call here is one row, one statement.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, transaction: &Transaction) -> CoreResult<()>;

    /// Replaces the stored row for `transaction.id` with the given value.
    /// The Orchestrator always reads-modifies-writes a whole [`Transaction`]
    /// rather than patching individual fields.
    async fn update(&self, transaction: &Transaction) -> CoreResult<()>;

    async fn get(&self, id: TransactionId) -> CoreResult<Transaction>;

    /// Looks up a transaction by its idempotency key, scoped by creator and
    /// type per the unique index (spec §3).
    async fn find_by_idempotency_key(
        &self,
        created_by: &str,
        transaction_type: TransactionType,
        idempotency_key: &str,
    ) -> CoreResult<Option<Transaction>>;

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: u32,
        size: u32,
        sort: SortOrder,
    ) -> CoreResult<Page<Transaction>>;

    async fn search(&self, filter: &SearchFilter, page: u32, size: u32) -> CoreResult<Page<Transaction>>;

    /// Sum of completed transactions of `transaction_type` booked against
    /// `account_id` since `since`, for the Limit Evaluator's daily/monthly
    /// caps (spec §4.5). The account sits on `from_account_id` for every
    /// type except `DEPOSIT`, whose real account is `to_account_id`
    /// (`from_account_id` is the `EXTERNAL` sentinel).
    async fn completed_volume_since(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        since: DateTime<Utc>,
    ) -> CoreResult<Decimal>;

    /// Transactions stuck in `INITIATED`/`DEBIT_APPLIED` with
    /// `created_at < cutoff`, for the recovery sweeper (spec §5).
    async fn find_stuck_processing(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Transaction>>;
}

/// A shared, trait-object handle to the Transaction Store: what the
/// Orchestrator, the Limit Evaluator, and the sweeper all hold.
pub type SharedTransactionRepository = std::sync::Arc<dyn TransactionRepository>;

/// The repository is also a volume source for the Limit Evaluator; it's the
/// same underlying query, just a narrower trait for that one caller.
#[async_trait]
impl crate::limits::CompletedVolumeSource for SharedTransactionRepository {
    async fn completed_volume_since(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        since: DateTime<Utc>,
    ) -> CoreResult<Decimal> {
        TransactionRepository::completed_volume_since(self.as_ref(), account_id, transaction_type, since).await
    }
}
