use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, OperationId, TransactionId};

/// Outcome recorded for a single balance operation, keyed by
/// `(operation_id, account_id)`.
///
/// Spec §3 invariant: the primary key is unique, and a second request with
/// the same key returns the stored outcome verbatim without re-mutating the
/// account. `REJECTED` keeps `applied=false` and preserves `delta` for
/// audit; it is not an error in the storage sense, just a recorded outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Applied,
    Rejected,
    /// Returned for every request after the first against a given key; the
    /// Balance Engine performed no mutation for this response.
    Replayed,
}

/// The atomic unit of balance change. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceOperation {
    pub operation_id: OperationId,
    pub account_id: AccountId,
    /// Loose back-reference; not a foreign key, since a balance operation
    /// can exist (e.g. compensation bookkeeping) slightly decoupled from the
    /// transaction store's own lifecycle.
    pub transaction_id: Option<TransactionId>,
    pub delta: Decimal,
    pub reason: String,
    pub allow_negative: bool,
    pub applied: bool,
    pub resulting_balance: Decimal,
    pub status: OperationStatus,
    pub created_at: DateTime<Utc>,
}

impl BalanceOperation {
    /// Builds the record for a successfully applied operation.
    #[must_use]
    pub fn applied(
        operation_id: OperationId,
        account_id: AccountId,
        transaction_id: Option<TransactionId>,
        delta: Decimal,
        reason: impl Into<String>,
        allow_negative: bool,
        resulting_balance: Decimal,
    ) -> Self {
        Self {
            operation_id,
            account_id,
            transaction_id,
            delta,
            reason: reason.into(),
            allow_negative,
            applied: true,
            resulting_balance,
            status: OperationStatus::Applied,
            created_at: Utc::now(),
        }
    }

    /// Builds the record for a rejected operation (overdraft policy
    /// violation): `applied=false`, `resulting_balance` is the unchanged
    /// current balance, `delta` is preserved for audit.
    #[must_use]
    pub fn rejected(
        operation_id: OperationId,
        account_id: AccountId,
        transaction_id: Option<TransactionId>,
        delta: Decimal,
        reason: impl Into<String>,
        allow_negative: bool,
        current_balance: Decimal,
    ) -> Self {
        Self {
            operation_id,
            account_id,
            transaction_id,
            delta,
            reason: reason.into(),
            allow_negative,
            applied: false,
            resulting_balance: current_balance,
            status: OperationStatus::Rejected,
            created_at: Utc::now(),
        }
    }
}
