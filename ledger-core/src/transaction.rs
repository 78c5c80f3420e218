use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, TransactionId};

/// The kind of money movement a [`Transaction`] represents.
///
/// A single entity with a `type` discriminator, per spec §9: behavior
/// differs in orchestration (how many legs, whether `EXTERNAL` is
/// involved), not in the shape of the stored data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Deposit,
    Withdrawal,
    Reversal,
}

/// The business-visible lifecycle status of a [`Transaction`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    FailedRequiresManualAction,
    Reversed,
}

impl TransactionStatus {
    /// Whether this status is terminal, i.e. the Orchestrator will never
    /// transition a transaction away from it.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::FailedRequiresManualAction
                | TransactionStatus::Reversed
        )
    }
}

/// Fine-grained orchestrator progress, orthogonal to [`TransactionStatus`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    Initiated,
    DebitApplied,
    CreditApplied,
    Completed,
    Compensated,
    ManualActionRequired,
}

/// A single entry in the transaction ledger.
///
/// `from_account_id`/`to_account_id` may be the reserved `"EXTERNAL"`
/// sentinel for deposits/withdrawals. A `REVERSAL` transaction cannot itself
/// be reversed (spec §3 invariant), and `status=REVERSED` implies
/// `reversal_transaction_id` is populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub processing_state: ProcessingState,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub from_balance_before: Option<Decimal>,
    pub from_balance_after: Option<Decimal>,
    pub to_balance_before: Option<Decimal>,
    pub to_balance_after: Option<Decimal>,
    pub original_transaction_id: Option<TransactionId>,
    pub reversal_transaction_id: Option<TransactionId>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversed_by: Option<String>,
    pub reversal_reason: Option<String>,
}

impl Transaction {
    /// Builds a brand-new transaction in the `INITIATED`/`PENDING` state.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        transaction_type: TransactionType,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
        currency: impl Into<String>,
        created_by: impl Into<String>,
        idempotency_key: Option<String>,
        description: Option<String>,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            from_account_id,
            to_account_id,
            amount,
            currency: currency.into(),
            transaction_type,
            status: TransactionStatus::Pending,
            processing_state: ProcessingState::Initiated,
            description,
            reference,
            idempotency_key,
            created_by: created_by.into(),
            created_at: Utc::now(),
            processed_at: None,
            from_balance_before: None,
            from_balance_after: None,
            to_balance_before: None,
            to_balance_after: None,
            original_transaction_id: None,
            reversal_transaction_id: None,
            reversed_at: None,
            reversed_by: None,
            reversal_reason: None,
        }
    }

    /// Whether this transaction type can ever be reversed.
    #[must_use]
    pub fn is_reversible_type(self_type: TransactionType) -> bool {
        !matches!(self_type, TransactionType::Reversal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversal_type_is_not_reversible() {
        assert!(!Transaction::is_reversible_type(TransactionType::Reversal));
        assert!(Transaction::is_reversible_type(TransactionType::Transfer));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Reversed.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }
}
