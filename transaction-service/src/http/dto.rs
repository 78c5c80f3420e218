//! Wire shapes for the Transaction HTTP Facade (spec §6). Money travels as
//! decimal strings via `rust_decimal`'s serde support; timestamps as RFC
//! 3339, consistent with the Account HTTP Facade.

use chrono::{DateTime, Utc};
use ledger_core::{ProcessingState, Transaction, TransactionId, TransactionStatus, TransactionType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::Page;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequestBody {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleLegRequestBody {
    pub account_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRequestBody {
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
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

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            from_account_id: t.from_account_id.as_str().to_string(),
            to_account_id: t.to_account_id.as_str().to_string(),
            amount: t.amount,
            currency: t.currency,
            transaction_type: t.transaction_type,
            status: t.status,
            processing_state: t.processing_state,
            description: t.description,
            reference: t.reference,
            idempotency_key: t.idempotency_key,
            created_by: t.created_by,
            created_at: t.created_at,
            processed_at: t.processed_at,
            from_balance_before: t.from_balance_before,
            from_balance_after: t.from_balance_after,
            to_balance_before: t.to_balance_before,
            to_balance_after: t.to_balance_after,
            original_transaction_id: t.original_transaction_id,
            reversal_transaction_id: t.reversal_transaction_id,
            reversed_at: t.reversed_at,
            reversed_by: t.reversed_by,
            reversal_reason: t.reversal_reason,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

impl From<Page<Transaction>> for PageResponse<TransactionResponse> {
    fn from(page: Page<Transaction>) -> Self {
        Self {
            content: page.content.into_iter().map(TransactionResponse::from).collect(),
            page: page.page,
            size: page.size,
            total_elements: page.total_elements,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
}
