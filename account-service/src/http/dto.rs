//! Wire shapes for the Account HTTP Facade (spec §6). Money travels as
//! decimal strings via `rust_decimal`'s serde support, never as a float.

use chrono::{DateTime, Utc};
use ledger_core::{Account, AccountType, OperationStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBalanceOperationRequest {
    pub operation_id: String,
    pub delta: Decimal,
    pub transaction_id: Option<uuid::Uuid>,
    pub reason: String,
    #[serde(default)]
    pub allow_negative: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyBalanceOperationResponse {
    pub account_id: String,
    pub operation_id: String,
    pub applied: bool,
    pub new_balance: Decimal,
    pub version: u64,
    pub status: OperationStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: String,
    pub owner_id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub credit_limit: Option<Decimal>,
    pub interest_rate: Option<Decimal>,
    pub version: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.as_str().to_string(),
            owner_id: account.owner_id,
            account_type: account.account_type,
            balance: account.balance,
            credit_limit: account.credit_limit,
            interest_rate: account.interest_rate,
            version: account.version,
            active: account.active,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub owner_id: String,
    pub account_type: AccountType,
    pub credit_limit: Option<Decimal>,
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBalanceRequest {
    pub balance: Decimal,
}
