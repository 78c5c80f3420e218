use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// Tag controlling which overdraft and limit rules apply to an account.
///
/// Treated purely as a discriminator for policy lookups (spec §3); it has no
/// behavior of its own beyond `Display`/`FromStr`-style (de)serialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
    Premium,
}

impl AccountType {
    /// Whether this account type is permitted to go negative at all, given
    /// the caller also set `allow_negative`. Credit-style accounts are
    /// always permitted; everything else defers entirely to the caller's
    /// flag (spec §3 invariant: "unless the caller sets the 'allow
    /// negative' flag *and* the account type permits it").
    #[must_use]
    pub fn permits_negative_balance(self) -> bool {
        matches!(self, AccountType::Credit | AccountType::Premium)
    }
}

/// A customer account: owner, type, balance, and the monotonic version used
/// to detect lost updates.
///
/// Mutated only by the Balance Engine and by an explicit privileged
/// PUT-balance operation; never deleted while referenced by a transaction
/// (logical delete only — modeled here as `active: bool`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    /// Immutable after creation.
    pub owner_id: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub credit_limit: Option<Decimal>,
    pub interest_rate: Option<Decimal>,
    /// Incremented on every balance mutation; never on a replayed or
    /// rejected operation.
    pub version: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new, zero-balance account.
    #[must_use]
    pub fn new(id: AccountId, owner_id: impl Into<String>, account_type: AccountType) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            account_type,
            balance: Decimal::new(0, crate::money::MONEY_SCALE),
            credit_limit: None,
            interest_rate: None,
            version: 0,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Whether `delta` applied to this account's current balance would
    /// require the overdraft flag, i.e. whether the resulting balance would
    /// be negative.
    #[must_use]
    pub fn would_overdraw(&self, delta: Decimal) -> bool {
        self.balance + delta < Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_credit_like_types_permit_negative_by_default_policy() {
        assert!(AccountType::Credit.permits_negative_balance());
        assert!(AccountType::Premium.permits_negative_balance());
        assert!(!AccountType::Checking.permits_negative_balance());
        assert!(!AccountType::Savings.permits_negative_balance());
    }

    #[test]
    fn new_account_has_zero_balance_and_version() {
        let account = Account::new(AccountId::from("acct-1"), "alice", AccountType::Checking);
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.version, 0);
        assert!(account.active);
    }
}
