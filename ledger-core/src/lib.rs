#![forbid(unsafe_code)]

//! Shared domain types for the ledger: accounts, balance operations and
//! transactions, plus the money/decimal conventions both services agree on.
//!
//! Nothing in this crate talks to a database or the network. It exists so
//! that `account-service` and `transaction-service` share one definition of
//! what an [`Account`], a [`BalanceOperation`] and a [`Transaction`] are,
//! rather than each re-deriving slightly different structs from the wire
//! format.

/// Account records and account-type-driven policy.
pub mod account;
/// The composite-keyed, idempotent record of a single balance mutation.
pub mod balance_operation;
/// Shared error taxonomy (see spec §7) and its HTTP-status mapping.
pub mod error;
/// Newtype identifiers used throughout the ledger.
pub mod ids;
/// Decimal/money helpers: fixed scale-2 arithmetic, no rounding.
pub mod money;
/// The authenticated caller of a request: name + roles.
pub mod principal;
/// Transaction records, their type/status/processing-state enums.
pub mod transaction;

pub use account::{Account, AccountType};
pub use balance_operation::{BalanceOperation, OperationStatus};
pub use error::{CoreError, CoreResult};
pub use ids::{AccountId, OperationId, TransactionId};
pub use money::MONEY_SCALE;
pub use principal::{Principal, Role};
pub use transaction::{ProcessingState, Transaction, TransactionStatus, TransactionType};

/// Reserved account identifier for funds entering or leaving the system.
///
/// Case-insensitive: callers may send `"external"`, `"External"`, etc. The
/// Balance Engine is never invoked for this sentinel.
pub const EXTERNAL_SENTINEL: &str = "EXTERNAL";

/// Returns whether an account identifier string refers to the reserved
/// external sentinel, matched case-insensitively per spec §6.
#[must_use]
pub fn is_external(account_id: &str) -> bool {
    account_id.eq_ignore_ascii_case(EXTERNAL_SENTINEL)
}
