use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
///
/// Wraps the raw string id rather than a numeric type, since the HTTP path
/// parameter and the reserved `"EXTERNAL"` sentinel are both strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wraps a raw account id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether this id is the reserved `EXTERNAL` sentinel.
    #[must_use]
    pub fn is_external(&self) -> bool {
        crate::is_external(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied, opaque identifier for a single balance operation.
///
/// The orchestrator composes these as `"<transactionId>:<leg>"`; the
/// Balance Engine treats the value as opaque and only uses it, paired with
/// an [`AccountId`], as the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Wraps a raw operation id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Composes the leg-scoped operation id the orchestrator uses:
    /// `"<transaction_id>:<leg>"`.
    #[must_use]
    pub fn for_leg(transaction_id: &TransactionId, leg: &str) -> Self {
        Self(format!("{transaction_id}:{leg}"))
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a [`crate::Transaction`]; a UUID generated at
/// creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TransactionId(uuid::Uuid);

impl TransactionId {
    /// Generates a new, random transaction id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wraps an existing UUID (e.g. one read back from storage).
    #[must_use]
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_sentinel_is_case_insensitive() {
        assert!(AccountId::from("EXTERNAL").is_external());
        assert!(AccountId::from("external").is_external());
        assert!(AccountId::from("External").is_external());
        assert!(!AccountId::from("acct-1").is_external());
    }

    #[test]
    fn operation_id_composes_leg_suffix() {
        let tx = TransactionId::new();
        let op = OperationId::for_leg(&tx, "debit");
        assert_eq!(op.as_str(), format!("{tx}:debit"));
    }
}
