//! The Limit Evaluator (spec §4.5): advisory caps on transaction amounts,
//! keyed by account type. Never locks an account; the Balance Engine stays
//! the sole authority on overdraft. See SPEC_FULL.md §3.1 for how this
//! resolves the precedence between a configured profile and the hard
//! fallback cap.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use ledger_core::{AccountId, AccountType, CoreResult, TransactionType};
use rust_decimal::Decimal;
use serde::Deserialize;

/// The hard fallback cap applied only when no profile is loaded at all for
/// an account type (spec §4.5, Open Question #1 resolved in SPEC_FULL.md).
const FALLBACK_MAX_TRANSACTION_AMOUNT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Per-type sub-cap, e.g. withdrawals capped tighter than deposits.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOverride {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub per_transaction_max: Option<Decimal>,
    pub daily_max: Option<Decimal>,
    pub monthly_max: Option<Decimal>,
}

/// One account type's limit profile (spec §3).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitProfile {
    pub per_transaction_max: Decimal,
    pub daily_max: Decimal,
    pub monthly_max: Decimal,
    #[serde(default)]
    pub type_overrides: Vec<TypeOverride>,
}

impl LimitProfile {
    fn override_for(&self, transaction_type: TransactionType) -> Option<&TypeOverride> {
        self.type_overrides
            .iter()
            .find(|o| o.transaction_type == transaction_type)
    }

    fn per_transaction_cap(&self, transaction_type: TransactionType) -> Decimal {
        self.override_for(transaction_type)
            .and_then(|o| o.per_transaction_max)
            .unwrap_or(self.per_transaction_max)
    }

    fn daily_cap(&self, transaction_type: TransactionType) -> Decimal {
        self.override_for(transaction_type)
            .and_then(|o| o.daily_max)
            .unwrap_or(self.daily_max)
    }

    fn monthly_cap(&self, transaction_type: TransactionType) -> Decimal {
        self.override_for(transaction_type)
            .and_then(|o| o.monthly_max)
            .unwrap_or(self.monthly_max)
    }
}

/// The full, immutable configuration: one profile per account type. Loaded
/// once at startup from `limit_profile_path` and held behind an `Arc`
/// (spec §3: "Immutable configuration (hot-reloadable at process
/// boundaries, not mid-operation)").
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LimitProfiles {
    #[serde(flatten)]
    pub by_account_type: HashMap<AccountType, LimitProfile>,
}

impl LimitProfiles {
    /// Loads profiles from a JSON file at the given path.
    pub fn load_from_file(path: &str) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ledger_core::CoreError::Internal(format!("reading limit profile file '{path}': {e}")))?;
        serde_json::from_str(&contents)
            .map_err(|e| ledger_core::CoreError::Internal(format!("parsing limit profile file '{path}': {e}")))
    }
}

/// Why `check` declined a proposed transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitDenial {
    #[error("amount exceeds per-transaction limit")]
    PerTransactionExceeded,
    #[error("amount would exceed daily limit")]
    DailyLimitExceeded,
    #[error("amount would exceed monthly limit")]
    MonthlyLimitExceeded,
    #[error("amount exceeds the fallback limit of {0}")]
    FallbackExceeded(Decimal),
}

/// Queries completed-transaction sums needed to evaluate daily/monthly caps.
/// Implemented against the Transaction Store; kept as a trait here so the
/// Limit Evaluator doesn't depend on `crate::store` directly.
#[async_trait::async_trait]
pub trait CompletedVolumeSource: Send + Sync {
    /// Sum of completed transactions of `transaction_type` originated by
    /// `account_id` since `since` (inclusive).
    async fn completed_volume_since(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        since: DateTime<Utc>,
    ) -> CoreResult<Decimal>;
}

pub struct LimitEvaluator<V: CompletedVolumeSource> {
    profiles: LimitProfiles,
    volume_source: V,
}

impl<V: CompletedVolumeSource> LimitEvaluator<V> {
    #[must_use]
    pub fn new(profiles: LimitProfiles, volume_source: V) -> Self {
        Self { profiles, volume_source }
    }

    /// `check(account_id, account_type, type, amount) -> allow | deny(reason)`
    /// (spec §4.5's exact signature).
    pub async fn check(
        &self,
        account_id: &AccountId,
        account_type: AccountType,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> CoreResult<Result<(), LimitDenial>> {
        let Some(profile) = self.profiles.by_account_type.get(&account_type) else {
            // No profile loaded at all for this account type: the hard
            // fallback is the only thing standing between the request and
            // the Balance Engine.
            return Ok(if amount > FALLBACK_MAX_TRANSACTION_AMOUNT {
                Err(LimitDenial::FallbackExceeded(FALLBACK_MAX_TRANSACTION_AMOUNT))
            } else {
                Ok(())
            });
        };

        if amount > profile.per_transaction_cap(transaction_type) {
            return Ok(Err(LimitDenial::PerTransactionExceeded));
        }

        let now = Utc::now();
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc();
        let daily_so_far = self
            .volume_source
            .completed_volume_since(account_id, transaction_type, start_of_day)
            .await?;
        if daily_so_far + amount > profile.daily_cap(transaction_type) {
            return Ok(Err(LimitDenial::DailyLimitExceeded));
        }

        let start_of_month = now
            .with_day(1)
            .and_then(|d| d.date_naive().and_hms_opt(0, 0, 0))
            .expect("the first of the month is a valid date")
            .and_utc();
        let monthly_so_far = self
            .volume_source
            .completed_volume_since(account_id, transaction_type, start_of_month)
            .await?;
        if monthly_so_far + amount > profile.monthly_cap(transaction_type) {
            return Ok(Err(LimitDenial::MonthlyLimitExceeded));
        }

        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FakeVolumeSource {
        volume: Decimal,
    }

    #[async_trait::async_trait]
    impl CompletedVolumeSource for FakeVolumeSource {
        async fn completed_volume_since(
            &self,
            _account_id: &AccountId,
            _transaction_type: TransactionType,
            _since: DateTime<Utc>,
        ) -> CoreResult<Decimal> {
            Ok(self.volume)
        }
    }

    fn profile() -> LimitProfile {
        LimitProfile {
            per_transaction_max: dec!(5000),
            daily_max: dec!(10000),
            monthly_max: dec!(50000),
            type_overrides: vec![],
        }
    }

    #[tokio::test]
    async fn no_profile_falls_back_to_hard_cap() {
        let evaluator = LimitEvaluator::new(LimitProfiles::default(), FakeVolumeSource { volume: dec!(0) });
        let result = evaluator
            .check(&AccountId::from("a"), AccountType::Checking, TransactionType::Transfer, dec!(10001))
            .await
            .unwrap();
        assert!(matches!(result, Err(LimitDenial::FallbackExceeded(_))));
    }

    #[tokio::test]
    async fn configured_profile_overrides_fallback_even_above_10000() {
        let mut profiles = LimitProfiles::default();
        let mut p = profile();
        p.per_transaction_max = dec!(20000);
        p.daily_max = dec!(20000);
        p.monthly_max = dec!(20000);
        profiles.by_account_type.insert(AccountType::Premium, p);
        let evaluator = LimitEvaluator::new(profiles, FakeVolumeSource { volume: dec!(0) });
        let result = evaluator
            .check(&AccountId::from("a"), AccountType::Premium, TransactionType::Transfer, dec!(15000))
            .await
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn daily_cap_accounts_for_volume_already_spent() {
        let mut profiles = LimitProfiles::default();
        profiles.by_account_type.insert(AccountType::Checking, profile());
        let evaluator = LimitEvaluator::new(profiles, FakeVolumeSource { volume: dec!(9500) });
        let result = evaluator
            .check(&AccountId::from("a"), AccountType::Checking, TransactionType::Transfer, dec!(600))
            .await
            .unwrap();
        assert!(matches!(result, Err(LimitDenial::DailyLimitExceeded)));
    }

    /// Exercises the real `TransactionRepository` (not a fake) to prove a
    /// deposit's already-completed volume is actually counted toward its own
    /// daily cap — deposits book their account on `to_account_id`, and a
    /// volume source that only looked at `from_account_id` would see zero.
    #[tokio::test]
    async fn daily_cap_is_enforced_for_deposits_against_real_store() {
        use crate::store::memory::InMemoryTransactionRepository;
        use crate::store::{SharedTransactionRepository, TransactionRepository};
        use ledger_core::Transaction;
        use std::sync::Arc;

        let store: SharedTransactionRepository = Arc::new(InMemoryTransactionRepository::new());
        let mut already_deposited = Transaction::new(
            TransactionType::Deposit,
            AccountId::from("EXTERNAL"),
            AccountId::from("a"),
            dec!(9500),
            "USD",
            "alice",
            None,
            None,
            None,
        );
        already_deposited.status = ledger_core::TransactionStatus::Completed;
        store.insert(&already_deposited).await.unwrap();

        let mut profiles = LimitProfiles::default();
        profiles.by_account_type.insert(AccountType::Checking, profile());
        let evaluator = LimitEvaluator::new(profiles, store);

        let result = evaluator
            .check(&AccountId::from("a"), AccountType::Checking, TransactionType::Deposit, dec!(600))
            .await
            .unwrap();
        assert!(matches!(result, Err(LimitDenial::DailyLimitExceeded)));
    }
}
