//! Postgres-backed [`AccountLedgerBackend`].
//!
//! Implements spec §4.1's protocol as one `sqlx::Transaction`: the
//! `SELECT ... FOR UPDATE` row lock, the operation-dedup insert, and the
//! balance write all commit together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{Account, AccountId, AccountType, CoreError, CoreResult, OperationStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use crate::engine::{AccountLedgerBackend, ApplyOperationOutcome, ApplyOperationRequest};

pub struct PostgresLedgerBackend {
    pool: PgPool,
}

impl PostgresLedgerBackend {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_account(
    id: String,
    owner_id: String,
    account_type: String,
    balance: Decimal,
    credit_limit: Option<Decimal>,
    interest_rate: Option<Decimal>,
    version: i64,
    active: bool,
    created_at: DateTime<Utc>,
) -> CoreResult<Account> {
    let account_type = match account_type.as_str() {
        "CHECKING" => AccountType::Checking,
        "SAVINGS" => AccountType::Savings,
        "CREDIT" => AccountType::Credit,
        "PREMIUM" => AccountType::Premium,
        other => return Err(CoreError::Internal(format!("unknown account_type '{other}' in storage"))),
    };
    Ok(Account {
        id: AccountId::from(id),
        owner_id,
        account_type,
        balance,
        credit_limit,
        interest_rate,
        version: version.max(0) as u64,
        active,
        created_at,
    })
}

fn account_type_tag(account_type: AccountType) -> &'static str {
    match account_type {
        AccountType::Checking => "CHECKING",
        AccountType::Savings => "SAVINGS",
        AccountType::Credit => "CREDIT",
        AccountType::Premium => "PREMIUM",
    }
}

/// Step 1 of spec §4.1: look up a committed `BalanceOperation` for this
/// `(operation_id, account_id)` pair and, if one exists, return the replay
/// outcome it recorded alongside the account's current version.
///
/// Takes a generic executor so it can run against the enclosing
/// transaction on the first attempt, or against a fresh connection after
/// losing a unique-violation race on the insert below — spec §4.1's
/// concurrency guarantee has the race loser "observe the inserted row ...
/// after a unique-violation retry, in step 1".
async fn replay_outcome<'e, E>(
    executor: E,
    request: &ApplyOperationRequest,
) -> CoreResult<Option<ApplyOperationOutcome>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query(
        "SELECT o.applied, o.resulting_balance, a.version \
         FROM account_balance_operations o JOIN accounts a ON a.id = o.account_id \
         WHERE o.operation_id = $1 AND o.account_id = $2",
    )
    .bind(request.operation_id.as_str())
    .bind(request.account_id.as_str())
    .fetch_optional(executor)
    .await
    .map_err(|e| CoreError::Internal(e.to_string()))?;

    let Some(row) = row else {
        return Ok(None);
    };
    let applied: bool = row.try_get("applied").map_err(|e| CoreError::Internal(e.to_string()))?;
    let resulting_balance: Decimal = row
        .try_get("resulting_balance")
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    let version: i64 = row.try_get("version").map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(Some(ApplyOperationOutcome {
        applied,
        new_balance: resulting_balance,
        version: version.max(0) as u64,
        status: OperationStatus::Replayed,
    }))
}

#[async_trait]
impl AccountLedgerBackend for PostgresLedgerBackend {
    async fn apply_operation(&self, request: ApplyOperationRequest) -> CoreResult<ApplyOperationOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        // Step 1: replay check.
        if let Some(outcome) = replay_outcome(&mut *tx, &request).await? {
            tx.commit().await.map_err(|e| CoreError::Internal(e.to_string()))?;
            return Ok(outcome);
        }

        // Step 2: pessimistic row lock.
        let locked = sqlx::query("SELECT balance, version FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(request.account_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("account '{}' not found", request.account_id)))?;
        let current_balance: Decimal = locked
            .try_get("balance")
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let current_version: i64 = locked
            .try_get("version")
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        // Step 3: compute.
        let new_balance = ledger_core::money::normalize(current_balance + request.delta);

        // Step 4: overdraft policy.
        if new_balance < Decimal::ZERO && !request.allow_negative {
            let insert = sqlx::query(
                "INSERT INTO account_balance_operations \
                 (operation_id, account_id, transaction_id, delta, reason, allow_negative, applied, resulting_balance, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, false, $7, 'REJECTED', now())",
            )
            .bind(request.operation_id.as_str())
            .bind(request.account_id.as_str())
            .bind(request.transaction_id.map(|t| t.as_uuid()))
            .bind(request.delta)
            .bind(&request.reason)
            .bind(request.allow_negative)
            .bind(current_balance)
            .execute(&mut *tx)
            .await;

            return match insert {
                Ok(_) => {
                    tx.commit().await.map_err(|e| CoreError::Internal(e.to_string()))?;
                    Ok(ApplyOperationOutcome {
                        applied: false,
                        new_balance: current_balance,
                        version: current_version.max(0) as u64,
                        status: OperationStatus::Rejected,
                    })
                }
                // Lost the race to insert this operation row: another
                // transaction committed the same (operation_id, account_id)
                // key while we were between step 1 and this insert. Nothing
                // else in this transaction mutated a row, so roll back and
                // replay whatever the winner recorded.
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    tx.rollback().await.map_err(|e| CoreError::Internal(e.to_string()))?;
                    replay_outcome(&self.pool, &request).await?.ok_or_else(|| {
                        CoreError::Internal(
                            "unique violation on balance operation insert but no row found on retry".to_string(),
                        )
                    })
                }
                Err(e) => Err(CoreError::Internal(e.to_string())),
            };
        }

        // Step 5: apply.
        let new_version = current_version + 1;
        sqlx::query("UPDATE accounts SET balance = $1, version = $2 WHERE id = $3")
            .bind(new_balance)
            .bind(new_version)
            .bind(request.account_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let insert = sqlx::query(
            "INSERT INTO account_balance_operations \
             (operation_id, account_id, transaction_id, delta, reason, allow_negative, applied, resulting_balance, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, true, $7, 'APPLIED', now())",
        )
        .bind(request.operation_id.as_str())
        .bind(request.account_id.as_str())
        .bind(request.transaction_id.map(|t| t.as_uuid()))
        .bind(request.delta)
        .bind(&request.reason)
        .bind(request.allow_negative)
        .bind(new_balance)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                tx.commit().await.map_err(|e| CoreError::Internal(e.to_string()))?;
                Ok(ApplyOperationOutcome {
                    applied: true,
                    new_balance,
                    version: new_version.max(0) as u64,
                    status: OperationStatus::Applied,
                })
            }
            // Same race as the reject branch above, but here our own
            // balance UPDATE must not survive either — the winner already
            // applied this delta once. Roll back the whole transaction
            // (discarding our UPDATE) and replay the winner's outcome.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.map_err(|e| CoreError::Internal(e.to_string()))?;
                replay_outcome(&self.pool, &request).await?.ok_or_else(|| {
                    CoreError::Internal(
                        "unique violation on balance operation insert but no row found on retry".to_string(),
                    )
                })
            }
            Err(e) => Err(CoreError::Internal(e.to_string())),
        }
    }

    async fn get_account(&self, account_id: &AccountId) -> CoreResult<Account> {
        let row = sqlx::query(
            "SELECT id, owner_id, account_type, balance, credit_limit, interest_rate, version, active, created_at \
             FROM accounts WHERE id = $1",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .ok_or_else(|| CoreError::NotFound(format!("account '{account_id}' not found")))?;

        row_to_account(
            row.try_get("id").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("owner_id").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("account_type").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("balance").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("credit_limit").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("interest_rate").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("version").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("active").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("created_at").map_err(|e| CoreError::Internal(e.to_string()))?,
        )
    }

    async fn create_account(
        &self,
        owner_id: String,
        account_type: AccountType,
        credit_limit: Option<Decimal>,
        interest_rate: Option<Decimal>,
    ) -> CoreResult<Account> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = sqlx::query(
            "INSERT INTO accounts (id, owner_id, account_type, balance, credit_limit, interest_rate, version, active, created_at) \
             VALUES ($1, $2, $3, 0.00, $4, $5, 0, true, now()) \
             RETURNING id, owner_id, account_type, balance, credit_limit, interest_rate, version, active, created_at",
        )
        .bind(&id)
        .bind(&owner_id)
        .bind(account_type_tag(account_type))
        .bind(credit_limit)
        .bind(interest_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        row_to_account(
            row.try_get("id").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("owner_id").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("account_type").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("balance").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("credit_limit").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("interest_rate").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("version").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("active").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("created_at").map_err(|e| CoreError::Internal(e.to_string()))?,
        )
    }

    async fn set_balance(&self, account_id: &AccountId, new_balance: Decimal) -> CoreResult<Account> {
        let row = sqlx::query(
            "UPDATE accounts SET balance = $1, version = version + 1 WHERE id = $2 \
             RETURNING id, owner_id, account_type, balance, credit_limit, interest_rate, version, active, created_at",
        )
        .bind(ledger_core::money::normalize(new_balance))
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .ok_or_else(|| CoreError::NotFound(format!("account '{account_id}' not found")))?;

        row_to_account(
            row.try_get("id").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("owner_id").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("account_type").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("balance").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("credit_limit").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("interest_rate").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("version").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("active").map_err(|e| CoreError::Internal(e.to_string()))?,
            row.try_get("created_at").map_err(|e| CoreError::Internal(e.to_string()))?,
        )
    }
}
