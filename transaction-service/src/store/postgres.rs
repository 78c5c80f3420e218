//! Postgres-backed [`TransactionRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_core::{
    AccountId, CoreError, CoreResult, ProcessingState, Transaction, TransactionId, TransactionStatus, TransactionType,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use super::{Page, SearchFilter, SortOrder, TransactionRepository};

pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn type_tag(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Transfer => "TRANSFER",
        TransactionType::Deposit => "DEPOSIT",
        TransactionType::Withdrawal => "WITHDRAWAL",
        TransactionType::Reversal => "REVERSAL",
    }
}

fn parse_type(raw: &str) -> CoreResult<TransactionType> {
    match raw {
        "TRANSFER" => Ok(TransactionType::Transfer),
        "DEPOSIT" => Ok(TransactionType::Deposit),
        "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
        "REVERSAL" => Ok(TransactionType::Reversal),
        other => Err(CoreError::Internal(format!("unknown transaction type '{other}' in storage"))),
    }
}

fn status_tag(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Pending => "PENDING",
        TransactionStatus::Processing => "PROCESSING",
        TransactionStatus::Completed => "COMPLETED",
        TransactionStatus::Failed => "FAILED",
        TransactionStatus::FailedRequiresManualAction => "FAILED_REQUIRES_MANUAL_ACTION",
        TransactionStatus::Reversed => "REVERSED",
    }
}

fn parse_status(raw: &str) -> CoreResult<TransactionStatus> {
    match raw {
        "PENDING" => Ok(TransactionStatus::Pending),
        "PROCESSING" => Ok(TransactionStatus::Processing),
        "COMPLETED" => Ok(TransactionStatus::Completed),
        "FAILED" => Ok(TransactionStatus::Failed),
        "FAILED_REQUIRES_MANUAL_ACTION" => Ok(TransactionStatus::FailedRequiresManualAction),
        "REVERSED" => Ok(TransactionStatus::Reversed),
        other => Err(CoreError::Internal(format!("unknown transaction status '{other}' in storage"))),
    }
}

fn processing_state_tag(s: ProcessingState) -> &'static str {
    match s {
        ProcessingState::Initiated => "INITIATED",
        ProcessingState::DebitApplied => "DEBIT_APPLIED",
        ProcessingState::CreditApplied => "CREDIT_APPLIED",
        ProcessingState::Completed => "COMPLETED",
        ProcessingState::Compensated => "COMPENSATED",
        ProcessingState::ManualActionRequired => "MANUAL_ACTION_REQUIRED",
    }
}

fn parse_processing_state(raw: &str) -> CoreResult<ProcessingState> {
    match raw {
        "INITIATED" => Ok(ProcessingState::Initiated),
        "DEBIT_APPLIED" => Ok(ProcessingState::DebitApplied),
        "CREDIT_APPLIED" => Ok(ProcessingState::CreditApplied),
        "COMPLETED" => Ok(ProcessingState::Completed),
        "COMPENSATED" => Ok(ProcessingState::Compensated),
        "MANUAL_ACTION_REQUIRED" => Ok(ProcessingState::ManualActionRequired),
        other => Err(CoreError::Internal(format!("unknown processing_state '{other}' in storage"))),
    }
}

fn row_to_transaction(row: &sqlx::postgres::PgRow) -> CoreResult<Transaction> {
    let map_err = |e: sqlx::Error| CoreError::Internal(e.to_string());
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id").map_err(map_err)?),
        from_account_id: AccountId::from(row.try_get::<String, _>("from_account_id").map_err(map_err)?),
        to_account_id: AccountId::from(row.try_get::<String, _>("to_account_id").map_err(map_err)?),
        amount: row.try_get("amount").map_err(map_err)?,
        currency: row.try_get("currency").map_err(map_err)?,
        transaction_type: parse_type(&row.try_get::<String, _>("type").map_err(map_err)?)?,
        status: parse_status(&row.try_get::<String, _>("status").map_err(map_err)?)?,
        processing_state: parse_processing_state(&row.try_get::<String, _>("processing_state").map_err(map_err)?)?,
        description: row.try_get("description").map_err(map_err)?,
        reference: row.try_get("reference").map_err(map_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(map_err)?,
        created_by: row.try_get("created_by").map_err(map_err)?,
        created_at: row.try_get("created_at").map_err(map_err)?,
        processed_at: row.try_get("processed_at").map_err(map_err)?,
        from_balance_before: row.try_get("from_balance_before").map_err(map_err)?,
        from_balance_after: row.try_get("from_balance_after").map_err(map_err)?,
        to_balance_before: row.try_get("to_balance_before").map_err(map_err)?,
        to_balance_after: row.try_get("to_balance_after").map_err(map_err)?,
        original_transaction_id: row
            .try_get::<Option<uuid::Uuid>, _>("original_transaction_id")
            .map_err(map_err)?
            .map(TransactionId::from_uuid),
        reversal_transaction_id: row
            .try_get::<Option<uuid::Uuid>, _>("reversal_transaction_id")
            .map_err(map_err)?
            .map(TransactionId::from_uuid),
        reversed_at: row.try_get("reversed_at").map_err(map_err)?,
        reversed_by: row.try_get("reversed_by").map_err(map_err)?,
        reversal_reason: row.try_get("reversal_reason").map_err(map_err)?,
    })
}

const SELECT_COLUMNS: &str = "id, from_account_id, to_account_id, amount, currency, type, status, \
    processing_state, description, reference, idempotency_key, created_by, created_at, processed_at, \
    from_balance_before, from_balance_after, to_balance_before, to_balance_after, original_transaction_id, \
    reversal_transaction_id, reversed_at, reversed_by, reversal_reason";

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, t: &Transaction) -> CoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO transactions (id, from_account_id, to_account_id, amount, currency, type, status, \
             processing_state, description, reference, idempotency_key, created_by, created_at, processed_at, \
             from_balance_before, from_balance_after, to_balance_before, to_balance_after, \
             original_transaction_id, reversal_transaction_id, reversed_at, reversed_by, reversal_reason) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23)",
        )
        .bind(t.id.as_uuid())
        .bind(t.from_account_id.as_str())
        .bind(t.to_account_id.as_str())
        .bind(t.amount)
        .bind(&t.currency)
        .bind(type_tag(t.transaction_type))
        .bind(status_tag(t.status))
        .bind(processing_state_tag(t.processing_state))
        .bind(&t.description)
        .bind(&t.reference)
        .bind(&t.idempotency_key)
        .bind(&t.created_by)
        .bind(t.created_at)
        .bind(t.processed_at)
        .bind(t.from_balance_before)
        .bind(t.from_balance_after)
        .bind(t.to_balance_before)
        .bind(t.to_balance_after)
        .bind(t.original_transaction_id.map(|id| id.as_uuid()))
        .bind(t.reversal_transaction_id.map(|id| id.as_uuid()))
        .bind(t.reversed_at)
        .bind(&t.reversed_by)
        .bind(&t.reversal_reason)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(CoreError::BusinessRejection(
                "idempotency key already used for this creator and type".to_string(),
            )),
            Err(e) => Err(CoreError::Internal(e.to_string())),
        }
    }

    async fn update(&self, t: &Transaction) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET status=$1, processing_state=$2, processed_at=$3, from_balance_before=$4, \
             from_balance_after=$5, to_balance_before=$6, to_balance_after=$7, original_transaction_id=$8, \
             reversal_transaction_id=$9, reversed_at=$10, reversed_by=$11, reversal_reason=$12 WHERE id=$13",
        )
        .bind(status_tag(t.status))
        .bind(processing_state_tag(t.processing_state))
        .bind(t.processed_at)
        .bind(t.from_balance_before)
        .bind(t.from_balance_after)
        .bind(t.to_balance_before)
        .bind(t.to_balance_after)
        .bind(t.original_transaction_id.map(|id| id.as_uuid()))
        .bind(t.reversal_transaction_id.map(|id| id.as_uuid()))
        .bind(t.reversed_at)
        .bind(&t.reversed_by)
        .bind(&t.reversal_reason)
        .bind(t.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("transaction '{}' not found", t.id)));
        }
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> CoreResult<Transaction> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("transaction '{id}' not found")))?;
        row_to_transaction(&row)
    }

    async fn find_by_idempotency_key(
        &self,
        created_by: &str,
        transaction_type: TransactionType,
        idempotency_key: &str,
    ) -> CoreResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE created_by = $1 AND type = $2 AND idempotency_key = $3"
        ))
        .bind(created_by)
        .bind(type_tag(transaction_type))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: u32,
        size: u32,
        sort: SortOrder,
    ) -> CoreResult<Page<Transaction>> {
        let order = match sort {
            SortOrder::CreatedAtAsc => "ASC",
            SortOrder::CreatedAtDesc => "DESC",
        };
        let total_elements: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE from_account_id = $1 OR to_account_id = $1",
        )
        .bind(account_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE from_account_id = $1 OR to_account_id = $1 \
             ORDER BY created_at {order} LIMIT $2 OFFSET $3"
        ))
        .bind(account_id.as_str())
        .bind(i64::from(size))
        .bind(i64::from(page) * i64::from(size))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;

        let content = rows.iter().map(row_to_transaction).collect::<CoreResult<Vec<_>>>()?;
        Ok(Page {
            content,
            page,
            size,
            total_elements: total_elements.max(0) as u64,
        })
    }

    async fn search(&self, filter: &SearchFilter, page: u32, size: u32) -> CoreResult<Page<Transaction>> {
        // Built with static clause fragments and positional binds only —
        // every value flows through a bind parameter, never string
        // interpolation, even though the clause list itself is assembled
        // dynamically.
        let mut clauses: Vec<String> = Vec::new();
        let mut string_binds: Vec<String> = Vec::new();
        let mut date_binds: Vec<DateTime<Utc>> = Vec::new();
        let mut idx = 1;

        if let Some(account_id) = &filter.account_id {
            clauses.push(format!("(from_account_id = ${idx} OR to_account_id = ${idx})"));
            string_binds.push(account_id.as_str().to_string());
            idx += 1;
        }
        if let Some(transaction_type) = filter.transaction_type {
            clauses.push(format!("type = ${idx}"));
            string_binds.push(type_tag(transaction_type).to_string());
            idx += 1;
        }
        if let Some(status) = filter.status {
            clauses.push(format!("status = ${idx}"));
            string_binds.push(status_tag(status).to_string());
            idx += 1;
        }
        if let Some(created_by) = &filter.created_by {
            clauses.push(format!("created_by = ${idx}"));
            string_binds.push(created_by.clone());
            idx += 1;
        }
        // Date-range binds come after every string bind so a single `idx`
        // counter can track both without the two vectors needing to
        // interleave.
        if let Some(from_date) = filter.from_date {
            clauses.push(format!("created_at >= ${idx}"));
            date_binds.push(from_date);
            idx += 1;
        }
        if let Some(to_date) = filter.to_date {
            clauses.push(format!("created_at <= ${idx}"));
            date_binds.push(to_date);
            idx += 1;
        }

        let where_clause = if clauses.is_empty() {
            String::from("TRUE")
        } else {
            clauses.join(" AND ")
        };

        let mut count_query = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM transactions WHERE {where_clause}"
        ));
        for bind in &string_binds {
            count_query = count_query.bind(bind);
        }
        for bind in &date_binds {
            count_query = count_query.bind(bind);
        }
        let total_elements = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let limit_param = idx;
        let offset_param = idx + 1;
        let mut select_query = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE {where_clause} \
             ORDER BY created_at DESC LIMIT ${limit_param} OFFSET ${offset_param}"
        ));
        for bind in &string_binds {
            select_query = select_query.bind(bind);
        }
        for bind in &date_binds {
            select_query = select_query.bind(bind);
        }
        select_query = select_query.bind(i64::from(size)).bind(i64::from(page) * i64::from(size));

        let rows = select_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let content = rows.iter().map(row_to_transaction).collect::<CoreResult<Vec<_>>>()?;

        Ok(Page {
            content,
            page,
            size,
            total_elements: total_elements.max(0) as u64,
        })
    }

    async fn completed_volume_since(
        &self,
        account_id: &AccountId,
        transaction_type: TransactionType,
        since: DateTime<Utc>,
    ) -> CoreResult<Decimal> {
        // A deposit's account sits on `to_account_id` (`from_account_id` is
        // the `EXTERNAL` sentinel); every other transaction type books the
        // limited account on `from_account_id`.
        let account_column = match transaction_type {
            TransactionType::Deposit => "to_account_id",
            TransactionType::Transfer | TransactionType::Withdrawal | TransactionType::Reversal => "from_account_id",
        };
        let sum: Option<Decimal> = sqlx::query_scalar(&format!(
            "SELECT SUM(amount) FROM transactions WHERE {account_column} = $1 AND type = $2 AND status = 'COMPLETED' \
             AND created_at >= $3"
        ))
        .bind(account_id.as_str())
        .bind(type_tag(transaction_type))
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(sum.unwrap_or(Decimal::ZERO))
    }

    async fn find_stuck_processing(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE status = 'PROCESSING' \
             AND processing_state IN ('INITIATED', 'DEBIT_APPLIED') AND created_at < $1"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
        rows.iter().map(row_to_transaction).collect()
    }
}
