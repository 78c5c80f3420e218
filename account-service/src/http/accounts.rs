use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use ledger_core::{AccountId, CoreError, OperationId, TransactionId};

use crate::auth::AuthenticatedPrincipal;
use crate::engine::{AccountLedgerBackend, ApplyOperationRequest, BalanceEngine};
use crate::error::AppError;
use crate::http::dto::{
    AccountResponse, ApplyBalanceOperationRequest, ApplyBalanceOperationResponse, CreateAccountRequest,
    SetBalanceRequest,
};

pub async fn get_account<B: AccountLedgerBackend>(
    State(engine): State<Arc<BalanceEngine<B>>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, AppError> {
    let account_id = AccountId::from(id);
    let account = engine
        .get_account(&account_id)
        .await
        .map_err(|e| AppError::new(e).with_path(format!("/api/accounts/{account_id}")))?;

    // Reads require exact ownership; spec §4.4 forbids leaking 404 to tell a
    // prober whether an account exists, so a non-owner gets FORBIDDEN too.
    if !principal.may_act_as(&account.owner_id) {
        return Err(AppError::new(CoreError::Forbidden(
            "principal does not own this account".to_string(),
        ))
        .with_path(format!("/api/accounts/{account_id}")));
    }

    Ok(Json(account.into()))
}

pub async fn create_account<B: AccountLedgerBackend>(
    State(engine): State<Arc<BalanceEngine<B>>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    // A principal may only open an account in its own name, unless privileged.
    if !principal.may_act_as(&body.owner_id) {
        return Err(AppError::new(CoreError::Forbidden(
            "principal may not create an account for another owner".to_string(),
        ))
        .with_path("/api/accounts".to_string()));
    }
    let account = engine
        .create_account(body.owner_id, body.account_type, body.credit_limit, body.interest_rate)
        .await
        .map_err(|e| AppError::new(e).with_path("/api/accounts".to_string()))?;
    Ok(Json(account.into()))
}

pub async fn apply_balance_operation<B: AccountLedgerBackend>(
    State(engine): State<Arc<BalanceEngine<B>>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(body): Json<ApplyBalanceOperationRequest>,
) -> Result<Json<ApplyBalanceOperationResponse>, AppError> {
    let account_id = AccountId::from(id);
    let path = format!("/api/accounts/{account_id}/balance-operations");

    // This endpoint is called by the Resilient Account Client on behalf of
    // the orchestrator (principal carries INTERNAL_SERVICE) or, for direct
    // integrations, by a privileged operator. Ordinary owners never hit it
    // directly; ownership is enforced by the caller that composed the
    // request, not re-derived from the account's owner_id here, since the
    // account may not exist yet at authorization time.
    if !principal.is_privileged() {
        return Err(AppError::new(CoreError::Forbidden(
            "balance operations require a privileged principal".to_string(),
        ))
        .with_path(path));
    }

    let outcome = engine
        .apply(ApplyOperationRequest {
            account_id: account_id.clone(),
            operation_id: OperationId::new(body.operation_id.clone()),
            delta: body.delta,
            transaction_id: body.transaction_id.map(TransactionId::from_uuid),
            reason: body.reason,
            allow_negative: body.allow_negative,
        })
        .await
        .map_err(|e| AppError::new(e).with_path(path))?;

    Ok(Json(ApplyBalanceOperationResponse {
        account_id: account_id.as_str().to_string(),
        operation_id: body.operation_id,
        applied: outcome.applied,
        new_balance: outcome.new_balance,
        version: outcome.version,
        status: outcome.status,
    }))
}

pub async fn set_balance<B: AccountLedgerBackend>(
    State(engine): State<Arc<BalanceEngine<B>>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
    Json(body): Json<SetBalanceRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account_id = AccountId::from(id);
    let path = format!("/api/accounts/{account_id}/balance");
    if !principal.is_privileged() {
        return Err(AppError::new(CoreError::Forbidden(
            "direct balance writes require a privileged principal".to_string(),
        ))
        .with_path(path));
    }
    let account = engine
        .set_balance(&account_id, body.balance)
        .await
        .map_err(|e| AppError::new(e).with_path(path))?;
    Ok(Json(account.into()))
}
