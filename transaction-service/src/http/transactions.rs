//! Handlers for the Transaction HTTP Facade (spec §6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use ledger_core::{AccountId, CoreError, TransactionId};

use crate::auth::AuthenticatedPrincipal;
use crate::cache::HistoryPageKey;
use crate::client::ResilientAccountClient;
use crate::error::AppError;
use crate::http::dto::{
    HistoryQuery, PageResponse, ReverseRequestBody, SearchQuery, SingleLegRequestBody, TransactionResponse,
    TransferRequestBody,
};
use crate::observer::Observer;
use crate::orchestrator::{ReverseRequest, SingleLegRequest, TransferRequest};
use crate::store::{SearchFilter, SortOrder, TransactionRepository};

use super::{AppState, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

fn idempotency_key(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn page_size(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE).max(1)
}

pub async fn transfer<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    headers: axum::http::HeaderMap,
    Json(body): Json<TransferRequestBody>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let transaction = state
        .orchestrator
        .transfer(
            &principal,
            TransferRequest {
                from_account_id: AccountId::from(body.from_account_id),
                to_account_id: AccountId::from(body.to_account_id),
                amount: body.amount,
                currency: body.currency,
                description: body.description,
                reference: body.reference,
                idempotency_key: idempotency_key(&headers),
            },
        )
        .await
        .map_err(|e| AppError::from(e).with_path("/api/transactions/transfer".to_string()))?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

pub async fn deposit<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    headers: axum::http::HeaderMap,
    Json(body): Json<SingleLegRequestBody>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let transaction = state
        .orchestrator
        .deposit(&principal, single_leg_request(body, &headers))
        .await
        .map_err(|e| AppError::from(e).with_path("/api/transactions/deposit".to_string()))?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

pub async fn withdraw<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    headers: axum::http::HeaderMap,
    Json(body): Json<SingleLegRequestBody>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let transaction = state
        .orchestrator
        .withdrawal(&principal, single_leg_request(body, &headers))
        .await
        .map_err(|e| AppError::from(e).with_path("/api/transactions/withdraw".to_string()))?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

fn single_leg_request(body: SingleLegRequestBody, headers: &axum::http::HeaderMap) -> SingleLegRequest {
    SingleLegRequest {
        account_id: AccountId::from(body.account_id),
        amount: body.amount,
        currency: body.currency,
        description: body.description,
        reference: body.reference,
        idempotency_key: idempotency_key(headers),
    }
}

pub async fn reverse<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<uuid::Uuid>,
    headers: axum::http::HeaderMap,
    Json(body): Json<ReverseRequestBody>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let path = format!("/api/transactions/{id}/reverse");
    let transaction = state
        .orchestrator
        .reverse(
            &principal,
            ReverseRequest {
                original_transaction_id: TransactionId::from_uuid(id),
                reason: body.reason,
                idempotency_key: idempotency_key(&headers),
            },
        )
        .await
        .map_err(|e| AppError::from(e).with_path(path))?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

pub async fn get_transaction<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let path = format!("/api/transactions/{id}");
    let transaction = state
        .store
        .get(TransactionId::from_uuid(id))
        .await
        .map_err(|e| AppError::from(e).with_path(path.clone()))?;
    if !principal.is_privileged() && principal.name != transaction.created_by {
        return Err(AppError::new(CoreError::Forbidden("caller did not originate this transaction".to_string()))
            .with_path(path));
    }
    Ok(Json(transaction.into()))
}

pub async fn history<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(account_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, AppError> {
    let path = format!("/api/transactions/account/{account_id}");
    let account_id = AccountId::from(account_id);
    enforce_account_ownership(&state.account_client, &principal, &account_id, &path).await?;

    let page = query.page.unwrap_or(0);
    let size = page_size(query.size);
    let sort = SortOrder::parse(query.sort.as_deref().unwrap_or("createdAt,desc"));

    let cache_key = HistoryPageKey {
        account_id: account_id.clone(),
        page,
        size,
        sort: query.sort.clone().unwrap_or_else(|| "createdAt,desc".to_string()),
    };
    if let Some(cached) = state.cache.get::<PageResponse<TransactionResponse>>(&cache_key).await {
        return Ok(Json(cached));
    }

    let result = state
        .store
        .list_by_account(&account_id, page, size, sort)
        .await
        .map_err(|e| AppError::from(e).with_path(path))?;
    let response: PageResponse<TransactionResponse> = result.into();
    state.cache.put(&cache_key, &response).await;
    Ok(Json(response))
}

async fn enforce_account_ownership(
    account_client: &ResilientAccountClient,
    principal: &ledger_core::Principal,
    account_id: &AccountId,
    path: &str,
) -> Result<(), AppError> {
    if principal.is_privileged() {
        return Ok(());
    }
    let account = account_client
        .get_account(account_id)
        .await
        .map_err(|e| map_client_error(e).with_path(path.to_string()))?;
    if !principal.may_act_as(&account.owner_id) {
        return Err(AppError::new(CoreError::Forbidden("caller does not own this account".to_string()))
            .with_path(path.to_string()));
    }
    Ok(())
}

fn map_client_error(err: crate::client::ClientError) -> AppError {
    use crate::client::ClientError;
    let core = match err {
        ClientError::AccountNotFound => CoreError::NotFound("account not found".to_string()),
        ClientError::BusinessRejection(msg) => CoreError::BusinessRejection(msg),
        ClientError::AccountServiceUnavailable => CoreError::UpstreamUnavailable("account service unavailable".to_string()),
    };
    AppError::new(core)
}

pub async fn search<O: Observer + Clone + 'static>(
    State(state): State<AppState<O>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, AppError> {
    let page = query.page.unwrap_or(0);
    let size = page_size(query.size);

    let mut filter = SearchFilter {
        account_id: query.account_id.map(AccountId::from),
        transaction_type: query.transaction_type,
        status: query.status,
        from_date: query.from_date,
        to_date: query.to_date,
        created_by: None,
    };
    // Spec §4.4: non-privileged callers get their filter silently rewritten
    // to their own principal rather than rejected outright.
    if !principal.is_privileged() {
        filter.created_by = Some(principal.name.clone());
    }

    let result = state
        .store
        .search(&filter, page, size)
        .await
        .map_err(|e| AppError::from(e).with_path("/api/transactions/search".to_string()))?;
    Ok(Json(result.into()))
}
