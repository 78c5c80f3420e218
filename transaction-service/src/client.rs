//! The Resilient Account Client (spec §4.3): every outbound call from
//! `transaction-service` to the Account HTTP Facade goes through here.
//!
//! Three composed layers, per spec §9's design note ("timeout wraps retry
//! wraps circuit breaker. Each layer takes a function and returns a function
//! with identical signature"): [`CircuitBreaker::guard`] wraps the retry
//! loop in [`ResilientAccountClient::call_with_retry`], which wraps a single
//! timed-out attempt in [`ResilientAccountClient::call_once`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ledger_core::{Account, AccountId, AccountType, OperationId, OperationStatus, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::ResilienceSettings;

/// Error taxonomy surfaced to the Orchestrator (spec §4.3). Only
/// [`ClientError::AccountServiceUnavailable`] is treated as a partial-failure
/// signal requiring compensation or manual-action marking; the other two are
/// ordinary business outcomes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("account not found")]
    AccountNotFound,
    #[error("business rejection: {0}")]
    BusinessRejection(String),
    #[error("account service unavailable")]
    AccountServiceUnavailable,
}

/// Classification of a single attempt's outcome, used by both the retry
/// loop and the circuit breaker's sliding window. A transport failure or a
/// 5xx counts against the breaker; a 4xx business rejection does not — it's
/// a correct answer from a healthy service, not a sign of distress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    TransportFailure,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    phase: Phase,
    /// Sliding window of the last `window_size` transport-relevant outcomes
    /// (`true` = success). Business outcomes don't enter this window.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_probes_remaining: usize,
}

/// Per-endpoint circuit breaker: 15-call sliding window, opens at 60%
/// failure rate after 8 minimum calls, stays open 45s, half-open admits 3
/// probes (spec §4.3 defaults; all tunable via [`ResilienceSettings`]).
pub struct CircuitBreaker {
    window_size: usize,
    minimum_calls: usize,
    failure_rate_threshold: f64,
    open_duration: Duration,
    half_open_probes: usize,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(settings: &ResilienceSettings) -> Self {
        Self {
            window_size: settings.circuit_window_size,
            minimum_calls: settings.circuit_minimum_calls,
            failure_rate_threshold: settings.circuit_failure_rate_threshold,
            open_duration: settings.circuit_open_duration(),
            half_open_probes: settings.circuit_half_open_probes,
            state: Mutex::new(BreakerState {
                phase: Phase::Closed,
                window: VecDeque::with_capacity(settings.circuit_window_size),
                opened_at: None,
                half_open_probes_remaining: 0,
            }),
        }
    }

    /// Returns `Err` immediately if the breaker is open (and the open
    /// window hasn't elapsed yet); otherwise admits the call, possibly as
    /// one of the limited half-open probes.
    async fn admit(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        match state.phase {
            Phase::Closed => Ok(()),
            Phase::Open => {
                let opened_at = state.opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= self.open_duration {
                    state.phase = Phase::HalfOpen;
                    state.half_open_probes_remaining = self.half_open_probes;
                    state.half_open_probes_remaining -= 1;
                    Ok(())
                } else {
                    Err(ClientError::AccountServiceUnavailable)
                }
            }
            Phase::HalfOpen => {
                if state.half_open_probes_remaining > 0 {
                    state.half_open_probes_remaining -= 1;
                    Ok(())
                } else {
                    Err(ClientError::AccountServiceUnavailable)
                }
            }
        }
    }

    async fn record(&self, outcome: Outcome) {
        let mut state = self.state.lock().await;
        match outcome {
            Outcome::Business => {
                // A business rejection proves the endpoint is reachable and
                // functioning; in half-open it closes the breaker outright.
                if state.phase == Phase::HalfOpen {
                    state.phase = Phase::Closed;
                    state.window.clear();
                }
                return;
            }
            Outcome::Success => {
                if state.phase == Phase::HalfOpen {
                    state.phase = Phase::Closed;
                    state.window.clear();
                }
                push_bounded(&mut state.window, true, self.window_size);
            }
            Outcome::TransportFailure => {
                if state.phase == Phase::HalfOpen {
                    state.phase = Phase::Open;
                    state.opened_at = Some(Instant::now());
                    state.window.clear();
                    return;
                }
                push_bounded(&mut state.window, false, self.window_size);
            }
        }

        if state.phase == Phase::Closed && state.window.len() >= self.minimum_calls {
            let failures = state.window.iter().filter(|ok| !**ok).count();
            let failure_rate = failures as f64 / state.window.len() as f64;
            if failure_rate >= self.failure_rate_threshold {
                state.phase = Phase::Open;
                state.opened_at = Some(Instant::now());
            }
        }
    }

    /// Runs `attempt` under the breaker: admits or short-circuits, then
    /// records whatever the attempt reports via `classify`.
    async fn guard<T, F, Fut>(&self, attempt: F) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.admit().await?;
        let result = attempt().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(ClientError::AccountServiceUnavailable) => Outcome::TransportFailure,
            Err(ClientError::AccountNotFound) | Err(ClientError::BusinessRejection(_)) => Outcome::Business,
        };
        self.record(outcome).await;
        result
    }
}

fn push_bounded(window: &mut VecDeque<bool>, value: bool, capacity: usize) {
    if window.len() == capacity {
        window.pop_front();
    }
    window.push_back(value);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountWire {
    id: String,
    owner_id: String,
    account_type: AccountType,
    balance: Decimal,
    credit_limit: Option<Decimal>,
    interest_rate: Option<Decimal>,
    version: u64,
    active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<AccountWire> for Account {
    fn from(w: AccountWire) -> Self {
        Account {
            id: AccountId::from(w.id),
            owner_id: w.owner_id,
            account_type: w.account_type,
            balance: w.balance,
            credit_limit: w.credit_limit,
            interest_rate: w.interest_rate,
            version: w.version,
            active: w.active,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyOperationWireRequest<'a> {
    operation_id: &'a str,
    delta: Decimal,
    transaction_id: Option<uuid::Uuid>,
    reason: &'a str,
    allow_negative: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyOperationWireResponse {
    new_balance: Decimal,
    version: u64,
    applied: bool,
    status: OperationStatus,
}

/// Outcome of a balance operation call, as the Orchestrator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOperationOutcome {
    pub applied: bool,
    pub new_balance: Decimal,
    pub version: u64,
    pub status: OperationStatus,
}

pub struct ResilientAccountClient {
    http: reqwest::Client,
    base_url: String,
    service_token: String,
    resilience: ResilienceSettings,
    read_breaker: Arc<CircuitBreaker>,
    write_breaker: Arc<CircuitBreaker>,
}

impl ResilientAccountClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, service_token: impl Into<String>, resilience: ResilienceSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            service_token: service_token.into(),
            read_breaker: Arc::new(CircuitBreaker::new(&resilience)),
            write_breaker: Arc::new(CircuitBreaker::new(&resilience)),
            resilience,
        }
    }

    pub async fn get_account(&self, account_id: &AccountId) -> Result<Account, ClientError> {
        let breaker = Arc::clone(&self.read_breaker);
        let url = format!("{}/api/accounts/{}", self.base_url, account_id.as_str());
        breaker
            .guard(|| self.call_with_retry(move || self.get_once(url.clone())))
            .await
    }

    pub async fn apply_balance_operation(
        &self,
        account_id: &AccountId,
        operation_id: &OperationId,
        delta: Decimal,
        transaction_id: Option<TransactionId>,
        reason: &str,
        allow_negative: bool,
    ) -> Result<RemoteOperationOutcome, ClientError> {
        let breaker = Arc::clone(&self.write_breaker);
        let url = format!("{}/api/accounts/{}/balance-operations", self.base_url, account_id.as_str());
        let operation_id = operation_id.as_str().to_string();
        let reason = reason.to_string();
        breaker
            .guard(|| {
                self.call_with_retry(move || {
                    self.apply_once(url.clone(), operation_id.clone(), delta, transaction_id, reason.clone(), allow_negative)
                })
            })
            .await
    }

    /// Retry loop: up to `max_retry_attempts`, exponential backoff starting
    /// at `retry_base_backoff`, only for transport errors — a business
    /// rejection (4xx) returns on the first attempt untouched.
    async fn call_with_retry<T, F, Fut>(&self, mut attempt: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut delay = self.resilience.retry_base_backoff();
        for attempt_number in 0..self.resilience.max_retry_attempts {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(ClientError::AccountServiceUnavailable) => {
                    if attempt_number + 1 == self.resilience.max_retry_attempts {
                        return Err(ClientError::AccountServiceUnavailable);
                    }
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(other) => return Err(other),
            }
        }
        Err(ClientError::AccountServiceUnavailable)
    }

    async fn get_once(&self, url: String) -> Result<Account, ClientError> {
        let response = tokio::time::timeout(
            self.resilience.call_timeout(),
            self.http.get(&url).bearer_auth(&self.service_token).send(),
        )
        .await
        .map_err(|_| ClientError::AccountServiceUnavailable)?
        .map_err(|_| ClientError::AccountServiceUnavailable)?;

        self.classify_response(response).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_once(
        &self,
        url: String,
        operation_id: String,
        delta: Decimal,
        transaction_id: Option<TransactionId>,
        reason: String,
        allow_negative: bool,
    ) -> Result<RemoteOperationOutcome, ClientError> {
        let body = ApplyOperationWireRequest {
            operation_id: &operation_id,
            delta,
            transaction_id: transaction_id.map(|t| t.as_uuid()),
            reason: &reason,
            allow_negative,
        };
        let response = tokio::time::timeout(
            self.resilience.call_timeout(),
            self.http
                .post(&url)
                .bearer_auth(&self.service_token)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| ClientError::AccountServiceUnavailable)?
        .map_err(|_| ClientError::AccountServiceUnavailable)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ClientError::AccountServiceUnavailable);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::AccountNotFound);
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::BusinessRejection(body));
        }
        let wire: ApplyOperationWireResponse = response
            .json()
            .await
            .map_err(|e| ClientError::BusinessRejection(e.to_string()))?;
        Ok(RemoteOperationOutcome {
            applied: wire.applied,
            new_balance: wire.new_balance,
            version: wire.version,
            status: wire.status,
        })
    }

    async fn classify_response(&self, response: reqwest::Response) -> Result<Account, ClientError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(ClientError::AccountServiceUnavailable);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::AccountNotFound);
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::BusinessRejection(body));
        }
        let wire: AccountWire = response
            .json()
            .await
            .map_err(|e| ClientError::BusinessRejection(e.to_string()))?;
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ResilienceSettings {
        ResilienceSettings {
            call_timeout_secs: 1,
            max_retry_attempts: 3,
            retry_base_backoff_secs: 0,
            circuit_window_size: 5,
            circuit_minimum_calls: 3,
            circuit_failure_rate_threshold: 0.6,
            circuit_open_duration_secs: 60,
            circuit_half_open_probes: 1,
        }
    }

    #[tokio::test]
    async fn breaker_opens_after_failure_threshold_and_short_circuits() {
        let breaker = CircuitBreaker::new(&settings());
        for _ in 0..3 {
            let result: Result<(), ClientError> = breaker.guard(|| async { Err(ClientError::AccountServiceUnavailable) }).await;
            assert!(result.is_err());
        }
        let result: Result<(), ClientError> = breaker.guard(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(ClientError::AccountServiceUnavailable)));
    }

    #[tokio::test]
    async fn business_rejection_does_not_trip_breaker() {
        let breaker = CircuitBreaker::new(&settings());
        for _ in 0..10 {
            let result: Result<(), ClientError> = breaker
                .guard(|| async { Err(ClientError::BusinessRejection("nope".to_string())) })
                .await;
            assert!(result.is_err());
        }
        let result: Result<(), ClientError> = breaker.guard(|| async { Ok(()) }).await;
        assert!(result.is_ok());
    }
}
