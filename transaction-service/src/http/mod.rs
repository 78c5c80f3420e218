//! The Transaction HTTP Facade (spec §2 component 9, §6 endpoint table).

pub mod dto;
pub mod transactions;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::JwtSecret;
use crate::cache::HistoryCache;
use crate::client::ResilientAccountClient;
use crate::observer::Observer;
use crate::orchestrator::TransactionOrchestrator;
use crate::store::SharedTransactionRepository;

/// Default and maximum page sizes for history/search pagination (spec §6
/// gives no numbers; these mirror the Account Service's own defaults).
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Shared state reachable from every handler: the orchestrator it delegates
/// writes to, the store and cache it reads from directly for history/search
/// and single-transaction lookups, the resilient client for ownership
/// checks against the Account Service, and the secret the
/// [`crate::auth::AuthenticatedPrincipal`] extractor verifies tokens with.
///
/// `Clone` is implemented by hand rather than derived, the same reason as
/// `account-service`'s `AppState`: every field here is already cheap to
/// clone (an `Arc` or a small owned string), but deriving would tie that to
/// `O: Clone` holding for the whole struct rather than just the fields that
/// actually mention it.
pub struct AppState<O: Observer + Clone + 'static> {
    pub orchestrator: Arc<TransactionOrchestrator<O>>,
    pub store: SharedTransactionRepository,
    pub cache: Arc<HistoryCache>,
    pub account_client: Arc<ResilientAccountClient>,
    pub jwt_secret: JwtSecret,
}

impl<O: Observer + Clone + 'static> Clone for AppState<O> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            account_client: Arc::clone(&self.account_client),
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

impl<O: Observer + Clone + 'static> FromRef<AppState<O>> for JwtSecret {
    fn from_ref(state: &AppState<O>) -> Self {
        state.jwt_secret.clone()
    }
}

pub fn router<O: Observer + Clone + 'static>(state: AppState<O>) -> Router {
    Router::new()
        .route("/api/transactions/transfer", post(transactions::transfer::<O>))
        .route("/api/transactions/deposit", post(transactions::deposit::<O>))
        .route("/api/transactions/withdraw", post(transactions::withdraw::<O>))
        .route("/api/transactions/:id/reverse", post(transactions::reverse::<O>))
        .route("/api/transactions/:id", get(transactions::get_transaction::<O>))
        .route("/api/transactions/account/:id", get(transactions::history::<O>))
        .route("/api/transactions/search", get(transactions::search::<O>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
