//! The Account HTTP Facade (spec §2 component 4, §6 endpoint table).

pub mod accounts;
pub mod dto;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::JwtSecret;
use crate::engine::{AccountLedgerBackend, BalanceEngine};

/// Shared state reachable from every handler: the engine and the secret the
/// [`crate::auth::AuthenticatedPrincipal`] extractor verifies tokens with.
///
/// `Clone` is implemented by hand rather than derived: `#[derive(Clone)]`
/// would add a spurious `B: Clone` bound even though only the `Arc` needs
/// cloning, and most real backends (e.g. `PostgresLedgerBackend`, wrapping a
/// connection pool) have no reason to implement `Clone` themselves.
pub struct AppState<B: AccountLedgerBackend> {
    pub engine: Arc<BalanceEngine<B>>,
    pub jwt_secret: JwtSecret,
}

impl<B: AccountLedgerBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

impl<B: AccountLedgerBackend> FromRef<AppState<B>> for JwtSecret {
    fn from_ref(state: &AppState<B>) -> Self {
        state.jwt_secret.clone()
    }
}

impl<B: AccountLedgerBackend> FromRef<AppState<B>> for Arc<BalanceEngine<B>> {
    fn from_ref(state: &AppState<B>) -> Self {
        state.engine.clone()
    }
}

pub fn router<B: AccountLedgerBackend + 'static>(state: AppState<B>) -> Router {
    Router::new()
        .route("/api/accounts", post(accounts::create_account::<B>))
        .route("/api/accounts/:id", get(accounts::get_account::<B>))
        .route("/api/accounts/:id/balance", put(accounts::set_balance::<B>))
        .route(
            "/api/accounts/:id/balance-operations",
            post(accounts::apply_balance_operation::<B>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
