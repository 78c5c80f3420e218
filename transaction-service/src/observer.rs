//! Cross-cutting concerns (spec §9: "prefer explicit interface parameters —
//! an `Observer` handed to the Orchestrator — so the core can be tested
//! without a metrics backend"). The Orchestrator calls these at each
//! meaningful transition; a real process wires in something backed by
//! `tracing` events (or metrics, if that ever needs to be added), tests
//! wire in nothing at all and get the no-op default.

use ledger_core::{ProcessingState, TransactionId, TransactionType};

/// Notified at orchestration milestones. Every method has a default no-op
/// body so a caller can override only what it cares about.
pub trait Observer: Send + Sync {
    fn transaction_created(&self, _id: TransactionId, _transaction_type: TransactionType) {}
    fn leg_applied(&self, _id: TransactionId, _leg: &str) {}
    fn leg_rejected(&self, _id: TransactionId, _leg: &str, _reason: &str) {}
    fn compensated(&self, _id: TransactionId) {}
    fn manual_action_required(&self, _id: TransactionId) {}
    fn precheck_aborted(&self, _reason: &str) {}
}

/// The default observer: every event goes to `tracing`, nothing else. This
/// is what every service binary wires in; tests that don't care about
/// observability use [`NoopObserver`] instead, or this same one (events are
/// harmless either way).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn transaction_created(&self, id: TransactionId, transaction_type: TransactionType) {
        tracing::info!(transaction_id = %id, ?transaction_type, "transaction created");
    }

    fn leg_applied(&self, id: TransactionId, leg: &str) {
        tracing::info!(transaction_id = %id, leg, "leg applied");
    }

    fn leg_rejected(&self, id: TransactionId, leg: &str, reason: &str) {
        tracing::warn!(transaction_id = %id, leg, reason, "leg rejected");
    }

    fn compensated(&self, id: TransactionId) {
        tracing::warn!(transaction_id = %id, "transaction compensated after partial failure");
    }

    fn manual_action_required(&self, id: TransactionId) {
        tracing::error!(transaction_id = %id, "compensation failed, manual action required");
    }

    fn precheck_aborted(&self, reason: &str) {
        tracing::info!(reason, "transaction aborted at pre-check, no row created");
    }
}

/// Observes nothing. Handy in unit tests that assert on the returned
/// [`ledger_core::Transaction`] and don't want log noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
