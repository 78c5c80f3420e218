//! Persistent state for the Account Service: the Account Store and the
//! Balance Operation Store (spec §2.1-2.2), plus an in-memory test double of
//! the same [`crate::engine::AccountLedgerBackend`] contract.

pub mod memory;
pub mod postgres;
