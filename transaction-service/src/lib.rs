//! Transaction Service: orchestrates money movement across two accounts
//! (or one account and the `EXTERNAL` sentinel) by driving the Account
//! Service's Balance Engine through its two-leg-plus-compensation protocol.
//!
//! [`orchestrator::TransactionOrchestrator`] is the only writer of the
//! Transaction Store; every other module here exists to get an
//! authenticated HTTP request to it, resolve what it needs along the way
//! (accounts via [`client::ResilientAccountClient`], caps via
//! [`limits::LimitEvaluator`]), and render its result back out, per spec
//! §2 and §4.2.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod observer;
pub mod orchestrator;
pub mod store;
pub mod sweeper;

pub use error::AppError;
pub use orchestrator::TransactionOrchestrator;
