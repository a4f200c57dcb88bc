//! Core types and service wiring for the airbeacon air-quality and traffic restriction notifier.

/// Runtime configuration shared by all components.
pub mod config;
/// Notification dispatch for broadcast and per-recipient template pushes.
pub mod dispatch;
/// Idempotency gate that suppresses duplicate notifications.
pub mod gate;
/// Domain models for readings, forecasts, and restrictions.
pub mod model;
/// Traffic restriction policy derived from pollution and the calendar.
pub mod policy;
/// Traits describing the external collaborators.
pub mod ports;
/// Markdown report rendering.
pub mod report;
/// High-level service facade running one notification cycle.
pub mod service;
/// Small JSON file store used for the persisted state.
pub mod store;
/// Subscriber list synchronisation and persistence.
pub mod subscribers;
/// HTTP helpers with bounded retry and error classification.
pub mod transport;

/// In-memory fake ports for tests.
#[cfg(test)]
pub mod fake;

pub use config::*;
pub use model::*;
pub use ports::*;
pub use service::*;
