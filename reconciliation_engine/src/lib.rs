//! Payment Finalization & Reconciliation Engine
//!
//! This library owns the server-side source of truth for payment outcomes. The remote payment
//! provider reports completion over three independent channels (customer redirect, webhook,
//! verification poll), all of which race each other and may arrive more than once. The engine's
//! job is to correlate each completion signal with a local order, apply the resulting state
//! transition exactly once, and keep the local order in step with the provider even when the
//! channels arrive out of order or the order record has gone missing.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You
//!    should never need to access the database directly; use the public API instead. The
//!    exception is the data types used in the database, defined in the public `db_types` module.
//! 2. The engine public API ([`mod@rce_api`]). [`ReconciliationApi`] carries the correlation
//!    resolver, the order synthesizer and the payment state machine. [`CompensationApi`] carries
//!    the merchant-initiated capture, void and refund operations. Backends implement the traits
//!    in [`mod@traits`] to plug in.

pub mod db_types;
pub mod helpers;
mod rce_api;
mod sqlite;
pub mod traits;

pub mod signal_objects;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use rce_api::{
    compensation_api::{CompensationApi, CompensationOutcome},
    reconciliation_api::{FinalizeOutcome, ReconciliationApi, WebhookOutcome},
    resolver::{ResolutionStrategy, ResolvedOrder},
};
