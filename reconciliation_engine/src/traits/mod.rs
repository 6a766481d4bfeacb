//! Interface contracts for the engine's backends.
//!
//! * [`ReconciliationDatabase`] defines the storage behaviour the engine needs: order lookups by
//!   each correlation key, the compare-and-set payment-id claim, the transactional transition
//!   primitives, and the storefront operations (cart, stock) that fulfilment side effects touch.
//! * [`PaymentProvider`] defines the remote provider calls. The production implementation lives
//!   in `provider_client`; tests substitute mocks.

mod payment_provider;
mod reconciliation_database;

pub use payment_provider::PaymentProvider;
pub use reconciliation_database::{ClaimResult, PaymentEngineError, PaymentTransition, ReconciliationDatabase};
