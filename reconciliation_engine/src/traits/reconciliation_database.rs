use chrono::{DateTime, Duration, Utc};
use cpg_common::Money;
use provider_client::ProviderApiError;
use thiserror::Error;

use crate::db_types::{Cart, NewOrder, Order, OrderId, OrderLine, OrderNote, OrderStatus};

/// Outcome of the compare-and-set claim of a payment id on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// The payment id was written. This caller owns the finalization.
    Claimed,
    /// The same payment id was already stored. A concurrent or earlier signal got there first.
    AlreadyClaimed,
    /// A different payment id is stored on the order.
    Conflict(String),
}

/// The write set for an approval transition. Applied atomically together with the fulfilment
/// side effects by [`ReconciliationDatabase::apply_payment_approval`].
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub payment_id: String,
    pub transaction_id: Option<String>,
    /// `Authorized`, `Flagged` or `Captured`, depending on risk flags and capture mode.
    pub new_status: OrderStatus,
    pub session_id: Option<String>,
    pub payment_method: Option<String>,
    pub save_card: bool,
    pub note: String,
}

/// Storage contract for the reconciliation engine.
///
/// Lookups exist for every correlation key a completion signal can carry. The transition
/// methods are transactional: the status change, the audit note and (for approvals) the stock
/// decrement commit together or not at all.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order, keyed on its order number. Idempotent.
    /// Returns `false` in the second element if the order already existed.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentEngineError>;

    /// Stores a new order and pins the given payment id to it in the same transaction. If an
    /// order already holds the payment id, that order is returned instead and nothing is
    /// inserted, so two entry points synthesizing concurrently converge on one record.
    async fn insert_order_for_payment(
        &self,
        order: NewOrder,
        payment_id: &str,
    ) -> Result<(Order, bool), PaymentEngineError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentEngineError>;

    async fn fetch_order_by_reference(&self, reference: &OrderId) -> Result<Option<Order>, PaymentEngineError>;

    async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentEngineError>;

    async fn fetch_order_by_session_id(&self, session_id: &str) -> Result<Option<Order>, PaymentEngineError>;

    /// All orders for the given customer email still awaiting payment, created within `window`
    /// of `now`. Used by the last-resort correlation heuristic.
    async fn fetch_pending_orders_for_email(
        &self,
        email: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>, PaymentEngineError>;

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, PaymentEngineError>;

    async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, PaymentEngineError>;

    /// Atomically claim the payment id for the order: the write only lands if the order has no
    /// payment id yet, or already holds this one.
    async fn claim_payment_id(&self, order_id: i64, payment_id: &str) -> Result<ClaimResult, PaymentEngineError>;

    /// Apply an approval transition, guarded on the order still being in a pending status.
    ///
    /// In a single transaction: the status moves to `transition.new_status`, the correlation
    /// metadata is written, the note is appended, and stock is decremented for the order's
    /// product lines. Returns `None` without touching anything if the order has already left
    /// its pending status, which makes replays harmless.
    async fn apply_payment_approval(
        &self,
        order_id: i64,
        transition: PaymentTransition,
    ) -> Result<Option<Order>, PaymentEngineError>;

    async fn mark_captured(&self, order_id: i64, transaction_id: &str, note: &str)
        -> Result<Order, PaymentEngineError>;

    async fn mark_voided(
        &self,
        order_id: i64,
        transaction_id: Option<&str>,
        note: &str,
    ) -> Result<Order, PaymentEngineError>;

    /// Record a decline: stores the payment id for the audit trail and appends the provider's
    /// response summary. No fulfilment side effects.
    async fn mark_declined(&self, order_id: i64, payment_id: &str, note: &str) -> Result<Order, PaymentEngineError>;

    /// Accumulate a refunded amount and move the order to `Refunded` or `PartiallyRefunded`.
    async fn record_refund(
        &self,
        order_id: i64,
        amount: Money,
        transaction_id: Option<&str>,
        new_status: OrderStatus,
        note: &str,
    ) -> Result<Order, PaymentEngineError>;

    async fn append_order_note(&self, order_id: i64, note: &str) -> Result<OrderNote, PaymentEngineError>;

    async fn fetch_cart(&self, token: &str) -> Result<Option<Cart>, PaymentEngineError>;

    async fn clear_cart(&self, token: &str) -> Result<(), PaymentEngineError>;
}

#[derive(Debug, Error)]
pub enum PaymentEngineError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("No order could be matched to payment {0}")]
    OrderNotFoundForPayment(String),
    #[error("The order key supplied for order {0} does not match the stored key")]
    OrderKeyMismatch(String),
    #[error("Payment {incoming} cannot be applied to order {order_id}, which is pinned to payment {stored}")]
    PaymentIdConflict { order_id: i64, stored: String, incoming: String },
    #[error("The provider reports payment for order {order_id} as {status}, which conflicts with this operation")]
    RemoteStateConflict { order_id: i64, status: String },
    #[error("A capture arrived for order {0} before its authorization was applied")]
    PrematureCapture(i64),
    #[error("Cannot synthesize an order from an empty cart")]
    CartEmpty,
    #[error("Order {0} has no payment pinned to it")]
    NoPaymentForOrder(i64),
    #[error("Refund of {requested} exceeds the outstanding amount {outstanding}")]
    RefundExceedsOutstanding { requested: Money, outstanding: Money },
    #[error("Payment provider error: {0}")]
    ProviderError(#[from] ProviderApiError),
}

impl From<sqlx::Error> for PaymentEngineError {
    fn from(e: sqlx::Error) -> Self {
        PaymentEngineError::DatabaseError(e.to_string())
    }
}
