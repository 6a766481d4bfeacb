//! The correlation resolver.
//!
//! Matches a completion signal to a local order by trying a fixed ladder of strategies, from
//! most to least trustworthy. The ladder only ever moves forward: a strategy that finds nothing
//! falls through to the next one, while a strategy that finds contradictory evidence (a wrong
//! order key) aborts the whole resolution.

use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{Order, OrderId},
    signal_objects::CompletionSignal,
    traits::{PaymentEngineError, ReconciliationDatabase},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// The signal carried the local order id (plus the order key, for browser channels).
    ExplicitId,
    /// Matched on the stored checkout session id.
    SessionId,
    /// Matched on the merchant reference attached to the payment.
    Reference,
    /// The payment id was already pinned to an order by an earlier signal.
    PaymentId,
    /// Last resort: a unique recent pending order with the same email and amount.
    EmailAmount,
}

impl Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStrategy::ExplicitId => write!(f, "explicit order id"),
            ResolutionStrategy::SessionId => write!(f, "session id"),
            ResolutionStrategy::Reference => write!(f, "payment reference"),
            ResolutionStrategy::PaymentId => write!(f, "stored payment id"),
            ResolutionStrategy::EmailAmount => write!(f, "email and amount heuristic"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedOrder {
    pub order: Order,
    pub strategy: ResolutionStrategy,
}

pub(crate) async fn resolve_order<B: ReconciliationDatabase>(
    db: &B,
    signal: &CompletionSignal,
    email_window: Duration,
    now: DateTime<Utc>,
) -> Result<Option<ResolvedOrder>, PaymentEngineError> {
    let ids = signal.ids();
    // 1. Explicit order id. Browser-supplied ids must be accompanied by the matching order key;
    //    ids carried inside authenticated server-to-server payloads are trusted as-is.
    if let Some(order_id) = &ids.order_id {
        // Storefronts disagree on whether the metadata id is the internal id or the order
        // number, so a numeric id that misses is retried as a number.
        let order = match order_id.parse::<i64>() {
            Ok(id) => match db.fetch_order_by_id(id).await? {
                Some(order) => Some(order),
                None => db.fetch_order_by_reference(&OrderId(order_id.clone())).await?,
            },
            Err(_) => db.fetch_order_by_reference(&OrderId(order_id.clone())).await?,
        };
        if let Some(order) = order {
            match (&ids.order_key, signal) {
                (Some(key), _) if key != &order.order_key => {
                    warn!("🔎️ Order key mismatch for order id {order_id} on the {} channel", signal.channel());
                    return Err(PaymentEngineError::OrderKeyMismatch(order_id.clone()));
                },
                (None, CompletionSignal::RedirectReturn(_)) => {
                    debug!("🔎️ Ignoring unkeyed explicit order id {order_id} from a redirect");
                },
                _ => return Ok(Some(ResolvedOrder { order, strategy: ResolutionStrategy::ExplicitId })),
            }
        }
    }
    // 2. Checkout session id.
    if let Some(session_id) = &ids.session_id {
        if let Some(order) = db.fetch_order_by_session_id(session_id).await? {
            return Ok(Some(ResolvedOrder { order, strategy: ResolutionStrategy::SessionId }));
        }
    }
    // 3. Merchant reference. References are order numbers, but older storefronts passed the
    //    raw numeric id, so both are tried.
    if let Some(reference) = &ids.reference {
        let order = match db.fetch_order_by_reference(&OrderId(reference.clone())).await? {
            Some(order) => Some(order),
            None => match reference.parse::<i64>() {
                Ok(id) => db.fetch_order_by_id(id).await?,
                Err(_) => None,
            },
        };
        if let Some(order) = order {
            return Ok(Some(ResolvedOrder { order, strategy: ResolutionStrategy::Reference }));
        }
    }
    // 4. A previous signal already pinned this payment to an order.
    if let Some(order) = db.fetch_order_by_payment_id(&ids.payment_id).await? {
        return Ok(Some(ResolvedOrder { order, strategy: ResolutionStrategy::PaymentId }));
    }
    // 5. Heuristic. Only a unique match within the window is accepted.
    if let (Some(email), Some(amount)) = (&ids.customer_email, ids.amount) {
        let candidates = db.fetch_pending_orders_for_email(email, email_window, now).await?;
        let mut matches = candidates.into_iter().filter(|o| o.total_amount == amount);
        match (matches.next(), matches.next()) {
            (Some(order), None) => {
                info!(
                    "🔎️ Payment {} matched order {} by email and amount. Review if this happens often.",
                    ids.payment_id, order.order_number
                );
                return Ok(Some(ResolvedOrder { order, strategy: ResolutionStrategy::EmailAmount }));
            },
            (Some(_), Some(_)) => {
                warn!(
                    "🔎️ Multiple pending orders for {email} match the amount of payment {}. Refusing to guess.",
                    ids.payment_id
                );
            },
            _ => {},
        }
    }
    debug!("🔎️ No order matched payment {} on the {} channel", ids.payment_id, signal.channel());
    Ok(None)
}
