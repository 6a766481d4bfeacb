use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use provider_client::{PaymentStatus, ProviderPayment, WebhookEvent};

use crate::{
    db_types::{LineKind, NewOrder, NewOrderLine, Order, OrderStatus},
    helpers,
    rce_api::resolver::{self, ResolvedOrder},
    signal_objects::{CompletionSignal, RequestContext},
    traits::{ClaimResult, PaymentEngineError, PaymentTransition, ReconciliationDatabase},
};

/// Result of pushing a payment outcome at an order.
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    /// The transition was applied by this call, side effects included.
    Applied(Order),
    /// Another signal got there first. Nothing was changed.
    AlreadyApplied(Order),
    /// The payment was not approved. The order was marked declined.
    Declined(Order),
}

impl FinalizeOutcome {
    pub fn order(&self) -> &Order {
        match self {
            FinalizeOutcome::Applied(o) | FinalizeOutcome::AlreadyApplied(o) | FinalizeOutcome::Declined(o) => o,
        }
    }
}

/// Result of applying a webhook event.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Applied(Order),
    /// The event matched an order but changed nothing (replay or stale delivery).
    NoOp(Order),
    /// The event type is not one we track.
    Ignored,
}

/// `ReconciliationApi` is the primary API for correlating payment completion signals with local
/// orders and driving each order's payment state machine.
pub struct ReconciliationApi<B> {
    db: B,
    email_match_window: Duration,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, email_match_window: Duration) -> Self {
        Self { db, email_match_window }
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationDatabase
{
    /// Store a brand-new order coming in from a checkout submission. Idempotent on the order
    /// number. Returns `false` in the second element if the order already existed.
    pub async fn create_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentEngineError> {
        let (order, created) = self.db.insert_order(order).await?;
        if created {
            debug!("🔄️ Order {} created with id {}", order.order_number, order.id);
        }
        Ok((order, created))
    }

    pub async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, PaymentEngineError> {
        self.db.fetch_order_by_id(order_id).await
    }

    pub async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentEngineError> {
        self.db.fetch_order_by_payment_id(payment_id).await
    }

    /// Run the correlation ladder for the given signal.
    pub async fn resolve_order(
        &self,
        signal: &CompletionSignal,
        now: DateTime<Utc>,
    ) -> Result<Option<ResolvedOrder>, PaymentEngineError> {
        resolver::resolve_order(&self.db, signal, self.email_match_window, now).await
    }

    /// Resolve the order for an approved payment, synthesizing one from the active cart if no
    /// order can be found, then finalize. This is the whole redirect / poll flow in one call.
    pub async fn reconcile_payment(
        &self,
        payment: &ProviderPayment,
        signal: &CompletionSignal,
        ctx: &RequestContext,
    ) -> Result<FinalizeOutcome, PaymentEngineError> {
        let order = match self.resolve_order(signal, ctx.now).await? {
            Some(resolved) => {
                debug!(
                    "🔄️ Payment {} matched order {} via {}",
                    payment.id, resolved.order.order_number, resolved.strategy
                );
                resolved.order
            },
            None => {
                warn!("🔄️ No order found for payment {}. Attempting to synthesize one.", payment.id);
                self.synthesize_order(payment, ctx).await?
            },
        };
        self.finalize_payment(&order, payment, ctx).await
    }

    /// Rebuild a vanished order from the customer's active cart and pin the payment to it, so
    /// the funds reserved at the provider are never orphaned.
    pub async fn synthesize_order(
        &self,
        payment: &ProviderPayment,
        ctx: &RequestContext,
    ) -> Result<Order, PaymentEngineError> {
        if let Some(existing) = self.db.fetch_order_by_payment_id(&payment.id).await? {
            return Ok(existing);
        }
        let token = ctx.cart_token.as_deref().ok_or(PaymentEngineError::CartEmpty)?;
        let cart = self.db.fetch_cart(token).await?.ok_or(PaymentEngineError::CartEmpty)?;
        if cart.items.is_empty() {
            return Err(PaymentEngineError::CartEmpty);
        }
        let mut order =
            NewOrder::new(helpers::new_order_number(), helpers::new_order_key(), payment.currency.clone(), cart.total());
        order.customer_email = payment.customer_email().map(String::from);
        order.session_id = ctx.session_id.clone();
        order.payment_method = payment.source.as_ref().and_then(|s| s.scheme.clone().or(s.source_type.clone()));
        order.save_card = ctx.save_card;
        order.billing_name = payment.customer_name().map(String::from);
        if let Some(address) = payment.billing_address() {
            order.billing_line1 = address.address_line1.clone();
            order.billing_line2 = address.address_line2.clone();
            order.billing_city = address.city.clone();
            order.billing_state = address.state.clone();
            order.billing_postcode = address.zip.clone();
            order.billing_country = address.country.clone();
        }
        order.lines = cart
            .items
            .iter()
            .map(|i| NewOrderLine {
                product_id: Some(i.product_id),
                name: i.name.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
                kind: LineKind::Product,
            })
            .collect();
        if cart.shipping_cost.is_positive() {
            order.lines.push(NewOrderLine {
                product_id: None,
                name: cart.shipping_method.clone().unwrap_or_else(|| "Shipping".to_string()),
                quantity: 1,
                unit_price: cart.shipping_cost,
                kind: LineKind::Shipping,
            });
        }
        let cart_total = cart.total();
        let (order, created) = self.db.insert_order_for_payment(order, &payment.id).await?;
        if created {
            warn!("🔄️ Order {} synthesized from cart {token} for payment {}", order.order_number, payment.id);
            let mut note = format!("Order synthesized from the active cart after payment {} arrived orphaned.", payment.id);
            if cart_total != payment.amount {
                note.push_str(&format!(
                    " Cart total {} differs from the payment amount {}. Review before fulfilment.",
                    cart_total, payment.amount
                ));
            }
            self.db.append_order_note(order.id, &note).await?;
        }
        Ok(order)
    }

    /// Push the payment's outcome at the order. Exactly one caller ever gets `Applied`; replays
    /// and racing channels get `AlreadyApplied`. A different payment already pinned to a
    /// finalized order is a hard conflict.
    pub async fn finalize_payment(
        &self,
        order: &Order,
        payment: &ProviderPayment,
        ctx: &RequestContext,
    ) -> Result<FinalizeOutcome, PaymentEngineError> {
        if !payment.approved {
            return self.decline_order(order, &payment.id, payment.response_summary.as_deref()).await;
        }
        match self.db.claim_payment_id(order.id, &payment.id).await? {
            ClaimResult::Conflict(stored) => {
                return Err(PaymentEngineError::PaymentIdConflict {
                    order_id: order.id,
                    stored,
                    incoming: payment.id.clone(),
                });
            },
            ClaimResult::Claimed | ClaimResult::AlreadyClaimed => {},
        }
        let new_status = if payment.is_flagged() {
            OrderStatus::Flagged
        } else if matches!(payment.status, PaymentStatus::Captured | PaymentStatus::PartiallyCaptured) {
            OrderStatus::Captured
        } else {
            OrderStatus::Authorized
        };
        let note = match new_status {
            OrderStatus::Flagged => format!(
                "Payment {} approved but flagged by the risk engine. Held for manual review.",
                payment.id
            ),
            OrderStatus::Captured => format!("Payment {} approved and captured.", payment.id),
            _ => format!("Payment {} authorized.", payment.id),
        };
        let transition = PaymentTransition {
            payment_id: payment.id.clone(),
            transaction_id: payment.action_id.clone(),
            new_status,
            session_id: ctx.session_id.clone(),
            payment_method: payment.source.as_ref().and_then(|s| s.scheme.clone().or(s.source_type.clone())),
            save_card: ctx.save_card,
            note,
        };
        match self.db.apply_payment_approval(order.id, transition).await? {
            Some(updated) => {
                if let Some(token) = &ctx.cart_token {
                    self.db.clear_cart(token).await?;
                }
                info!("🔄️ Order {} finalized as {} by payment {}", updated.order_number, updated.status, payment.id);
                Ok(FinalizeOutcome::Applied(updated))
            },
            None => {
                let current = self
                    .db
                    .fetch_order_by_id(order.id)
                    .await?
                    .ok_or(PaymentEngineError::OrderIdNotFound(order.id))?;
                debug!("🔄️ Order {} was already finalized as {}", current.order_number, current.status);
                Ok(FinalizeOutcome::AlreadyApplied(current))
            },
        }
    }

    async fn decline_order(
        &self,
        order: &Order,
        payment_id: &str,
        summary: Option<&str>,
    ) -> Result<FinalizeOutcome, PaymentEngineError> {
        if !order.status.is_pending() {
            return Ok(FinalizeOutcome::AlreadyApplied(order.clone()));
        }
        let note = match summary {
            Some(s) => format!("Payment {payment_id} declined. Provider response: {s}"),
            None => format!("Payment {payment_id} declined."),
        };
        let order = self.db.mark_declined(order.id, payment_id, &note).await?;
        info!("🔄️ Order {} marked declined by payment {payment_id}", order.order_number);
        Ok(FinalizeOutcome::Declined(order))
    }

    /// Apply a webhook event to the order it correlates with.
    pub async fn apply_webhook_event(
        &self,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, PaymentEngineError> {
        let signal = CompletionSignal::from(event);
        let Some(resolved) = self.resolve_order(&signal, now).await? else {
            return Err(PaymentEngineError::OrderNotFoundForPayment(event.data.id.clone()));
        };
        let ResolvedOrder { order, strategy } = resolved;
        debug!(
            "🔄️ Webhook {} for payment {} matched order {} via {strategy}",
            event.event_type, event.data.id, order.order_number
        );
        match event.event_type.as_str() {
            "payment_approved" => self.on_payment_approved(order, event).await,
            "payment_captured" => self.on_payment_captured(order, event).await,
            "payment_capture_declined" => {
                let summary = event.data.response_summary.as_deref().unwrap_or("no response summary");
                let note = format!("Capture of payment {} was declined. {summary}", event.data.id);
                self.db.append_order_note(order.id, &note).await?;
                Ok(WebhookOutcome::NoOp(order))
            },
            "payment_voided" | "payment_canceled" => self.on_payment_voided(order, event).await,
            "payment_refunded" => self.on_payment_refunded(order, event).await,
            "payment_declined" | "payment_authentication_failed" => self.on_payment_declined(order, event).await,
            "card_verified" => {
                let note = format!("Card verified for payment {}. No funds were moved.", event.data.id);
                self.db.append_order_note(order.id, &note).await?;
                Ok(WebhookOutcome::NoOp(order))
            },
            other => {
                debug!("🔄️ Ignoring webhook event type {other}");
                Ok(WebhookOutcome::Ignored)
            },
        }
    }

    async fn on_payment_approved(&self, order: Order, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentEngineError> {
        if !order.status.is_pending() {
            // An approval replay for the applied payment is harmless. For any other payment it
            // would silently repoint the order, so it is refused.
            return if order.payment_id.as_deref() == Some(event.data.id.as_str()) {
                Ok(WebhookOutcome::NoOp(order))
            } else {
                Err(PaymentEngineError::PaymentIdConflict {
                    order_id: order.id,
                    stored: order.payment_id.unwrap_or_default(),
                    incoming: event.data.id.clone(),
                })
            };
        }
        if let ClaimResult::Conflict(stored) = self.db.claim_payment_id(order.id, &event.data.id).await? {
            return Err(PaymentEngineError::PaymentIdConflict {
                order_id: order.id,
                stored,
                incoming: event.data.id.clone(),
            });
        }
        let flagged = event.data.risk.flagged;
        let new_status = if flagged { OrderStatus::Flagged } else { OrderStatus::Authorized };
        let note = if flagged {
            format!("Payment {} approved but flagged by the risk engine. Held for manual review.", event.data.id)
        } else {
            match &event.data.action_id {
                Some(a) => format!("Payment {} authorized. Action id {a}.", event.data.id),
                None => format!("Payment {} authorized.", event.data.id),
            }
        };
        let transition = PaymentTransition {
            payment_id: event.data.id.clone(),
            transaction_id: event.data.action_id.clone(),
            new_status,
            session_id: None,
            payment_method: None,
            save_card: false,
            note,
        };
        match self.db.apply_payment_approval(order.id, transition).await? {
            Some(updated) => Ok(WebhookOutcome::Applied(updated)),
            None => {
                let current =
                    self.db.fetch_order_by_id(order.id).await?.ok_or(PaymentEngineError::OrderIdNotFound(order.id))?;
                Ok(WebhookOutcome::NoOp(current))
            },
        }
    }

    async fn on_payment_captured(&self, order: Order, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentEngineError> {
        if !order.authorized {
            // The provider redelivers after the approval webhook lands.
            return Err(PaymentEngineError::PrematureCapture(order.id));
        }
        if order.status == OrderStatus::Captured {
            return Ok(WebhookOutcome::NoOp(order));
        }
        let action_id = event.data.action_id.clone().unwrap_or_else(|| event.data.id.clone());
        let note = match event.data.amount {
            Some(amount) if amount < order.total_amount => format!(
                "Payment {} partially captured: {amount} of {}. Action id {action_id}.",
                event.data.id, order.total_amount
            ),
            _ => format!("Payment {} captured. Action id {action_id}.", event.data.id),
        };
        let order = self.db.mark_captured(order.id, &action_id, &note).await?;
        Ok(WebhookOutcome::Applied(order))
    }

    async fn on_payment_voided(&self, order: Order, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentEngineError> {
        if order.status == OrderStatus::Voided {
            return Ok(WebhookOutcome::NoOp(order));
        }
        let note = match event.event_type.as_str() {
            "payment_canceled" => format!("Payment {} was canceled at the provider.", event.data.id),
            _ => format!("Authorization for payment {} was voided.", event.data.id),
        };
        let order = self.db.mark_voided(order.id, event.data.action_id.as_deref(), &note).await?;
        Ok(WebhookOutcome::Applied(order))
    }

    async fn on_payment_refunded(&self, order: Order, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentEngineError> {
        if event.data.action_id.is_some() && event.data.action_id.as_deref() == order.transaction_id.as_deref() {
            // Action ids are unique per provider action. Seeing a recorded one again is a replay.
            return Ok(WebhookOutcome::NoOp(order));
        }
        let amount = event.data.amount.unwrap_or_else(|| order.outstanding_amount());
        let new_total = order.refunded_total + amount;
        let new_status =
            if new_total >= order.total_amount { OrderStatus::Refunded } else { OrderStatus::PartiallyRefunded };
        let note = match new_status {
            OrderStatus::Refunded => format!("Payment {} refunded in full.", event.data.id),
            _ => format!("Payment {} partially refunded: {amount}.", event.data.id),
        };
        let order =
            self.db.record_refund(order.id, amount, event.data.action_id.as_deref(), new_status, &note).await?;
        Ok(WebhookOutcome::Applied(order))
    }

    async fn on_payment_declined(&self, order: Order, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentEngineError> {
        if !order.status.is_pending() {
            return Ok(WebhookOutcome::NoOp(order));
        }
        let summary = event.data.response_summary.as_deref();
        let reason = if event.event_type == "payment_authentication_failed" {
            "failed 3DS authentication"
        } else {
            "was declined"
        };
        let note = match summary {
            Some(s) => format!("Payment {} {reason}. Provider response: {s}", event.data.id),
            None => format!("Payment {} {reason}.", event.data.id),
        };
        let order = self.db.mark_declined(order.id, &event.data.id, &note).await?;
        Ok(WebhookOutcome::Applied(order))
    }
}
