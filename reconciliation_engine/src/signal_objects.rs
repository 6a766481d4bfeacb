//! Completion signals and request context.
//!
//! Every inbound "the payment finished" notification is normalised into a [`CompletionSignal`]
//! before it touches the engine, so the resolver and the state machine never care which channel
//! a signal arrived on, only which identifiers it carries.

use chrono::{DateTime, Utc};
use cpg_common::Money;
use provider_client::WebhookEvent;

/// The identifiers a completion signal may carry. Only the provider payment id is guaranteed.
#[derive(Debug, Clone, Default)]
pub struct SignalIds {
    pub payment_id: String,
    /// The local order id, if the channel carried one (redirect query string, payment metadata).
    pub order_id: Option<String>,
    /// The secret order key. Must match the stored key for an explicit order-id match to hold.
    pub order_key: Option<String>,
    pub session_id: Option<String>,
    /// The merchant reference attached to the payment at creation time.
    pub reference: Option<String>,
    pub customer_email: Option<String>,
    pub amount: Option<Money>,
}

impl SignalIds {
    pub fn for_payment(payment_id: impl Into<String>) -> Self {
        Self { payment_id: payment_id.into(), ..Default::default() }
    }
}

/// A payment-completion notification, tagged with the channel it arrived on.
#[derive(Debug, Clone)]
pub enum CompletionSignal {
    /// The customer's browser returning from the provider's hosted page or 3DS challenge.
    RedirectReturn(SignalIds),
    /// A server-to-server event delivery.
    Webhook(SignalIds),
    /// An explicit status check against the provider API.
    VerificationPoll(SignalIds),
}

impl CompletionSignal {
    pub fn ids(&self) -> &SignalIds {
        match self {
            CompletionSignal::RedirectReturn(ids) => ids,
            CompletionSignal::Webhook(ids) => ids,
            CompletionSignal::VerificationPoll(ids) => ids,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            CompletionSignal::RedirectReturn(_) => "redirect",
            CompletionSignal::Webhook(_) => "webhook",
            CompletionSignal::VerificationPoll(_) => "poll",
        }
    }

    pub fn payment_id(&self) -> &str {
        &self.ids().payment_id
    }
}

impl From<&WebhookEvent> for CompletionSignal {
    fn from(event: &WebhookEvent) -> Self {
        let ids = SignalIds {
            payment_id: event.data.id.clone(),
            order_id: event.metadata_order_id(),
            order_key: None,
            session_id: event.metadata_session_id(),
            reference: event.data.reference.clone(),
            customer_email: None,
            amount: event.data.amount,
        };
        CompletionSignal::Webhook(ids)
    }
}

/// Per-request state the engine cannot look up for itself. Entry points build one of these
/// instead of the engine reaching into ambient session state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The customer's active cart, when the request came from their browser session.
    pub cart_token: Option<String>,
    /// The checkout session id carried through the redirect, for back-filling onto the order.
    pub session_id: Option<String>,
    /// Customer asked for the card to be stored for later use.
    pub save_card: bool,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { cart_token: None, session_id: None, save_card: false, now }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cart(mut self, token: impl Into<String>) -> Self {
        self.cart_token = Some(token.into());
        self
    }

    pub fn with_save_card(mut self, save_card: bool) -> Self {
        self.save_card = save_card;
        self
    }
}
