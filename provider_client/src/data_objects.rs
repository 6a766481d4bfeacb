use chrono::{DateTime, Utc};
use cpg_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote payment status, as reported by the provider. Unrecognised values fall through to
/// `Unknown` rather than failing deserialization, since providers add statuses over time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Authorized,
    #[serde(rename = "Card Verified")]
    CardVerified,
    Captured,
    #[serde(rename = "Partially Captured")]
    PartiallyCaptured,
    Declined,
    Voided,
    #[serde(rename = "Partially Refunded")]
    PartiallyRefunded,
    Refunded,
    Canceled,
    Expired,
    #[serde(other)]
    #[default]
    Unknown,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RiskInfo {
    #[serde(default)]
    pub flagged: bool,
}

/// Billing address attached to the payment source. Field names follow the provider's wire
/// format (`zip`, not `postcode`).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BillingAddress {
    #[serde(default)]
    pub address_line1: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentSource {
    #[serde(rename = "type", default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub billing_address: Option<BillingAddress>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    pub href: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentLinks {
    #[serde(default)]
    pub redirect: Option<PaymentLink>,
}

/// A payment record as returned by `GET /payments/{id}` and `POST /payments`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    #[serde(default)]
    pub status: PaymentStatus,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub amount: Money,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub response_summary: Option<String>,
    #[serde(default)]
    pub risk: RiskInfo,
    #[serde(default)]
    pub source: Option<PaymentSource>,
    #[serde(default)]
    pub customer: Option<CustomerInfo>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(rename = "_links", default)]
    pub links: Option<PaymentLinks>,
}

impl ProviderPayment {
    pub fn is_flagged(&self) -> bool {
        self.risk.flagged
    }

    /// The order id the merchant attached to the payment at creation time, if any.
    /// Providers echo metadata values back as either strings or numbers.
    pub fn metadata_order_id(&self) -> Option<String> {
        metadata_string(self.metadata.as_ref(), "order_id")
    }

    pub fn metadata_session_id(&self) -> Option<String> {
        metadata_string(self.metadata.as_ref(), "session_id")
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer.as_ref().and_then(|c| c.email.as_deref())
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer.as_ref().and_then(|c| c.name.as_deref())
    }

    pub fn billing_address(&self) -> Option<&BillingAddress> {
        self.source.as_ref().and_then(|s| s.billing_address.as_ref())
    }

    /// A 3DS challenge URL the customer must be sent to, present while the payment is pending.
    pub fn redirect_url(&self) -> Option<&str> {
        self.links.as_ref().and_then(|l| l.redirect.as_ref()).map(|r| r.href.as_str())
    }

    pub fn requires_redirect(&self) -> bool {
        self.status == PaymentStatus::Pending && self.redirect_url().is_some()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentRequestSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub token: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub source: PaymentRequestSource,
    pub amount: Money,
    pub currency: String,
    pub reference: String,
    pub capture: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct VoidRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Response to capture, void and refund requests. The action id turns up again in the
/// corresponding webhook.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action_id: String,
    #[serde(default)]
    pub reference: Option<String>,
}

//--------------------------------------   Webhook events    ---------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WebhookEventData {
    /// The provider payment id.
    pub id: String,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub response_summary: Option<String>,
    #[serde(default)]
    pub risk: RiskInfo,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    pub data: WebhookEventData,
}

impl WebhookEvent {
    pub fn metadata_order_id(&self) -> Option<String> {
        metadata_string(self.data.metadata.as_ref(), "order_id")
    }

    /// The checkout session id, when the merchant stored it in the payment metadata.
    pub fn metadata_session_id(&self) -> Option<String> {
        metadata_string(self.data.metadata.as_ref(), "session_id")
    }
}

fn metadata_string(metadata: Option<&Value>, key: &str) -> Option<String> {
    match metadata?.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
