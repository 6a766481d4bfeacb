use cpg_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Query string of the redirect return. The provider appends `cko-payment-id` style parameters;
/// everything else is whatever the storefront put on the return URL at checkout time.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectQuery {
    pub payment_id: String,
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub order_key: Option<String>,
    pub save_card: Option<bool>,
}

/// Optional body for the capture and refund endpoints. No body means the full amount.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AmountParams {
    pub amount: Option<Money>,
}

/// Response of the verification poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    pub payment_status: String,
    pub approved: bool,
    pub order_id: Option<i64>,
    pub order_status: Option<String>,
}
