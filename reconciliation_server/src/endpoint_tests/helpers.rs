use chrono::Utc;
use cpg_common::{Money, Secret};
use provider_client::{PaymentStatus, ProviderPayment};
use reconciliation_engine::db_types::{Order, OrderId, OrderStatus};

use crate::config::{ServerConfig, WebhookConfig};

pub const HMAC_SECRET: &str = "whsec_test_signing_key";
pub const ADMIN_KEY: &str = "adm_test_api_key";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        webhook: WebhookConfig { hmac_secret: Secret::new(HMAC_SECRET.to_string()), hmac_checks: true },
        admin_api_key: Some(Secret::new(ADMIN_KEY.to_string())),
        confirmation_url: "https://shop.test/thanks".to_string(),
        checkout_url: "https://shop.test/checkout".to_string(),
        ..ServerConfig::default()
    }
}

pub fn pending_order(id: i64, number: &str) -> Order {
    let now = Utc::now();
    Order {
        id,
        order_number: OrderId(number.to_string()),
        order_key: format!("order_key_{number}"),
        customer_email: Some("jo@example.com".to_string()),
        currency: "USD".to_string(),
        total_amount: Money::from(6_000),
        refunded_total: Money::from(0),
        status: OrderStatus::Unpaid,
        payment_id: None,
        session_id: None,
        payment_method: None,
        transaction_id: None,
        authorized: false,
        save_card: false,
        billing_name: None,
        billing_line1: None,
        billing_line2: None,
        billing_city: None,
        billing_state: None,
        billing_postcode: None,
        billing_country: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn authorized_order(id: i64, number: &str, payment_id: &str) -> Order {
    let mut order = pending_order(id, number);
    order.status = OrderStatus::Authorized;
    order.authorized = true;
    order.payment_id = Some(payment_id.to_string());
    order
}

pub fn approved_payment(payment_id: &str, reference: &str) -> ProviderPayment {
    ProviderPayment {
        id: payment_id.to_string(),
        status: PaymentStatus::Authorized,
        approved: true,
        amount: Money::from(6_000),
        currency: "USD".to_string(),
        reference: Some(reference.to_string()),
        action_id: Some(format!("act_{payment_id}")),
        ..Default::default()
    }
}

pub fn webhook_body(event_type: &str, payment_id: &str, reference: &str) -> String {
    format!(
        r#"{{"id":"evt_1","type":"{event_type}","created_on":"2024-05-20T10:00:00Z","data":{{"id":"{payment_id}","action_id":"act_{payment_id}","reference":"{reference}","amount":6000,"currency":"USD","risk":{{"flagged":false}}}}}}"#
    )
}
