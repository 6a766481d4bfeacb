use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use log::*;
use reconciliation_engine::{db_types::OrderStatus, traits::ClaimResult, ReconciliationApi};

use super::{
    helpers::{authorized_order, pending_order, test_config, webhook_body, HMAC_SECRET},
    mocks::MockDb,
};
use crate::{
    config::ServerConfig,
    helpers::sign_payload,
    middleware::{HmacMiddlewareFactory, SIGNATURE_HEADER},
    routes::WebhookRoute,
};

fn configure_app(db: MockDb, config: ServerConfig) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = ReconciliationApi::new(db, Duration::hours(6));
        let scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                SIGNATURE_HEADER,
                config.webhook.hmac_secret.clone(),
                config.webhook.hmac_checks,
            ))
            .service(WebhookRoute::<MockDb>::new());
        cfg.app_data(web::Data::new(api)).service(scope);
    }
}

async fn post_webhook(db: MockDb, config: ServerConfig, body: String, signature: Option<&str>) -> (StatusCode, String) {
    let _ = env_logger::try_init().ok();
    let mut req = TestRequest::post().uri("/webhook").insert_header(("Content-Type", "application/json"));
    if let Some(sig) = signature {
        req = req.insert_header((SIGNATURE_HEADER, sig));
    }
    let req = req.set_payload(body).to_request();
    let app = App::new().configure(configure_app(db, config));
    let app = test::init_service(app).await;
    let res = match test::try_call_service(&app, req).await {
        Ok(res) => res.into_parts().1,
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    info!("Response body: {body}");
    (status, body)
}

#[actix_web::test]
async fn webhook_without_a_signature_is_rejected() {
    let body = webhook_body("payment_approved", "pay_1", "1001");
    let (status, body) = post_webhook(MockDb::new(), test_config(), body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No HMAC signature found"), "was: {body}");
}

#[actix_web::test]
async fn webhook_with_a_bad_signature_is_rejected() {
    let body = webhook_body("payment_approved", "pay_1", "1001");
    let forged = sign_payload("not-the-signing-key", body.as_bytes());
    let (status, body) = post_webhook(MockDb::new(), test_config(), body, Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Invalid HMAC signature"), "was: {body}");
}

#[actix_web::test]
async fn disabled_hmac_checks_let_unsigned_events_through() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(None));
    db.expect_fetch_order_by_id().returning(|_| Ok(None));
    db.expect_fetch_order_by_payment_id().returning(|_| Ok(None));
    let mut config = test_config();
    config.webhook.hmac_checks = false;
    let body = webhook_body("payment_approved", "pay_1", "1001");
    let (status, _) = post_webhook(db, config, body, None).await;
    // Not a 401: the event went through the middleware and failed on resolution instead.
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unresolvable_events_get_a_404_so_the_provider_redelivers() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(None));
    db.expect_fetch_order_by_id().returning(|_| Ok(None));
    db.expect_fetch_order_by_payment_id().returning(|_| Ok(None));
    let body = webhook_body("payment_approved", "pay_missing", "9999");
    let sig = sign_payload(HMAC_SECRET, body.as_bytes());
    let (status, body) = post_webhook(db, test_config(), body, Some(&sig)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("No order could be matched to payment pay_missing"), "was: {body}");
}

#[actix_web::test]
async fn an_approval_event_is_applied() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(pending_order(12, "1001"))));
    db.expect_claim_payment_id().returning(|_, _| Ok(ClaimResult::Claimed));
    db.expect_apply_payment_approval().returning(|_, transition| {
        assert_eq!(transition.new_status, OrderStatus::Authorized);
        let mut order = pending_order(12, "1001");
        order.status = transition.new_status;
        order.authorized = true;
        order.payment_id = Some(transition.payment_id);
        Ok(Some(order))
    });
    let body = webhook_body("payment_approved", "pay_1", "1001");
    let sig = sign_payload(HMAC_SECRET, body.as_bytes());
    let (status, body) = post_webhook(db, test_config(), body, Some(&sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Order 1001 updated."}"#);
}

#[actix_web::test]
async fn a_capture_before_the_authorization_is_a_client_error() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(pending_order(12, "1001"))));
    let body = webhook_body("payment_captured", "pay_1", "1001");
    let sig = sign_payload(HMAC_SECRET, body.as_bytes());
    let (status, body) = post_webhook(db, test_config(), body, Some(&sig)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("before its authorization"), "was: {body}");
}

#[actix_web::test]
async fn an_approval_for_a_different_payment_conflicts() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(authorized_order(12, "1001", "pay_other"))));
    let body = webhook_body("payment_approved", "pay_1", "1001");
    let sig = sign_payload(HMAC_SECRET, body.as_bytes());
    let (status, body) = post_webhook(db, test_config(), body, Some(&sig)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("pinned to payment pay_other"), "was: {body}");
}

#[actix_web::test]
async fn unknown_event_types_are_acknowledged_and_ignored() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(authorized_order(12, "1001", "pay_1"))));
    let body = webhook_body("payment_paid", "pay_1", "1001");
    let sig = sign_payload(HMAC_SECRET, body.as_bytes());
    let (status, body) = post_webhook(db, test_config(), body, Some(&sig)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"success":true,"message":"Event type ignored."}"#);
}
