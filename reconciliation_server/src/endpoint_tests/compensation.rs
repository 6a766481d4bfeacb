use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use log::*;
use provider_client::{ActionResponse, PaymentStatus, ProviderApiError};
use reconciliation_engine::{db_types::OrderStatus, CompensationApi};

use super::{
    helpers::{approved_payment, authorized_order, test_config, ADMIN_KEY},
    mocks::{MockDb, MockProvider},
};
use crate::{
    middleware::API_KEY_HEADER,
    routes::{CaptureOrderRoute, RefundOrderRoute, VoidOrderRoute},
};

fn configure_app(db: MockDb, provider: MockProvider) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let compensation = CompensationApi::new(db, provider);
        cfg.app_data(web::Data::new(test_config()))
            .app_data(web::Data::new(compensation))
            .service(CaptureOrderRoute::<MockDb, MockProvider>::new())
            .service(VoidOrderRoute::<MockDb, MockProvider>::new())
            .service(RefundOrderRoute::<MockDb, MockProvider>::new());
    }
}

async fn post_op(
    db: MockDb,
    provider: MockProvider,
    uri: &str,
    api_key: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, String) {
    let _ = env_logger::try_init().ok();
    let mut req = TestRequest::post().uri(uri);
    if let Some(key) = api_key {
        req = req.insert_header((API_KEY_HEADER, key));
    }
    if let Some(body) = body {
        req = req.insert_header(("Content-Type", "application/json")).set_payload(body.to_string());
    }
    let app = App::new().configure(configure_app(db, provider));
    let app = test::init_service(app).await;
    let res = match test::try_call_service(&app, req.to_request()).await {
        Ok(res) => res.into_parts().1,
        Err(e) => e.error_response(),
    };
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    info!("Response body: {body}");
    (status, body)
}

#[actix_web::test]
async fn compensation_without_an_api_key_is_rejected() {
    let (status, body) = post_op(MockDb::new(), MockProvider::new(), "/orders/12/capture", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No API key supplied"), "was: {body}");
}

#[actix_web::test]
async fn compensation_with_a_wrong_api_key_is_rejected() {
    let (status, body) =
        post_op(MockDb::new(), MockProvider::new(), "/orders/12/void", Some("wrong-key"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Invalid API key"), "was: {body}");
}

#[actix_web::test]
async fn capture_lands_and_returns_the_updated_order() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| Ok(Some(authorized_order(12, "1001", "pay_1"))));
    db.expect_mark_captured().returning(|_, transaction_id, _| {
        let mut order = authorized_order(12, "1001", "pay_1");
        order.status = OrderStatus::Captured;
        order.transaction_id = Some(transaction_id.to_string());
        Ok(order)
    });
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| Ok(approved_payment("pay_1", "1001")));
    provider
        .expect_capture_payment()
        .returning(|_, _| Ok(ActionResponse { action_id: "act_cap_1".to_string(), reference: None }));

    let (status, body) = post_op(db, provider, "/orders/12/capture", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"Captured""#), "was: {body}");
    assert!(body.contains("act_cap_1"), "was: {body}");
}

#[actix_web::test]
async fn capture_against_a_voided_payment_conflicts() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| Ok(Some(authorized_order(12, "1001", "pay_1"))));
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| {
        let mut payment = approved_payment("pay_1", "1001");
        payment.status = PaymentStatus::Voided;
        Ok(payment)
    });

    let (status, body) = post_op(db, provider, "/orders/12/capture", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("Voided"), "was: {body}");
}

#[actix_web::test]
async fn a_partial_refund_lands_and_returns_the_updated_order() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| {
        let mut order = authorized_order(12, "1001", "pay_1");
        order.status = OrderStatus::Captured;
        Ok(Some(order))
    });
    db.expect_record_refund().returning(|_, amount, transaction_id, new_status, _| {
        let mut order = authorized_order(12, "1001", "pay_1");
        order.status = new_status;
        order.refunded_total = amount;
        order.transaction_id = transaction_id.map(String::from);
        Ok(order)
    });
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| {
        let mut payment = approved_payment("pay_1", "1001");
        payment.status = PaymentStatus::Captured;
        Ok(payment)
    });
    provider
        .expect_refund_payment()
        .returning(|_, _| Ok(ActionResponse { action_id: "act_ref_1".to_string(), reference: None }));

    let (status, body) =
        post_op(db, provider, "/orders/12/refund", Some(ADMIN_KEY), Some(r#"{"amount":2000}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"PartiallyRefunded""#), "was: {body}");
    assert!(body.contains("act_ref_1"), "was: {body}");
    assert!(body.contains(r#""refunded_total":2000"#), "was: {body}");
}

#[actix_web::test]
async fn a_refund_beyond_the_outstanding_amount_is_rejected() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| {
        let mut order = authorized_order(12, "1001", "pay_1");
        order.status = OrderStatus::Captured;
        Ok(Some(order))
    });
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| {
        let mut payment = approved_payment("pay_1", "1001");
        payment.status = PaymentStatus::Captured;
        Ok(payment)
    });

    let (status, body) =
        post_op(db, provider, "/orders/12/refund", Some(ADMIN_KEY), Some(r#"{"amount":9000}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("exceeds the outstanding amount"), "was: {body}");
}

#[actix_web::test]
async fn a_timed_out_refund_reports_an_indeterminate_outcome() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| {
        let mut order = authorized_order(12, "1001", "pay_1");
        order.status = OrderStatus::Captured;
        Ok(Some(order))
    });
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| {
        let mut payment = approved_payment("pay_1", "1001");
        payment.status = PaymentStatus::Captured;
        Ok(payment)
    });
    provider.expect_refund_payment().returning(|_, _| Err(ProviderApiError::Timeout));

    let (status, body) =
        post_op(db, provider, "/orders/12/refund", Some(ADMIN_KEY), Some(r#"{"amount":2000}"#)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.contains("Check the payment state before retrying"), "was: {body}");
}

#[actix_web::test]
async fn void_releases_the_authorization() {
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| Ok(Some(authorized_order(12, "1001", "pay_1"))));
    db.expect_mark_voided().returning(|_, _, _| {
        let mut order = authorized_order(12, "1001", "pay_1");
        order.status = OrderStatus::Voided;
        Ok(order)
    });
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| Ok(approved_payment("pay_1", "1001")));
    provider
        .expect_void_payment()
        .returning(|_, _| Ok(ActionResponse { action_id: "act_void_1".to_string(), reference: None }));

    let (status, body) = post_op(db, provider, "/orders/12/void", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"Voided""#), "was: {body}");
}
