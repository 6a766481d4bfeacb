use actix_web::{
    body::MessageBody,
    http::{header, StatusCode},
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use log::*;
use provider_client::PaymentStatus;
use reconciliation_engine::{traits::ClaimResult, CompensationApi, ReconciliationApi};

use super::{
    helpers::{approved_payment, pending_order, test_config},
    mocks::{MockDb, MockProvider},
};
use crate::routes::PaymentCallbackRoute;

fn configure_app(db: MockDb, provider: MockProvider) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = ReconciliationApi::new(db, Duration::hours(6));
        let compensation = CompensationApi::new(MockDb::new(), MockProvider::new());
        cfg.app_data(web::Data::new(test_config()))
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(compensation))
            .app_data(web::Data::new(provider))
            .service(PaymentCallbackRoute::<MockDb, MockProvider>::new());
    }
}

async fn get_callback(db: MockDb, provider: MockProvider, uri: &str) -> (StatusCode, Option<String>, String) {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri(uri).to_request();
    let app = App::new().configure(configure_app(db, provider));
    let app = test::init_service(app).await;
    let (_req, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let location = res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()).map(String::from);
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    info!("Response: {status} -> {location:?} {body}");
    (status, location, body)
}

#[actix_web::test]
async fn a_successful_return_lands_on_the_confirmation_page() {
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| Ok(approved_payment("pay_1", "1001")));
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(pending_order(12, "1001"))));
    db.expect_claim_payment_id().returning(|_, _| Ok(ClaimResult::Claimed));
    db.expect_apply_payment_approval().returning(|_, transition| {
        let mut order = pending_order(12, "1001");
        order.status = transition.new_status;
        order.authorized = true;
        order.payment_id = Some(transition.payment_id);
        Ok(Some(order))
    });

    let (status, location, _) = get_callback(db, provider, "/callback?payment_id=pay_1").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://shop.test/thanks?order=1001"));
}

#[actix_web::test]
async fn redirect_query_values_are_url_encoded() {
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| Ok(approved_payment("pay_1", "1001&next")));
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(pending_order(12, "1001&next"))));
    db.expect_claim_payment_id().returning(|_, _| Ok(ClaimResult::Claimed));
    db.expect_apply_payment_approval().returning(|_, transition| {
        let mut order = pending_order(12, "1001&next");
        order.status = transition.new_status;
        order.authorized = true;
        order.payment_id = Some(transition.payment_id);
        Ok(Some(order))
    });

    let (status, location, _) = get_callback(db, provider, "/callback?payment_id=pay_1").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    // An order number must not be able to smuggle extra query parameters into the redirect.
    assert_eq!(location.as_deref(), Some("https://shop.test/thanks?order=1001%26next"));
}

#[actix_web::test]
async fn a_declined_payment_goes_back_to_checkout() {
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| {
        let mut payment = approved_payment("pay_1", "1001");
        payment.approved = false;
        payment.status = PaymentStatus::Declined;
        payment.response_summary = Some("Insufficient funds".to_string());
        Ok(payment)
    });
    let mut db = MockDb::new();
    db.expect_fetch_order_by_reference().returning(|_| Ok(Some(pending_order(12, "1001"))));
    db.expect_mark_declined().returning(|_, payment_id, note| {
        assert!(note.contains("Insufficient funds"), "was: {note}");
        let mut order = pending_order(12, "1001");
        order.status = reconciliation_engine::db_types::OrderStatus::Declined;
        order.payment_id = Some(payment_id.to_string());
        Ok(order)
    });

    let (status, location, _) = get_callback(db, provider, "/callback?payment_id=pay_1").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("https://shop.test/checkout?payment_declined=1"));
}

#[actix_web::test]
async fn a_wrong_order_key_aborts_the_return() {
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| Ok(approved_payment("pay_1", "1001")));
    let mut db = MockDb::new();
    db.expect_fetch_order_by_id().returning(|_| Ok(Some(pending_order(12, "1001"))));

    let (status, _, body) =
        get_callback(db, provider, "/callback?payment_id=pay_1&order_id=12&order_key=wrong").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("order key"), "was: {body}");
}

#[actix_web::test]
async fn a_missing_payment_is_a_404() {
    let mut provider = MockProvider::new();
    provider.expect_get_payment_details().returning(|_| {
        Err(provider_client::ProviderApiError::QueryError { status: 404, message: "not found".to_string() })
    });

    let (status, _, body) = get_callback(MockDb::new(), provider, "/callback?payment_id=pay_gone").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("does not exist at the provider"), "was: {body}");
}
