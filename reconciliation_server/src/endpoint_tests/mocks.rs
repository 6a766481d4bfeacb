use chrono::{DateTime, Duration, Utc};
use cpg_common::Money;
use mockall::mock;
use provider_client::{
    ActionResponse,
    CaptureRequest,
    PaymentRequest,
    ProviderApiError,
    ProviderPayment,
    RefundRequest,
    VoidRequest,
};
use reconciliation_engine::{
    db_types::{Cart, NewOrder, Order, OrderId, OrderLine, OrderNote, OrderStatus},
    traits::{ClaimResult, PaymentEngineError, PaymentProvider, PaymentTransition, ReconciliationDatabase},
};

mock! {
    pub Db {}
    impl Clone for Db {
        fn clone(&self) -> Self;
    }
    impl ReconciliationDatabase for Db {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), PaymentEngineError>;
        async fn insert_order_for_payment(&self, order: NewOrder, payment_id: &str) -> Result<(Order, bool), PaymentEngineError>;
        async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentEngineError>;
        async fn fetch_order_by_reference(&self, reference: &OrderId) -> Result<Option<Order>, PaymentEngineError>;
        async fn fetch_order_by_payment_id(&self, payment_id: &str) -> Result<Option<Order>, PaymentEngineError>;
        async fn fetch_order_by_session_id(&self, session_id: &str) -> Result<Option<Order>, PaymentEngineError>;
        async fn fetch_pending_orders_for_email(&self, email: &str, window: Duration, now: DateTime<Utc>) -> Result<Vec<Order>, PaymentEngineError>;
        async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, PaymentEngineError>;
        async fn fetch_order_notes(&self, order_id: i64) -> Result<Vec<OrderNote>, PaymentEngineError>;
        async fn claim_payment_id(&self, order_id: i64, payment_id: &str) -> Result<ClaimResult, PaymentEngineError>;
        async fn apply_payment_approval(&self, order_id: i64, transition: PaymentTransition) -> Result<Option<Order>, PaymentEngineError>;
        async fn mark_captured(&self, order_id: i64, transaction_id: &str, note: &str) -> Result<Order, PaymentEngineError>;
        async fn mark_voided<'a, 'b>(&self, order_id: i64, transaction_id: Option<&'a str>, note: &'b str) -> Result<Order, PaymentEngineError>;
        async fn mark_declined(&self, order_id: i64, payment_id: &str, note: &str) -> Result<Order, PaymentEngineError>;
        async fn record_refund<'a, 'b>(&self, order_id: i64, amount: Money, transaction_id: Option<&'a str>, new_status: OrderStatus, note: &'b str) -> Result<Order, PaymentEngineError>;
        async fn append_order_note(&self, order_id: i64, note: &str) -> Result<OrderNote, PaymentEngineError>;
        async fn fetch_cart(&self, token: &str) -> Result<Option<Cart>, PaymentEngineError>;
        async fn clear_cart(&self, token: &str) -> Result<(), PaymentEngineError>;
    }
}

mock! {
    pub Provider {}
    impl Clone for Provider {
        fn clone(&self) -> Self;
    }
    impl PaymentProvider for Provider {
        async fn get_payment_details(&self, payment_id: &str) -> Result<ProviderPayment, ProviderApiError>;
        async fn request_payment(&self, request: &PaymentRequest, idempotency_key: &str) -> Result<ProviderPayment, ProviderApiError>;
        async fn capture_payment(&self, payment_id: &str, request: &CaptureRequest) -> Result<ActionResponse, ProviderApiError>;
        async fn void_payment(&self, payment_id: &str, request: &VoidRequest) -> Result<ActionResponse, ProviderApiError>;
        async fn refund_payment(&self, payment_id: &str, request: &RefundRequest) -> Result<ActionResponse, ProviderApiError>;
    }
}
