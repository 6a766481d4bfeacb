use provider_client::{
    ActionResponse,
    CaptureRequest,
    PaymentRequest,
    ProviderApiError,
    ProviderClient,
    ProviderPayment,
    RefundRequest,
    VoidRequest,
};

/// The remote payment provider calls the engine depends on. Implemented by
/// [`provider_client::ProviderClient`] in production and by mocks in endpoint tests.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider: Clone {
    async fn get_payment_details(&self, payment_id: &str) -> Result<ProviderPayment, ProviderApiError>;

    async fn request_payment(
        &self,
        request: &PaymentRequest,
        idempotency_key: &str,
    ) -> Result<ProviderPayment, ProviderApiError>;

    async fn capture_payment(
        &self,
        payment_id: &str,
        request: &CaptureRequest,
    ) -> Result<ActionResponse, ProviderApiError>;

    async fn void_payment(&self, payment_id: &str, request: &VoidRequest) -> Result<ActionResponse, ProviderApiError>;

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<ActionResponse, ProviderApiError>;
}

impl PaymentProvider for ProviderClient {
    async fn get_payment_details(&self, payment_id: &str) -> Result<ProviderPayment, ProviderApiError> {
        ProviderClient::get_payment_details(self, payment_id).await
    }

    async fn request_payment(
        &self,
        request: &PaymentRequest,
        idempotency_key: &str,
    ) -> Result<ProviderPayment, ProviderApiError> {
        ProviderClient::request_payment(self, request, idempotency_key).await
    }

    async fn capture_payment(
        &self,
        payment_id: &str,
        request: &CaptureRequest,
    ) -> Result<ActionResponse, ProviderApiError> {
        ProviderClient::capture_payment(self, payment_id, request).await
    }

    async fn void_payment(&self, payment_id: &str, request: &VoidRequest) -> Result<ActionResponse, ProviderApiError> {
        ProviderClient::void_payment(self, payment_id, request).await
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<ActionResponse, ProviderApiError> {
        ProviderClient::refund_payment(self, payment_id, request).await
    }
}
