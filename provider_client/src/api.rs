use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::ProviderConfig,
    data_objects::{ActionResponse, CaptureRequest, PaymentRequest, ProviderPayment, RefundRequest, VoidRequest},
    ProviderApiError,
};

pub const IDEMPOTENCY_HEADER: &str = "Cko-Idempotency-Key";

#[derive(Clone)]
pub struct ProviderClient {
    config: ProviderConfig,
    client: Arc<Client>,
    /// Built from the fallback secret key, when one is configured.
    fallback_client: Option<Arc<Client>>,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderApiError> {
        let client = Arc::new(build_client(&config, config.secret_key.reveal())?);
        let fallback_client = match &config.fallback_secret_key {
            Some(key) => Some(Arc::new(build_client(&config, key.reveal())?)),
            None => None,
        };
        Ok(Self { config, client, fallback_client })
    }

    pub fn has_fallback_credentials(&self) -> bool {
        self.fallback_client.is_some()
    }

    async fn payment_query<T: DeserializeOwned, B: Serialize>(
        &self,
        client: &Client,
        method: Method,
        path: &str,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> Result<T, ProviderApiError> {
        let url = self.url(path);
        trace!("🛒️ Sending payment API query: {url}");
        let mut req = client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_HEADER, key);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderApiError::Timeout
            } else {
                ProviderApiError::ResponseError(e.to_string())
            }
        })?;
        if response.status().is_success() {
            trace!("🛒️ Payment API query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| ProviderApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ProviderApiError::ResponseError(e.to_string()))?;
            Err(ProviderApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    pub async fn get_payment_details(&self, payment_id: &str) -> Result<ProviderPayment, ProviderApiError> {
        let path = format!("/payments/{payment_id}");
        debug!("🛒️ Fetching payment details for {payment_id}");
        let payment =
            self.payment_query::<ProviderPayment, ()>(&self.client, Method::GET, &path, None, None).await?;
        debug!("🛒️ Payment {payment_id} is {:?}", payment.status);
        Ok(payment)
    }

    /// Create a new payment. The idempotency key makes an accidental double submission of the
    /// same checkout return the original payment instead of charging twice.
    pub async fn request_payment(
        &self,
        request: &PaymentRequest,
        idempotency_key: &str,
    ) -> Result<ProviderPayment, ProviderApiError> {
        debug!("🛒️ Requesting payment of {} {} for {}", request.amount, request.currency, request.reference);
        let payment = self
            .payment_query::<ProviderPayment, PaymentRequest>(
                &self.client,
                Method::POST,
                "/payments",
                Some(request),
                Some(idempotency_key),
            )
            .await?;
        info!("🛒️ Payment requested for {}. id: {}, status: {:?}", request.reference, payment.id, payment.status);
        Ok(payment)
    }

    pub async fn capture_payment(
        &self,
        payment_id: &str,
        request: &CaptureRequest,
    ) -> Result<ActionResponse, ProviderApiError> {
        let path = format!("/payments/{payment_id}/captures");
        debug!("🛒️ Capturing payment {payment_id}");
        let action =
            self.payment_query::<ActionResponse, CaptureRequest>(&self.client, Method::POST, &path, Some(request), None).await?;
        info!("🛒️ Capture accepted for {payment_id}. Action id: {}", action.action_id);
        Ok(action)
    }

    pub async fn void_payment(
        &self,
        payment_id: &str,
        request: &VoidRequest,
    ) -> Result<ActionResponse, ProviderApiError> {
        let path = format!("/payments/{payment_id}/voids");
        debug!("🛒️ Voiding payment {payment_id}");
        let action =
            self.payment_query::<ActionResponse, VoidRequest>(&self.client, Method::POST, &path, Some(request), None).await?;
        info!("🛒️ Void accepted for {payment_id}. Action id: {}", action.action_id);
        Ok(action)
    }

    /// Refund a payment. A rejection against the primary credential set is retried once with the
    /// fallback credentials, which covers keys that were rotated after the payment was taken.
    /// Timeouts are not retried, since the first attempt may still land.
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<ActionResponse, ProviderApiError> {
        let path = format!("/payments/{payment_id}/refunds");
        debug!("🛒️ Refunding payment {payment_id}");
        let first_attempt = self
            .payment_query::<ActionResponse, RefundRequest>(&self.client, Method::POST, &path, Some(request), None)
            .await;
        let action = match (first_attempt, &self.fallback_client) {
            (Ok(action), _) => action,
            (Err(e), Some(fallback)) if !e.is_indeterminate() => {
                warn!("🛒️ Refund of {payment_id} failed ({e}). Retrying with fallback credentials");
                self.payment_query::<ActionResponse, RefundRequest>(fallback, Method::POST, &path, Some(request), None)
                    .await?
            },
            (Err(e), _) => return Err(e),
        };
        info!("🛒️ Refund accepted for {payment_id}. Action id: {}", action.action_id);
        Ok(action)
    }
}

fn build_client(config: &ProviderConfig, secret_key: &str) -> Result<Client, ProviderApiError> {
    let mut headers = HeaderMap::with_capacity(2);
    let val = HeaderValue::from_str(secret_key).map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
    headers.insert("Authorization", val);
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));
    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .build()
        .map_err(|e| ProviderApiError::Initialization(e.to_string()))
}
