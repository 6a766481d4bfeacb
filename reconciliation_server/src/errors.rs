use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use reconciliation_engine::traits::PaymentEngineError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("The webhook signature is missing or invalid.")]
    InvalidSignature,
    #[error("Missing or invalid API key.")]
    InvalidApiKey,
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("Conflict. {0}")]
    Conflict(String),
    #[error("Bad request. {0}")]
    BadRequest(String),
    #[error("Payment gateway error. {0}")]
    GatewayError(String),
    #[error("Backend error. {0}")]
    BackendError(String),
    #[error("An unspecified error happened on the server. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// Map an engine error onto an HTTP-facing one. Provider error detail is only passed
    /// through when `verbose_gateway_errors` is set, since those messages can leak gateway
    /// internals to customers.
    pub fn from_engine(e: PaymentEngineError, verbose_gateway_errors: bool) -> Self {
        use PaymentEngineError::*;
        match e {
            OrderIdNotFound(_) | OrderNotFound(_) | OrderNotFoundForPayment(_) => ServerError::NotFound(e.to_string()),
            PaymentIdConflict { .. } | RemoteStateConflict { .. } => ServerError::Conflict(e.to_string()),
            OrderKeyMismatch(_) |
            CartEmpty |
            PrematureCapture(_) |
            NoPaymentForOrder(_) |
            RefundExceedsOutstanding { .. } => ServerError::BadRequest(e.to_string()),
            ProviderError(pe) if verbose_gateway_errors => ServerError::GatewayError(pe.to_string()),
            ProviderError(_) => {
                ServerError::GatewayError("The payment could not be processed. Please try again later.".to_string())
            },
            DatabaseError(e) => ServerError::BackendError(e),
        }
    }
}

impl From<PaymentEngineError> for ServerError {
    fn from(e: PaymentEngineError) -> Self {
        ServerError::from_engine(e, false)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Unspecified(e.to_string())
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidSignature | ServerError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::GatewayError(_) => StatusCode::BAD_GATEWAY,
            ServerError::InitializeError(_) | ServerError::BackendError(_) | ServerError::Unspecified(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({"error": self.to_string()});
        HttpResponse::build(self.status_code()).json(body)
    }
}
