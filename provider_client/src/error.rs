use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid payment API request: {0}")]
    RequestError(String),
    #[error("Invalid payment API response: {0}")]
    ResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Payment API call failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Payment API call timed out")]
    Timeout,
}

impl ProviderApiError {
    /// True when the outcome of the remote call is unknowable. The request may have been
    /// applied on the provider's side even though no response arrived.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, ProviderApiError::Timeout)
    }
}
