mod api;
mod config;
mod error;

mod data_objects;

pub use api::ProviderClient;
pub use config::ProviderConfig;
pub use data_objects::{
    ActionResponse,
    BillingAddress,
    CaptureRequest,
    CustomerInfo,
    PaymentLinks,
    PaymentRequest,
    PaymentSource,
    PaymentStatus,
    ProviderPayment,
    RefundRequest,
    RiskInfo,
    VoidRequest,
    WebhookEvent,
    WebhookEventData,
};
pub use error::ProviderApiError;
