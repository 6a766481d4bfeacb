mod api_key;
mod hmac;

pub use api_key::{ApiKeyMiddlewareFactory, ApiKeyMiddlewareService, API_KEY_HEADER};
pub use hmac::{HmacMiddlewareFactory, HmacMiddlewareService, SIGNATURE_HEADER};
