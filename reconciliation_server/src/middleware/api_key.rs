//! API key middleware for the compensation endpoints.
//! This middleware can be placed on any route or service.
//!
//! It checks the incoming request for the `cpg-api-key` header and compares it against the key
//! in the server configuration. When no key is configured, every call is rejected, so the
//! capture, void and refund endpoints are dead until an operator explicitly enables them.

use std::pin::Pin;
use std::rc::Rc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::ErrorUnauthorized;
use actix_web::{web, Error};
use futures::future::{ok, Ready};
use futures::Future;
use log::warn;

use crate::{config::ServerConfig, helpers::constant_time_eq};

/// The header carrying the admin API key.
pub const API_KEY_HEADER: &str = "cpg-api-key";

pub struct ApiKeyMiddlewareFactory;

impl ApiKeyMiddlewareFactory {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ApiKeyMiddlewareFactory
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = ApiKeyMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiKeyMiddlewareService { service: Rc::new(service) })
    }
}

pub struct ApiKeyMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let configured_key = req
                .app_data::<web::Data<ServerConfig>>()
                .and_then(|config| config.admin_api_key.as_ref())
                .map(|key| key.reveal().clone());
            let Some(configured_key) = configured_key else {
                warn!("🔐️ An admin endpoint was called, but no admin API key is configured. Denying access.");
                return Err(ErrorUnauthorized("Admin endpoints are disabled."));
            };
            let supplied = req.headers().get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
            match supplied {
                Some(key) if constant_time_eq(key, &configured_key) => service.call(req).await,
                Some(_) => {
                    warn!("🔐️ Invalid admin API key supplied. Denying access.");
                    Err(ErrorUnauthorized("Invalid API key."))
                },
                None => Err(ErrorUnauthorized("No API key supplied.")),
            }
        })
    }
}
