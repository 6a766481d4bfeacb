//! HMAC middleware for Actix Web.
//!
//! This module provides a middleware for Actix Web that checks the HMAC signature of incoming
//! requests.
//!
//! The payment provider signs every webhook delivery with the workflow's signing key, using
//! HMAC-SHA256 over the raw body bytes, and puts the hex-encoded result in the `cko-signature`
//! header.
//!
//! You can use this middleware to verify the signature of incoming requests by wrapping the
//! webhook routes with this middleware. The check must run against the raw bytes, before any
//! JSON deserialization, so the middleware extracts the payload and re-injects it for the
//! downstream handler.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorUnauthorized},
    web,
    Error,
};
use cpg_common::Secret;
use futures::future::LocalBoxFuture;
use log::{trace, warn};

use crate::helpers::verify_signature;

/// The header carrying the hex-encoded HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "cko-signature";

pub struct HmacMiddlewareFactory {
    signature_header: String,
    key: Secret<String>,
    // If false, then the middleware will not check the HMAC signature and always allow the call
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(signature_header: &str, key: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { signature_header: signature_header.into(), key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService {
            signature_header: self.signature_header.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct HmacMiddlewareService<S> {
    signature_header: String,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let signature_header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking HMAC for request");
            if !enabled {
                trace!("🔐️ HMAC checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            let signature = req.headers().get(&signature_header).and_then(|v| v.to_str().ok()).ok_or_else(|| {
                warn!("🔐️ No HMAC signature found in request. Denying access.");
                ErrorUnauthorized("No HMAC signature found.")
            })?;
            if verify_signature(&secret, data.as_ref(), signature) {
                trace!("🔐️ HMAC check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid HMAC signature found in request. Denying access.");
                Err(ErrorUnauthorized("Invalid HMAC signature."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
