//! # Reconciliation server
//! This module hosts the HTTP front end for the payment reconciliation engine. It is responsible
//! for:
//! Receiving the customer's browser when it returns from the provider's hosted payment page.
//! Listening for incoming webhook event deliveries from the payment provider.
//! Serving the verification poll and the merchant compensation operations.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more
//! information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/callback`: The redirect return route for customers coming back from the provider.
//! * `/webhook`: The HMAC-verified webhook route for provider event deliveries.
//! * `/payments/{payment_id}`: The verification poll route.
//! * `/orders/{order_id}/capture`, `/void`, `/refund`: Merchant compensation operations, guarded
//!   by the admin API key.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
