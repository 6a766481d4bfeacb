use std::time::Duration;

use cpg_common::Secret;
use log::*;

pub const DEFAULT_PROVIDER_URL: &str = "https://api.sandbox.checkout.example.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub secret_key: Secret<String>,
    /// Optional second credential set. Refunds that fail against the primary key are retried
    /// once against this one.
    pub fallback_secret_key: Option<Secret<String>>,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PROVIDER_URL.to_string(),
            secret_key: Secret::default(),
            fallback_secret_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProviderConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("CPG_PROVIDER_URL").unwrap_or_else(|_| {
            warn!("🪛️ CPG_PROVIDER_URL not set, using the sandbox default");
            DEFAULT_PROVIDER_URL.to_string()
        });
        let secret_key = Secret::new(std::env::var("CPG_PROVIDER_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ CPG_PROVIDER_SECRET_KEY not set. Payment API calls will be rejected upstream");
            String::default()
        }));
        let fallback_secret_key = std::env::var("CPG_PROVIDER_FALLBACK_SECRET_KEY").ok().map(Secret::new);
        let timeout = std::env::var("CPG_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self { base_url, secret_key, fallback_secret_key, timeout }
    }
}
