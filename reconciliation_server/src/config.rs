use std::env;

use chrono::Duration;
use cpg_common::{parse_boolean_flag, Secret};
use log::*;
use provider_client::ProviderConfig;

const DEFAULT_CPG_HOST: &str = "127.0.0.1";
const DEFAULT_CPG_PORT: u16 = 8460;
const DEFAULT_EMAIL_MATCH_WINDOW: Duration = Duration::hours(6);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Connection details for the remote payment provider API.
    pub provider: ProviderConfig,
    pub webhook: WebhookConfig,
    /// The shared key for the merchant compensation endpoints. When unset, those endpoints
    /// reject every call.
    pub admin_api_key: Option<Secret<String>>,
    /// If true, raw provider error messages are passed through to API clients. Off by default,
    /// since those messages can leak gateway internals.
    pub verbose_gateway_errors: bool,
    /// If true, an authorized payment is captured immediately after the redirect return lands.
    pub auto_capture: bool,
    /// How far back the email-and-amount correlation heuristic may look for a pending order.
    pub email_match_window: Duration,
    /// Where the customer's browser is sent after a successful payment.
    pub confirmation_url: String,
    /// Where the customer's browser is sent when the payment was declined.
    pub checkout_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather
    /// than the connection's remote address.
    pub use_forwarded: bool,
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// The key used to sign webhook payloads.
    pub hmac_secret: Secret<String>,
    /// If false, the signature check is skipped entirely. Only useful on dev boxes.
    pub hmac_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CPG_HOST.to_string(),
            port: DEFAULT_CPG_PORT,
            database_url: String::default(),
            provider: ProviderConfig::default(),
            webhook: WebhookConfig::default(),
            admin_api_key: None,
            verbose_gateway_errors: false,
            auto_capture: false,
            email_match_window: DEFAULT_EMAIL_MATCH_WINDOW,
            confirmation_url: String::default(),
            checkout_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("CPG_HOST").ok().unwrap_or_else(|| DEFAULT_CPG_HOST.into());
        let port = env::var("CPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CPG_PORT. {e} Using the default, {DEFAULT_CPG_PORT}, instead."
                    );
                    DEFAULT_CPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_CPG_PORT);
        let database_url = env::var("CPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CPG_DATABASE_URL is not set. Please set it to the URL for the orders database.");
            String::default()
        });
        let provider = ProviderConfig::new_from_env_or_default();
        let webhook = WebhookConfig::from_env_or_default();
        let admin_api_key = match env::var("CPG_ADMIN_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(Secret::new(key)),
            _ => {
                error!(
                    "🪛️ CPG_ADMIN_API_KEY is not set. The capture, void and refund endpoints will reject all calls."
                );
                None
            },
        };
        let verbose_gateway_errors = parse_boolean_flag(env::var("CPG_VERBOSE_GATEWAY_ERRORS").ok(), false);
        let auto_capture = parse_boolean_flag(env::var("CPG_AUTO_CAPTURE").ok(), false);
        let use_x_forwarded_for = parse_boolean_flag(env::var("CPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("CPG_USE_FORWARDED").ok(), false);
        let email_match_window = configure_email_match_window();
        let confirmation_url = env::var("CPG_CONFIRMATION_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ CPG_CONFIRMATION_URL is not set. Customers will be redirected to the site root.");
            "/".to_string()
        });
        let checkout_url = env::var("CPG_CHECKOUT_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ CPG_CHECKOUT_URL is not set. Declined customers will be redirected to the site root.");
            "/".to_string()
        });
        Self {
            host,
            port,
            database_url,
            provider,
            webhook,
            admin_api_key,
            verbose_gateway_errors,
            auto_capture,
            email_match_window,
            confirmation_url,
            checkout_url,
            use_x_forwarded_for,
            use_forwarded,
        }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("CPG_WEBHOOK_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ CPG_WEBHOOK_HMAC_SECRET is not set. Please set it to the signing key configured on the \
                 provider's webhook workflow."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("CPG_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Anyone can post events to this server. Do not run like this in production.");
        }
        Self { hmac_secret, hmac_checks }
    }
}

fn configure_email_match_window() -> Duration {
    env::var("CPG_EMAIL_MATCH_WINDOW_HOURS")
        .map_err(|_| {
            info!(
                "🪛️ CPG_EMAIL_MATCH_WINDOW_HOURS is not set. Using the default value of {} hrs.",
                DEFAULT_EMAIL_MATCH_WINDOW.num_hours()
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::hours)
                .map_err(|e| warn!("🪛️ Invalid configuration value for CPG_EMAIL_MATCH_WINDOW_HOURS. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_EMAIL_MATCH_WINDOW)
}
