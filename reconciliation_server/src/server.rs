use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use provider_client::ProviderClient;
use reconciliation_engine::{CompensationApi, ReconciliationApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    middleware::{HmacMiddlewareFactory, SIGNATURE_HEADER},
    routes::{
        health,
        CaptureOrderRoute,
        PaymentCallbackRoute,
        PaymentStatusRoute,
        RefundOrderRoute,
        VoidOrderRoute,
        WebhookRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let provider =
        ProviderClient::new(config.provider.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let reconciliation_api = ReconciliationApi::new(db.clone(), config.email_match_window);
        let compensation_api = CompensationApi::new(db.clone(), provider.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cpg::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(compensation_api))
            .app_data(web::Data::new(provider.clone()));
        // The signature must be checked against the raw body bytes, so the webhook route sits
        // behind the HMAC middleware rather than doing its own verification.
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                SIGNATURE_HEADER,
                config.webhook.hmac_secret.clone(),
                config.webhook.hmac_checks,
            ))
            .service(WebhookRoute::<SqliteDatabase>::new());
        app.service(health)
            .service(PaymentCallbackRoute::<SqliteDatabase, ProviderClient>::new())
            .service(PaymentStatusRoute::<SqliteDatabase, ProviderClient>::new())
            .service(CaptureOrderRoute::<SqliteDatabase, ProviderClient>::new())
            .service(VoidOrderRoute::<SqliteDatabase, ProviderClient>::new())
            .service(RefundOrderRoute::<SqliteDatabase, ProviderClient>::new())
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
