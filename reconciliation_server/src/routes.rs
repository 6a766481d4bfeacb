//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```

use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use provider_client::{PaymentStatus, ProviderApiError, ProviderPayment};
use reconciliation_engine::{
    db_types::Order,
    signal_objects::{CompletionSignal, RequestContext, SignalIds},
    traits::{PaymentEngineError, PaymentProvider, ReconciliationDatabase},
    CompensationApi,
    CompensationOutcome,
    FinalizeOutcome,
    ReconciliationApi,
    WebhookOutcome,
};

use crate::{
    config::ServerConfig,
    data_objects::{AmountParams, JsonResponse, PaymentStatusResponse, RedirectQuery},
    errors::ServerError,
    helpers::get_remote_ip,
};

/// The cookie holding the customer's cart token, set by the storefront at checkout time.
pub const CART_COOKIE: &str = "cpg_cart";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where admin) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>)
                    .wrap($crate::middleware::ApiKeyMiddlewareFactory::new());
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Redirect return  ----------------------------------------------
route!(payment_callback => Get "/callback" impl ReconciliationDatabase, PaymentProvider);
/// Route handler for the redirect return.
///
/// The customer's browser lands here after the provider's hosted page or a 3DS challenge. The
/// payment state is re-read from the provider (the query string is attacker-controlled, so
/// nothing in it is trusted beyond the payment id), the payment is reconciled against the local
/// order, and the browser is sent on to the confirmation page, or back to checkout when the
/// payment was declined.
pub async fn payment_callback<B, P>(
    req: HttpRequest,
    query: web::Query<RedirectQuery>,
    api: web::Data<ReconciliationApi<B>>,
    compensation: web::Data<CompensationApi<B, P>>,
    provider: web::Data<P>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    let q = query.into_inner();
    let remote_ip = get_remote_ip(&req, config.use_x_forwarded_for, config.use_forwarded);
    debug!("💻️ Redirect return for payment {} from {remote_ip:?}", q.payment_id);
    let payment = fetch_payment(provider.as_ref(), &q.payment_id, config.verbose_gateway_errors).await?;
    let mut ids = signal_ids(&payment);
    ids.order_id = q.order_id.clone().or(ids.order_id);
    ids.order_key = q.order_key.clone();
    ids.session_id = q.session_id.clone();
    let signal = CompletionSignal::RedirectReturn(ids);
    let mut ctx = RequestContext::new(Utc::now()).with_save_card(q.save_card.unwrap_or(false));
    if let Some(session_id) = &q.session_id {
        ctx = ctx.with_session(session_id.clone());
    }
    if let Some(cookie) = req.cookie(CART_COOKIE) {
        ctx = ctx.with_cart(cookie.value());
    }
    let outcome = api
        .reconcile_payment(&payment, &signal, &ctx)
        .await
        .map_err(|e| ServerError::from_engine(e, config.verbose_gateway_errors))?;
    let order = match outcome {
        FinalizeOutcome::Declined(_) => {
            info!("💻️ Payment {} was declined. Sending the customer back to checkout.", payment.id);
            return Ok(redirect_to(&config.checkout_url, &[("payment_declined", "1")]));
        },
        FinalizeOutcome::Applied(order) => {
            maybe_auto_capture(&order, compensation.as_ref(), config.as_ref()).await;
            order
        },
        FinalizeOutcome::AlreadyApplied(order) => order,
    };
    Ok(redirect_to(&config.confirmation_url, &[("order", order.order_number.as_str())]))
}

/// Capture immediately after authorization when the merchant runs in auto-capture mode. Best
/// effort: a failure here leaves the authorization in place and must not break the redirect.
async fn maybe_auto_capture<B, P>(order: &Order, compensation: &CompensationApi<B, P>, config: &ServerConfig)
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    use reconciliation_engine::db_types::OrderStatus;
    if !config.auto_capture || order.status != OrderStatus::Authorized {
        return;
    }
    match compensation.capture(order.id, None).await {
        Ok(CompensationOutcome::Completed(order)) => {
            info!("💻️ Order {} auto-captured.", order.order_number);
        },
        Ok(CompensationOutcome::Unknown(order)) => {
            warn!("💻️ Auto-capture of order {} timed out. The capture state is unknown.", order.order_number);
        },
        Err(e) => warn!("💻️ Auto-capture of order {} failed. {e}", order.order_number),
    }
}

//----------------------------------------------   Webhook  ----------------------------------------------------
route!(webhook => Post "" impl ReconciliationDatabase);
/// Route handler for provider event deliveries.
///
/// The HMAC middleware has already verified the body signature by the time this handler runs.
/// Anything the engine applied (or safely ignored) gets a 200 so the provider stops redelivering;
/// errors map to 4xx/5xx, which the provider treats as an invitation to redeliver later. That
/// redelivery is exactly what resolves a capture arriving before its authorization.
pub async fn webhook<B>(
    body: web::Json<provider_client::WebhookEvent>,
    api: web::Data<ReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
{
    let event = body.into_inner();
    trace!("💻️ Received {} webhook for payment {}", event.event_type, event.data.id);
    let result = match api.apply_webhook_event(&event, Utc::now()).await? {
        WebhookOutcome::Applied(order) => {
            info!("💻️ Webhook {} applied. Order {} is now {}.", event.event_type, order.order_number, order.status);
            JsonResponse::success(format!("Order {} updated.", order.order_number))
        },
        WebhookOutcome::NoOp(order) => {
            debug!("💻️ Webhook {} changed nothing for order {}.", event.event_type, order.order_number);
            JsonResponse::success("Event already applied.")
        },
        WebhookOutcome::Ignored => {
            debug!("💻️ Ignoring webhook event type {}.", event.event_type);
            JsonResponse::success("Event type ignored.")
        },
    };
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Verification poll  --------------------------------------------
route!(payment_status => Get "/payments/{payment_id}" impl ReconciliationDatabase, PaymentProvider);
/// Route handler for the verification poll.
///
/// Reads the payment state straight from the provider and reports it, together with the local
/// order the payment correlates to. When the provider reports an outcome the local order has
/// not caught up with (a missed webhook, say), the same finalization flow as the other channels
/// is run before answering.
pub async fn payment_status<B, P>(
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
    provider: web::Data<P>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    let payment_id = path.into_inner();
    trace!("💻️ Verification poll for payment {payment_id}");
    let payment = fetch_payment(provider.as_ref(), &payment_id, config.verbose_gateway_errors).await?;
    let signal = CompletionSignal::VerificationPoll(signal_ids(&payment));
    let ctx = RequestContext::new(Utc::now());
    // A pending payment (a 3DS challenge still in flight) must not decline the order, so the
    // state machine only runs once the provider reports a settled outcome.
    let settled = payment.approved || matches!(payment.status, PaymentStatus::Declined | PaymentStatus::Expired);
    let order = if settled {
        match api.reconcile_payment(&payment, &signal, &ctx).await {
            Ok(outcome) => Some(outcome.order().clone()),
            // A poll has no cart to synthesize from. Report the payment on its own.
            Err(PaymentEngineError::CartEmpty) => None,
            Err(e) => return Err(ServerError::from_engine(e, config.verbose_gateway_errors)),
        }
    } else {
        api.resolve_order(&signal, Utc::now())
            .await
            .map_err(|e| ServerError::from_engine(e, config.verbose_gateway_errors))?
            .map(|r| r.order)
    };
    let response = PaymentStatusResponse {
        payment_id: payment.id.clone(),
        payment_status: format!("{:?}", payment.status),
        approved: payment.approved,
        order_id: order.as_ref().map(|o| o.id),
        order_status: order.map(|o| o.status.to_string()),
    };
    Ok(HttpResponse::Ok().json(response))
}

//----------------------------------------------   Compensation  --------------------------------------------------
route!(capture_order => Post "/orders/{order_id}/capture" impl ReconciliationDatabase, PaymentProvider where admin);
pub async fn capture_order<B, P>(
    path: web::Path<i64>,
    body: Option<web::Json<AmountParams>>,
    api: web::Data<CompensationApi<B, P>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    let order_id = path.into_inner();
    let amount = body.and_then(|b| b.into_inner().amount);
    debug!("💻️ POST capture for order {order_id}");
    let outcome =
        api.capture(order_id, amount).await.map_err(|e| ServerError::from_engine(e, config.verbose_gateway_errors))?;
    Ok(compensation_response(outcome))
}

route!(void_order => Post "/orders/{order_id}/void" impl ReconciliationDatabase, PaymentProvider where admin);
pub async fn void_order<B, P>(
    path: web::Path<i64>,
    api: web::Data<CompensationApi<B, P>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    let order_id = path.into_inner();
    debug!("💻️ POST void for order {order_id}");
    let outcome = api.void(order_id).await.map_err(|e| ServerError::from_engine(e, config.verbose_gateway_errors))?;
    Ok(compensation_response(outcome))
}

route!(refund_order => Post "/orders/{order_id}/refund" impl ReconciliationDatabase, PaymentProvider where admin);
pub async fn refund_order<B, P>(
    path: web::Path<i64>,
    body: Option<web::Json<AmountParams>>,
    api: web::Data<CompensationApi<B, P>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PaymentProvider,
{
    let order_id = path.into_inner();
    let amount = body.and_then(|b| b.into_inner().amount);
    debug!("💻️ POST refund for order {order_id}");
    let outcome =
        api.refund(order_id, amount).await.map_err(|e| ServerError::from_engine(e, config.verbose_gateway_errors))?;
    Ok(compensation_response(outcome))
}

fn compensation_response(outcome: CompensationOutcome) -> HttpResponse {
    match outcome {
        CompensationOutcome::Completed(order) => HttpResponse::Ok().json(order),
        CompensationOutcome::Unknown(_) => HttpResponse::Accepted().json(JsonResponse::failure(
            "The provider did not confirm the operation in time. Check the payment state before retrying.",
        )),
    }
}

//----------------------------------------------   Shared plumbing  ----------------------------------------------

async fn fetch_payment<P: PaymentProvider>(
    provider: &P,
    payment_id: &str,
    verbose: bool,
) -> Result<ProviderPayment, ServerError> {
    provider.get_payment_details(payment_id).await.map_err(|e| match e {
        ProviderApiError::QueryError { status: 404, .. } => {
            ServerError::NotFound(format!("Payment {payment_id} does not exist at the provider."))
        },
        e if verbose => ServerError::GatewayError(e.to_string()),
        _ => ServerError::GatewayError("The payment could not be retrieved. Please try again later.".to_string()),
    })
}

/// The identifiers a payment record itself can contribute to correlation.
fn signal_ids(payment: &ProviderPayment) -> SignalIds {
    SignalIds {
        payment_id: payment.id.clone(),
        order_id: payment.metadata_order_id(),
        order_key: None,
        session_id: None,
        reference: payment.reference.clone(),
        customer_email: payment.customer_email().map(String::from),
        amount: Some(payment.amount),
    }
}

fn redirect_to(base: &str, params: &[(&str, &str)]) -> HttpResponse {
    let mut url = base.to_string();
    let query = serde_urlencoded::to_string(params).unwrap_or_default();
    if !query.is_empty() {
        url.push(if base.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    HttpResponse::SeeOther().insert_header((header::LOCATION, url)).finish()
}
