//! Router assembly and the serve loop.
//!
//! Three route groups share the state but sit behind distinct per-IP rate
//! limit buckets: public auth (200/15 min), general API (1000/15 min), and
//! the AI-backed extraction path (100/15 min). The webhook rides the
//! general group; its own gate is the shared-secret signature.

use std::{future::IntoFuture, net::SocketAddr, time::Duration};

use anyhow::Context;
use aspree_common::shutdown::ShutdownChannel;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    middleware::{rate_limit, security_headers, track_metrics, RateLimiter},
    routes,
    state::SharedState,
};

/// Hard ceiling on request handling time. Extraction calls carry the
/// longest upstream deadlines.
const HANDLING_TIMEOUT: Duration = Duration::from_secs(30);
/// Body limit that admits a 10 MiB upload plus multipart overhead.
const BODY_LIMIT: usize = 12 * 1024 * 1024;
/// Grace period for connections to finish after a shutdown signal.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(3);

pub fn build_router(state: SharedState) -> Router {
    let auth_limiter = RateLimiter::auth();
    let general_limiter = RateLimiter::general();
    let heavy_limiter = RateLimiter::heavy();

    #[rustfmt::skip]
    let auth_routes = Router::new()
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/verify", get(routes::auth::verify))
        .route("/api/auth/verify-email", post(routes::auth::verify_email))
        .route("/api/auth/resend-verification", post(routes::auth::resend_verification))
        .route("/api/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/api/auth/reset-password", post(routes::auth::reset_password))
        .route("/api/auth/change-password", post(routes::auth::change_password))
        .route("/api/auth/profile", get(routes::auth::get_profile).put(routes::auth::update_profile))
        .layer(from_fn_with_state(auth_limiter, rate_limit));

    #[rustfmt::skip]
    let heavy_routes = Router::new()
        .route("/api/preview-invoice", post(routes::invoices::preview))
        .layer(from_fn_with_state(heavy_limiter, rate_limit));

    #[rustfmt::skip]
    let general_routes = Router::new()
        // Business profile
        .route("/api/business/settings",
            get(routes::business::get_settings)
                .post(routes::business::update_settings))
        .route("/api/upload-business-logo", post(routes::business::upload_logo))
        .route("/api/remove-business-logo", delete(routes::business::remove_logo))
        // Payment methods
        .route("/api/payment-methods",
            get(routes::payment_methods::list_methods)
                .post(routes::payment_methods::upsert_method))
        .route("/api/payment-methods/test-connection",
            post(routes::payment_methods::test_connection))
        // Invoices
        .route("/api/confirm-invoice", post(routes::invoices::confirm))
        .route("/api/invoices", get(routes::invoices::list))
        .route("/api/invoices/number/{number}", get(routes::invoices::get_by_number))
        .route("/api/invoices/{id}",
            get(routes::invoices::get).delete(routes::invoices::delete))
        .route("/api/invoices/{id}/status", put(routes::invoices::update_status))
        .route("/api/invoices/{id}/payment-confirmation",
            post(routes::portal::upload_confirmation))
        .route("/api/invoices/{id}/payment-confirmations/approve",
            put(routes::invoices::approve_confirmation))
        .route("/api/invoices/{id}/payment-confirmations/reject",
            put(routes::invoices::reject_confirmation))
        .route("/api/invoices/{id}/confirm-down-payment",
            post(routes::invoices::confirm_down_payment))
        .route("/api/invoices/{id}/send-reminder",
            post(routes::invoices::send_reminder))
        // Customer portal (token-gated)
        .route("/api/customer/invoice/{token}", get(routes::portal::customer_invoice))
        .route("/api/final-payment/{token}", get(routes::portal::final_payment_summary))
        .route("/api/final-payment/{token}/payment-confirmation",
            post(routes::portal::upload_final_confirmation))
        // Orders
        .route("/api/orders", get(routes::orders::list))
        .route("/api/orders/sync-from-invoices", post(routes::orders::sync_from_invoices))
        .route("/api/orders/{id}",
            get(routes::orders::get)
                .put(routes::orders::update)
                .delete(routes::orders::delete))
        // Products
        .route("/api/products",
            get(routes::products::list).post(routes::products::create))
        .route("/api/products/{id}",
            get(routes::products::get)
                .put(routes::products::update)
                .delete(routes::products::delete))
        // Customers
        .route("/api/customers", get(routes::customers::list))
        .route("/api/customers/{id}",
            get(routes::customers::get)
                .put(routes::customers::update)
                .delete(routes::customers::delete))
        // Metrics
        .route("/api/metrics", get(routes::metrics::snapshot))
        // Gateway webhook (signature-gated)
        .route("/api/xendit/webhook", post(routes::webhook::xendit_webhook))
        .layer(from_fn_with_state(general_limiter, rate_limit));

    let cors = match &state.config.cors_origin {
        Some(origin) => match origin.parse::<http::HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin([origin])
                .allow_methods(tower_http::cors::AllowMethods::mirror_request())
                .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
                .allow_credentials(true),
            Err(_) => {
                warn!("CORS_ORIGIN is not a valid header value; ignoring");
                CorsLayer::new()
            }
        },
        None => CorsLayer::new(),
    };

    let production = state.config.deploy_env.is_prod();

    Router::new()
        .merge(auth_routes)
        .merge(heavy_routes)
        .merge(general_routes)
        .layer(from_fn_with_state(production, security_headers))
        .layer(from_fn_with_state(state.metrics.clone(), track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(HANDLING_TIMEOUT))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::extract::DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Bind and serve until a shutdown signal arrives, then drain connections
/// within the grace period.
pub async fn serve(
    state: SharedState,
    shutdown: ShutdownChannel,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {addr}"))?;
    info!("listening on http://{addr}");

    let router = build_router(state);
    let make_service =
        router.into_make_service_with_connect_info::<SocketAddr>();

    let server = axum::serve(listener, make_service)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown.recv().await;
                info!("shutting down API server");
            }
        })
        .into_future();

    tokio::pin!(server);
    tokio::select! {
        biased; // Observe the shutdown signal before a server exit.
        () = shutdown.recv() => {}
        result = &mut server =>
            return result.context("Server exited early"),
    }

    // The signal fired; cap the connection drain so a stuck client can't
    // hold the process open.
    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, server).await {
        Ok(result) => result.context("Server error"),
        Err(_elapsed) => {
            debug!("API server timed out during shutdown");
            Ok(())
        }
    }
}
