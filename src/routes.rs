use crate::errors::AppError;
use crate::handlers::{self, AppState};
use crate::{notification_handler, payment_handler};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Response,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorError,
    GovernorLayer,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Largest accepted request body. Oversized bodies fail extraction and are
/// answered with the usual error envelope.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Businesses
        .route(
            "/api/businesses",
            get(handlers::list_businesses).post(handlers::create_business),
        )
        .route("/api/business/:id", get(handlers::get_business))
        .route(
            "/api/business/:id/status",
            put(handlers::update_business_status),
        )
        // Equipment
        .route(
            "/api/equipment",
            get(handlers::list_equipment).post(handlers::create_equipment),
        )
        // Notifications
        .route(
            "/api/notifications/sms",
            post(notification_handler::send_sms).put(notification_handler::send_bulk_sms),
        )
        // Payments: POST creates an intent, PUT receives Stripe webhooks
        .route(
            "/api/payments/create-intent",
            post(payment_handler::create_payment_intent).put(payment_handler::payment_webhook),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

fn finish(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Builds the application router without rate limiting.
pub fn build_router(state: Arc<AppState>) -> Router {
    finish(state, api_routes())
}

/// Renders limiter rejections in the error envelope, keeping its headers.
fn rate_limit_response(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut response = AppError::RateLimited { wait_secs: wait_time }.into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        other => AppError::InternalError(format!("Rate limiter failed: {}", other)).into_response(),
    }
}

/// Builds the application router with per-IP rate limiting on `/api/*`.
///
/// The health check stays outside the limiter.
pub fn build_rate_limited_router(
    state: Arc<AppState>,
    per_second: u64,
    burst_size: u32,
) -> anyhow::Result<Router> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(burst_size)
            .key_extractor(SmartIpKeyExtractor)
            .error_handler(rate_limit_response)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit: {}/s, burst {}", per_second, burst_size))?,
    );

    let api = api_routes().layer(ServiceBuilder::new().layer(GovernorLayer {
        config: governor_conf,
    }));
    Ok(finish(state, api))
}
