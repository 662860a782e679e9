use crate::analysis::{AnthropicAnalyzer, ProfileAnalyzer};
use crate::business_store::{BusinessStore, MemoryBusinessStore, PgBusinessStore};
use crate::config::Config;
use crate::dispatch::{BulkDispatcher, FixedIntervalGate};
use crate::equipment_store::{EquipmentStore, MemoryEquipmentStore, PgEquipmentStore};
use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::payments::{PaymentGateway, StripeClient};
use crate::sms::TwilioClient;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Business record store (Postgres or in-memory).
    pub businesses: Arc<dyn BusinessStore>,
    /// Equipment inventory store (Postgres or in-memory).
    pub equipment: Arc<dyn EquipmentStore>,
    /// Paced SMS sender; `None` when Twilio is not configured.
    pub sms: Option<BulkDispatcher>,
    /// Payment provider; `None` when Stripe is not configured.
    pub payments: Option<Arc<dyn PaymentGateway>>,
    /// Website analyzer; `None` when Anthropic is not configured.
    pub analyzer: Option<Arc<dyn ProfileAnalyzer>>,
}

impl AppState {
    /// Wires stores and provider clients from configuration.
    ///
    /// Uses the Postgres stores when a pool is given and the in-memory ones
    /// otherwise. Providers without credentials are left unset.
    pub fn from_config(config: Config, pool: Option<PgPool>) -> Result<Self, AppError> {
        let (businesses, equipment): (Arc<dyn BusinessStore>, Arc<dyn EquipmentStore>) =
            match pool {
                Some(pool) => (
                    Arc::new(PgBusinessStore::new(pool.clone(), config.seed_demo_business)),
                    Arc::new(PgEquipmentStore::new(pool)),
                ),
                None => {
                    tracing::warn!("DATABASE_URL not set, using in-memory stores");
                    let businesses = if config.seed_demo_business {
                        MemoryBusinessStore::with_demo_seed()
                    } else {
                        MemoryBusinessStore::new()
                    };
                    (Arc::new(businesses), Arc::new(MemoryEquipmentStore::new()))
                }
            };

        let sms = match config.twilio_credentials() {
            Some((sid, token, from)) => {
                let transport = TwilioClient::new(&config.twilio_base_url, sid, token, from)?;
                let gate = FixedIntervalGate::new(Duration::from_millis(config.sms_send_interval_ms));
                tracing::info!(
                    "✓ Twilio client initialized (interval {} ms, {} in flight)",
                    config.sms_send_interval_ms,
                    config.sms_max_in_flight
                );
                Some(BulkDispatcher::new(
                    Arc::new(transport),
                    Arc::new(gate),
                    config.sms_max_in_flight,
                ))
            }
            None => {
                tracing::warn!("Twilio credentials not set, SMS endpoints disabled");
                None
            }
        };

        let payments: Option<Arc<dyn PaymentGateway>> = match config.stripe_secret_key {
            Some(ref key) => {
                tracing::info!("✓ Stripe client initialized: {}", config.stripe_base_url);
                Some(Arc::new(StripeClient::new(&config.stripe_base_url, key)?))
            }
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set, payment intents disabled");
                None
            }
        };
        let analyzer: Option<Arc<dyn ProfileAnalyzer>> = match config.anthropic_api_key {
            Some(ref key) => {
                tracing::info!("✓ Anthropic analyzer initialized ({})", config.anthropic_model);
                Some(Arc::new(AnthropicAnalyzer::new(
                    &config.anthropic_base_url,
                    key,
                    &config.anthropic_model,
                )?))
            }
            None => {
                tracing::warn!("ANTHROPIC_API_KEY not set, website analysis disabled");
                None
            }
        };

        Ok(Self {
            config,
            businesses,
            equipment,
            sms,
            payments,
            analyzer,
        })
    }
}

/// Unwraps a JSON body, turning decoding failures into a 400 envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text())))
}

/// Health check endpoint.
///
/// Returns the service name and version. Never touches the stores.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-rental-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ Businesses ============

/// GET /api/businesses
///
/// Lists every business, newest first, with aggregate stats.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// * `Result<Json<ApiResponse<BusinessListData>>, AppError>` - The records and stats, or an error.
pub async fn list_businesses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<BusinessListData>>, AppError> {
    let businesses = state
        .businesses
        .get_all()
        .await
        .context("listing businesses")?;
    let stats = state.businesses.get_stats().await.context("business stats")?;

    tracing::info!("GET /businesses - {} record(s)", businesses.len());
    Ok(Json(ApiResponse::ok(BusinessListData { businesses, stats })))
}

/// GET /api/business/:id
///
/// Retrieves one business together with the collection-wide stats.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `id` - The business identifier.
///
/// # Returns
///
/// * `Result<Json<ApiResponse<BusinessDetailData>>, AppError>` - The record, or 404 if unknown.
pub async fn get_business(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BusinessDetailData>>, AppError> {
    tracing::info!("GET /business/{}", id);

    let business = state
        .businesses
        .get_by_id(&id)
        .await
        .with_context(|| format!("loading business {}", id))?
        .ok_or_else(|| AppError::NotFound("Business not found".to_string()))?;
    let stats = state.businesses.get_stats().await.context("business stats")?;

    Ok(Json(ApiResponse::ok(BusinessDetailData {
        business,
        stats,
        last_updated: Utc::now(),
    })))
}

/// Accepts absolute http(s) URLs only.
fn parse_website_url(raw: Option<String>) -> Result<Url, AppError> {
    let raw = raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing required field: websiteUrl".to_string()))?;

    let url = Url::parse(&raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid websiteUrl '{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::BadRequest(format!(
            "websiteUrl must be an http(s) URL, got '{}'",
            raw
        )));
    }
    Ok(url)
}

/// POST /api/businesses
///
/// Generates a profile from the business website and stores it in `setup`.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `payload` - Body carrying `websiteUrl`, an absolute http(s) URL.
///
/// # Returns
///
/// * `Result<(StatusCode, Json<ApiResponse<CreatedBusinessData>>), AppError>` - HTTP 201 with
///   the new id and record, 400 for a bad URL, 500 when analysis is unavailable or fails.
pub async fn create_business(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeBusinessRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedBusinessData>>), AppError> {
    let request = json_body(payload)?;
    let website = parse_website_url(request.website_url)?;
    let analyzer = state
        .analyzer
        .as_ref()
        .ok_or(AppError::NotConfigured("Anthropic"))?;

    tracing::info!("POST /businesses - analyzing {}", website);
    let profile = analyzer
        .analyze(&website)
        .await
        .with_context(|| format!("analyzing {}", website))?;

    let id = state
        .businesses
        .insert(profile)
        .await
        .context("storing generated business")?;
    let business = state
        .businesses
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::InternalError(format!("Business {} missing after insert", id)))?;

    tracing::info!("Created business {} ({})", id, business.profile.name);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CreatedBusinessData { id, business })),
    ))
}

/// PUT /api/business/:id/status
///
/// Moves a business to `active`, `setup` or `inactive` and returns the updated record.
pub async fn update_business_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Business>>, AppError> {
    let request = json_body(payload)?;
    let status: BusinessStatus = request
        .status
        .ok_or_else(|| AppError::BadRequest("Missing required field: status".to_string()))?
        .parse()
        .map_err(AppError::BadRequest)?;

    tracing::info!("PUT /business/{}/status -> {}", id, status);

    let updated = state
        .businesses
        .update_status(&id, status)
        .await
        .with_context(|| format!("updating status of {}", id))?;
    if !updated {
        return Err(AppError::NotFound("Business not found".to_string()));
    }

    let business = state
        .businesses
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Business not found".to_string()))?;
    Ok(Json(ApiResponse::ok(business)))
}

// ============ Equipment ============

/// GET /api/equipment?business_id=...
///
/// Filters by category, status and a name/description search, paginated.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `query` - Query parameters; `business_id` is required.
///
/// # Returns
///
/// * `Result<Json<EquipmentListResponse>, AppError>` - One page of items with pagination metadata.
pub async fn list_equipment(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EquipmentQuery>, QueryRejection>,
) -> Result<Json<EquipmentListResponse>, AppError> {
    let Query(query) =
        query.map_err(|e| AppError::BadRequest(format!("Invalid query: {}", e.body_text())))?;
    let filter = EquipmentFilter::from_query(query)
        .ok_or_else(|| AppError::BadRequest("Missing required parameter: business_id".to_string()))?;

    tracing::info!("GET /equipment - filter: {:?}", filter);

    let page = state
        .equipment
        .list(&filter)
        .await
        .with_context(|| format!("listing equipment for {}", filter.business_id))?;

    Ok(Json(EquipmentListResponse {
        success: true,
        pagination: Pagination::new(filter.page, filter.limit, page.total),
        data: page.items,
    }))
}

/// POST /api/equipment
///
/// Validates the item, fills defaults and stores it. Responds with HTTP 201.
/// All missing required fields are named in one 400 message.
pub async fn create_equipment(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateEquipmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Equipment>>), AppError> {
    let new = json_body(payload)?.into_new_equipment().map_err(|missing| {
        AppError::BadRequest(format!("Missing required fields: {}", missing.join(", ")))
    })?;

    tracing::info!("POST /equipment - {} for business {}", new.name, new.business_id);

    let item = state
        .equipment
        .create(new)
        .await
        .context("creating equipment")?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}
