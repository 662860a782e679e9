use crate::errors::{AppError, ResultExt};
use crate::handlers::{json_body, AppState};
use crate::payment_models::{CreateIntentRequest, CreateIntentResponse, StripeEvent, WebhookAck};
use crate::payments::{handle_event, verify_signature};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

/// POST /api/payments/create-intent
///
/// Creates a payment intent for a rental and returns its client secret.
pub async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> Result<Json<CreateIntentResponse>, AppError> {
    let params = json_body(payload)?
        .into_params()
        .map_err(AppError::BadRequest)?;
    let gateway = state
        .payments
        .as_ref()
        .ok_or(AppError::NotConfigured("Stripe"))?;

    let intent = gateway
        .create_payment_intent(&params)
        .await
        .with_context(|| format!("creating payment intent for rental {}", params.rental_id))?;

    Ok(Json(CreateIntentResponse {
        success: true,
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
    }))
}

/// PUT /api/payments/create-intent
///
/// Stripe webhook receiver. The raw body is needed for signature verification,
/// so the event is decoded only after the signature checks out.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<WebhookAck>, AppError> {
    let body = body.map_err(|rejection| {
        AppError::BadRequest(format!("Invalid webhook body: {}", rejection.body_text()))
    })?;
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or(AppError::NotConfigured("Stripe webhook secret"))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("Missing Stripe-Signature header".to_string()))?;

    verify_signature(&body, signature, secret, Utc::now().timestamp())?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook event: {}", e)))?;

    tracing::info!("Received Stripe webhook {} ({})", event.id, event.event_type);
    let status = handle_event(&event);

    Ok(Json(WebhookAck {
        received: true,
        handled: status.is_some(),
        payment_status: status.map(|s| s.as_str().to_string()),
        event_type: event.event_type,
    }))
}
