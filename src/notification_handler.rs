use crate::dispatch::normalize_phone;
use crate::errors::{AppError, ResultExt};
use crate::handlers::{json_body, AppState};
use crate::notification_models::{BulkSmsRequest, BulkSmsResponse, SendSmsRequest, SendSmsResponse};
use crate::templates::render_template;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing required field: {}", field)))
}

/// Picks the literal message, or renders the template named by `type`.
fn resolve_message(request: &SendSmsRequest) -> Result<String, AppError> {
    if let Some(message) = request.message.as_ref().filter(|m| !m.trim().is_empty()) {
        return Ok(message.clone());
    }

    let Some(ref args) = request.template_args else {
        return Err(AppError::BadRequest(
            "Missing required field: message".to_string(),
        ));
    };
    let kind = request.notification_type.as_deref().unwrap_or_default();
    let rendered = render_template(kind, args);
    if rendered.is_empty() {
        return Err(AppError::BadRequest(format!(
            "No message given and '{}' is not a known template",
            kind
        )));
    }
    Ok(rendered)
}

/// POST /api/notifications/sms
///
/// Sends a single SMS, either the literal `message` or a rendered template.
pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SendSmsRequest>, JsonRejection>,
) -> Result<Json<SendSmsResponse>, AppError> {
    let request = json_body(payload)?;
    let to = required(request.to.clone(), "to")?;
    let business_id = required(request.business_id.clone(), "businessId")?;
    let body = resolve_message(&request)?;

    let dispatcher = state.sms.as_ref().ok_or(AppError::NotConfigured("Twilio"))?;
    let to = normalize_phone(&to);

    tracing::info!(
        "POST /notifications/sms - {} notification for business {} (rental {})",
        request.notification_type.as_deref().unwrap_or("custom"),
        business_id,
        request.rental_id.as_deref().unwrap_or("-")
    );

    let sent = dispatcher
        .send_paced(&to, &body)
        .await
        .with_context(|| format!("sending SMS for business {}", business_id))?;

    tracing::info!("SMS {} accepted with status {}", sent.sid, sent.status);
    Ok(Json(SendSmsResponse {
        success: true,
        message_id: sent.sid,
        status: sent.status,
    }))
}

/// PUT /api/notifications/sms
///
/// Sends one message to every recipient and reports a per-recipient outcome.
/// Individual failures do not fail the request.
pub async fn send_bulk_sms(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BulkSmsRequest>, JsonRejection>,
) -> Result<Json<BulkSmsResponse>, AppError> {
    let request = json_body(payload)?;
    if request.recipients.is_empty() {
        return Err(AppError::BadRequest(
            "Recipients list is required and must not be empty".to_string(),
        ));
    }
    let message = required(request.message, "message")?;

    let dispatcher = state.sms.as_ref().ok_or(AppError::NotConfigured("Twilio"))?;
    let business_id = request.business_id.unwrap_or_else(|| "unknown".to_string());

    let report = dispatcher
        .dispatch(&business_id, &message, &request.recipients)
        .await;

    Ok(Json(BulkSmsResponse {
        success: true,
        report,
    }))
}
