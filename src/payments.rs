use crate::errors::AppError;
use crate::payment_models::{PaymentIntent, PaymentIntentParams, PaymentStatus, StripeEvent};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and clock skew) accepted for a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Creates payment intents with a card payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, AppError>;
}

/// Client for the Stripe PaymentIntents API.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Stripe client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<PaymentIntent, AppError> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        tracing::info!(
            "Creating payment intent: {} {} for rental {}",
            params.amount_minor,
            params.currency,
            params.rental_id
        );

        let amount = params.amount_minor.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", params.currency.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[customerId]", params.customer_id.as_str()),
            ("metadata[rentalId]", params.rental_id.as_str()),
            ("metadata[businessId]", params.business_id.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Stripe returned {}: {}",
                status, error_text
            )));
        }

        let intent: PaymentIntent = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Stripe response: {}", e))
        })?;

        tracing::info!("Payment intent created: {}", intent.id);
        Ok(intent)
    }
}

/// Computes the hex `v1` signature for a payload signed at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
///
/// Passes when any `v1` entry matches and the timestamp is within
/// [`SIGNATURE_TOLERANCE_SECS`] of `now`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp_str = timestamp
        .ok_or_else(|| AppError::InvalidSignature("Signature header has no timestamp".into()))?;
    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::InvalidSignature("Signature timestamp is not a number".into()))?;
    if candidates.is_empty() {
        return Err(AppError::InvalidSignature(
            "Signature header has no v1 signature".into(),
        ));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(AppError::InvalidSignature(format!(
            "Signature timestamp {} outside tolerance",
            timestamp
        )));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::InternalError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp_str.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(AppError::InvalidSignature(
            "No signature matched the payload".into(),
        ))
    }
}

/// Resolves a webhook event to the payment status it reports.
///
/// Returns `None` for event types this service does not act on.
pub fn handle_event(event: &StripeEvent) -> Option<PaymentStatus> {
    let object = &event.data.object;
    let intent_id = object.get("id").and_then(|v| v.as_str()).unwrap_or("unknown");
    let metadata = |key: &str| {
        object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or("-")
            .to_string()
    };

    let status = match event.event_type.as_str() {
        "payment_intent.succeeded" => PaymentStatus::Succeeded,
        "payment_intent.payment_failed" => PaymentStatus::Failed,
        "payment_intent.canceled" => PaymentStatus::Canceled,
        other => {
            tracing::debug!("Ignoring webhook event {} of type {}", event.id, other);
            return None;
        }
    };

    match status {
        PaymentStatus::Failed => {
            let reason = object
                .get("last_payment_error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("no reason given");
            tracing::warn!(
                "Payment {} failed (rental {}, business {}): {}",
                intent_id,
                metadata("rentalId"),
                metadata("businessId"),
                reason
            );
        }
        _ => tracing::info!(
            "Payment {} {:?} (rental {}, business {})",
            intent_id,
            status,
            metadata("rentalId"),
            metadata("businessId")
        ),
    }

    Some(status)
}
