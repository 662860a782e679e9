use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/payments/create-intent`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    /// Amount in major currency units (e.g. dollars).
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub customer_id: Option<String>,
    pub rental_id: Option<String>,
    pub business_id: Option<String>,
}

/// Validated parameters for a new payment intent.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntentParams {
    /// Amount in minor currency units (e.g. cents).
    pub amount_minor: i64,
    pub currency: String,
    pub customer_id: String,
    pub rental_id: String,
    pub business_id: String,
}

/// Converts a major-unit amount to minor units, rounding to the nearest unit.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

impl CreateIntentRequest {
    /// Validates the request; returns a description of the first problem found.
    pub fn into_params(self) -> Result<PaymentIntentParams, String> {
        let amount = self
            .amount
            .filter(|a| a.is_finite())
            .ok_or_else(|| "Missing required field: amount".to_string())?;
        let amount_minor = to_minor_units(amount);
        if amount_minor <= 0 {
            return Err("Amount must be greater than zero".to_string());
        }

        let required = |value: Option<String>, name: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| format!("Missing required field: {}", name))
        };

        Ok(PaymentIntentParams {
            amount_minor,
            currency: self
                .currency
                .filter(|c| !c.trim().is_empty())
                .map(|c| c.trim().to_lowercase())
                .unwrap_or_else(|| "usd".to_string()),
            customer_id: required(self.customer_id, "customerId")?,
            rental_id: required(self.rental_id, "rentalId")?,
            business_id: required(self.business_id, "businessId")?,
        })
    }
}

/// The subset of a Stripe PaymentIntent this service uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub success: bool,
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// A Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

/// Payment state derived from a handled webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: Option<f64>) -> CreateIntentRequest {
        CreateIntentRequest {
            amount,
            currency: Some(" USD ".into()),
            customer_id: Some("cus_1".into()),
            rental_id: Some("rent_1".into()),
            business_id: Some("biz_1".into()),
        }
    }

    #[test]
    fn test_amount_converted_to_cents() {
        let params = request(Some(149.99)).into_params().unwrap();
        assert_eq!(params.amount_minor, 14999);
        assert_eq!(params.currency, "usd");
    }

    #[test]
    fn test_amount_required_and_positive() {
        assert!(request(None).into_params().is_err());
        assert!(request(Some(0.0)).into_params().is_err());
        assert!(request(Some(-5.0)).into_params().is_err());
        assert!(request(Some(f64::NAN)).into_params().is_err());
    }

    #[test]
    fn test_missing_ids_reported_by_name() {
        let mut req = request(Some(10.0));
        req.rental_id = None;
        assert_eq!(
            req.into_params().unwrap_err(),
            "Missing required field: rentalId"
        );
    }
}
