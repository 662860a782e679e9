use serde::{Deserialize, Serialize};

/// Body of `POST /api/notifications/sms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsRequest {
    pub to: Option<String>,
    /// Literal message text. Takes precedence over template rendering.
    pub message: Option<String>,
    /// Notification type; when `message` is absent it names the template to render.
    #[serde(rename = "type")]
    pub notification_type: Option<String>,
    pub business_id: Option<String>,
    pub rental_id: Option<String>,
    /// Positional template arguments, used only when `message` is absent.
    pub template_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsResponse {
    pub success: bool,
    pub message_id: String,
    pub status: String,
}

/// Body of `PUT /api/notifications/sms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSmsRequest {
    #[serde(default)]
    pub recipients: Vec<String>,
    pub message: Option<String>,
    pub business_id: Option<String>,
}

/// Result of one recipient in a bulk send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsOutcome {
    /// The recipient exactly as supplied by the caller.
    pub phone: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SmsOutcome {
    pub fn sent(phone: &str, message_id: String) -> Self {
        Self {
            phone: phone.to_string(),
            success: true,
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(phone: &str, error: String) -> Self {
        Self {
            phone: phone.to_string(),
            success: false,
            message_id: None,
            error: Some(error),
        }
    }
}

/// Aggregated result of a bulk send. `results` is in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDispatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<SmsOutcome>,
}

impl BulkDispatchReport {
    pub fn from_outcomes(results: Vec<SmsOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkSmsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: BulkDispatchReport,
}
