use crate::errors::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Provider receipt for an accepted message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentMessage {
    /// Provider-assigned message identifier.
    pub sid: String,
    /// Provider delivery status at acceptance time (e.g. "queued").
    pub status: String,
}

/// Something that can deliver a text message to a phone number.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    /// Sends `body` to `to`, which must already be in E.164 form.
    async fn send(&self, to: &str, body: &str) -> Result<SentMessage, AppError>;
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Client for the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioClient {
    /// Creates a new `TwilioClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Twilio API root, e.g. `https://api.twilio.com`.
    /// * `account_sid` - Account SID, also the basic-auth user.
    /// * `auth_token` - Auth token, the basic-auth password.
    /// * `from_number` - Sending number in E.164 form.
    pub fn new(
        base_url: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Twilio client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        })
    }
}

#[async_trait]
impl SmsTransport for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> Result<SentMessage, AppError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        tracing::debug!("Sending SMS to {} ({} chars)", to, body.chars().count());

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Twilio request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            // Twilio error bodies carry a human-readable message and numeric code
            let detail = match serde_json::from_str::<TwilioErrorBody>(&error_text) {
                Ok(TwilioErrorBody {
                    message: Some(message),
                    code,
                }) => match code {
                    Some(code) => format!("{} (code {})", message, code),
                    None => message,
                },
                _ => error_text,
            };
            return Err(AppError::ExternalApiError(format!(
                "Twilio returned {}: {}",
                status, detail
            )));
        }

        let sent: SentMessage = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Twilio response: {}", e))
        })?;

        tracing::info!("SMS accepted by Twilio: sid={}, status={}", sent.sid, sent.status);
        Ok(sent)
    }
}
