use serde::Deserialize;

/// Runtime configuration, read from the environment (and `.env` when present).
///
/// Provider credentials are optional: a missing provider is reported per request
/// instead of preventing startup, so the inventory endpoints keep working.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_base_url: String,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub twilio_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    /// Minimum spacing between two SMS sends, in milliseconds.
    pub sms_send_interval_ms: u64,
    /// Upper bound on concurrent SMS sends within a bulk request.
    pub sms_max_in_flight: usize,
    /// Insert the fixed demo business when the collection is read while empty.
    pub seed_demo_business: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3000,
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_base_url: "https://api.stripe.com".to_string(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            twilio_base_url: "https://api.twilio.com".to_string(),
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-3-5-sonnet-latest".to_string(),
            sms_send_interval_ms: 100,
            sms_max_in_flight: 1,
            seed_demo_business: false,
        }
    }
}

/// Reads an optional variable, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn http_url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = optional_var(name).unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            database_url: optional_var("DATABASE_URL")
                .or_else(|| optional_var("DB_URL"))
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            stripe_secret_key: optional_var("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: optional_var("STRIPE_WEBHOOK_SECRET"),
            stripe_base_url: http_url_var("STRIPE_BASE_URL", &defaults.stripe_base_url)?,
            twilio_account_sid: optional_var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: optional_var("TWILIO_AUTH_TOKEN"),
            twilio_phone_number: optional_var("TWILIO_PHONE_NUMBER"),
            twilio_base_url: http_url_var("TWILIO_BASE_URL", &defaults.twilio_base_url)?,
            anthropic_api_key: optional_var("ANTHROPIC_API_KEY"),
            anthropic_base_url: http_url_var("ANTHROPIC_BASE_URL", &defaults.anthropic_base_url)?,
            anthropic_model: optional_var("ANTHROPIC_MODEL").unwrap_or(defaults.anthropic_model),
            sms_send_interval_ms: optional_var("SMS_SEND_INTERVAL_MS")
                .map(|v| v.parse::<u64>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("SMS_SEND_INTERVAL_MS must be a number of milliseconds"))?
                .unwrap_or(defaults.sms_send_interval_ms),
            sms_max_in_flight: optional_var("SMS_MAX_IN_FLIGHT")
                .map(|v| v.parse::<usize>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("SMS_MAX_IN_FLIGHT must be a positive number"))?
                .unwrap_or(defaults.sms_max_in_flight),
            seed_demo_business: optional_var("SEED_DEMO_BUSINESS")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.seed_demo_business),
        };

        if config.sms_max_in_flight == 0 {
            anyhow::bail!("SMS_MAX_IN_FLIGHT must be at least 1");
        }

        // Log what is configured without the secret values themselves
        tracing::debug!(
            "Database: {}",
            if config.database_url.is_some() { "postgres" } else { "in-memory" }
        );
        tracing::debug!("Stripe configured: {}", config.stripe_secret_key.is_some());
        tracing::debug!("Twilio configured: {}", config.twilio_credentials().is_some());
        tracing::debug!("Anthropic configured: {}", config.anthropic_api_key.is_some());
        tracing::debug!(
            "SMS pacing: {}ms interval, {} in flight",
            config.sms_send_interval_ms,
            config.sms_max_in_flight
        );
        tracing::debug!("Server Port: {}", config.port);

        if config.stripe_secret_key.is_some() && config.stripe_webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set; payment webhooks will be rejected");
        }

        Ok(config)
    }

    /// Twilio credentials as `(account_sid, auth_token, from_number)` when all are set.
    pub fn twilio_credentials(&self) -> Option<(&str, &str, &str)> {
        match (
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.twilio_phone_number,
        ) {
            (Some(sid), Some(token), Some(from)) => Some((sid.as_str(), token.as_str(), from.as_str())),
            _ => None,
        }
    }
}
