//! Business-profile generation from a company website.
//!
//! The site is fetched and reduced to plain text, then an Anthropic model is
//! asked to describe the business as a JSON object which is mapped onto a
//! [`BusinessProfile`].

use crate::errors::AppError;
use crate::models::{Branding, BusinessProfile, BusinessType, ContactInfo};
use async_trait::async_trait;
use moka::future::Cache;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;
use url::{Host, Url};

/// Longest slice of website text handed to the model.
pub const MAX_SITE_CHARS: usize = 12_000;

/// Website bytes read before the rest of the body is dropped.
pub const MAX_SITE_BYTES: usize = 2 * 1024 * 1024;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You analyze rental businesses from their website text. \
Respond with a single JSON object and nothing else.";

/// Produces a business profile for a website.
#[async_trait]
pub trait ProfileAnalyzer: Send + Sync {
    async fn analyze(&self, website: &Url) -> Result<BusinessProfile, AppError>;
}

/// Reduces an HTML document to readable text.
pub struct TextExtractor {
    hidden_blocks: Regex,
    tags: Regex,
    whitespace: Regex,
}

impl TextExtractor {
    pub fn new() -> Result<Self, AppError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| AppError::InternalError(format!("Invalid extractor pattern: {}", e)))
        };

        Ok(Self {
            hidden_blocks: compile(r"(?is)<(script|style|noscript|svg)\b.*?</(script|style|noscript|svg)>")?,
            tags: compile(r"(?s)<[^>]*>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Strips scripts, styles and tags, collapses whitespace and caps the length.
    pub fn extract(&self, html: &str) -> String {
        let without_hidden = self.hidden_blocks.replace_all(html, " ");
        let without_tags = self.tags.replace_all(&without_hidden, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
        let collapsed = self.whitespace.replace_all(&decoded, " ");
        collapsed.trim().chars().take(MAX_SITE_CHARS).collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawBranding {
    primary_color: Option<String>,
    secondary_color: Option<String>,
    logo_url: Option<String>,
}

/// Model output before defaults and clamping are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawProfile {
    name: Option<String>,
    #[serde(rename = "type")]
    business_type: Option<String>,
    industry: Option<String>,
    contact: Option<ContactInfo>,
    description: Option<String>,
    features: Option<Vec<String>>,
    branding: Option<RawBranding>,
    confidence_score: Option<f64>,
    business_details: Option<Value>,
    reputation_score: Option<f64>,
    web_intelligence: Option<Value>,
}

/// Parses the model's reply into a profile.
///
/// Takes the outermost `{...}` block so surrounding prose or code fences are
/// tolerated. The analyzed URL fills in a missing website.
pub fn parse_profile(reply: &str, website: &Url) -> Result<BusinessProfile, AppError> {
    let (start, end) = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(AppError::ExternalApiError(
                "AI response contained no JSON object".to_string(),
            ))
        }
    };

    let raw: RawProfile = serde_json::from_str(&reply[start..=end]).map_err(|e| {
        AppError::ExternalApiError(format!("Failed to parse AI profile JSON: {}", e))
    })?;

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::ExternalApiError("AI profile missing business name".into()))?;

    let mut contact = raw.contact.unwrap_or_default();
    if contact.website.is_none() {
        contact.website = Some(website.to_string());
    }

    let defaults = Branding::default();
    let branding = raw
        .branding
        .map(|b| Branding {
            primary_color: b.primary_color.unwrap_or(defaults.primary_color.clone()),
            secondary_color: b.secondary_color.unwrap_or(defaults.secondary_color.clone()),
            logo_url: b.logo_url,
        })
        .unwrap_or(defaults);

    Ok(BusinessProfile {
        name: name.trim().to_string(),
        business_type: raw
            .business_type
            .as_deref()
            .map(BusinessType::parse_lossy)
            .unwrap_or(BusinessType::Custom),
        industry: raw.industry.unwrap_or_else(|| "Equipment Rental".to_string()),
        contact,
        description: raw.description.unwrap_or_default(),
        features: raw.features.unwrap_or_default(),
        branding,
        confidence_score: raw.confidence_score.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8,
        business_details: raw.business_details.unwrap_or_else(|| json!({})),
        reputation_score: raw.reputation_score.unwrap_or(0.0),
        web_intelligence: raw.web_intelligence.unwrap_or_else(|| json!({})),
    })
}

fn analysis_prompt(website: &Url, text: &str) -> String {
    format!(
        r#"Website: {website}

Website text:
"""
{text}
"""

Describe this rental business as JSON with these keys:
- "name": business name
- "type": one of "heavy_equipment", "party_rental", "car_rental", "tool_rental", "custom"
- "industry": short industry label
- "contact": {{"website", "email", "phone", "address"}} (null when unknown)
- "description": two or three sentences
- "features": list of short selling points
- "branding": {{"primaryColor", "secondaryColor", "logoUrl"}} as hex colors and an absolute URL
- "confidenceScore": 0-100, how confident you are in this profile
- "businessDetails": object with any of "yearsInBusiness", "serviceArea", "fleetSize", "hours"
- "reputationScore": 0-5 estimate from reviews or testimonials on the site
- "webIntelligence": object with any of "reviewCount", "socialProfiles", "technologies""#
    )
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// True for addresses reachable on the public internet.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (b & 0xc0) == 64;
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || shared)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

fn literal_ip(url: &Url) -> Option<IpAddr> {
    match url.host()? {
        Host::Ipv4(ip) => Some(IpAddr::V4(ip)),
        Host::Ipv6(ip) => Some(IpAddr::V6(ip)),
        Host::Domain(_) => None,
    }
}

/// Analyzer backed by the Anthropic Messages API.
///
/// Profiles are cached per URL for an hour to avoid paying for repeated analyses.
#[derive(Clone)]
pub struct AnthropicAnalyzer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    extractor: std::sync::Arc<TextExtractor>,
    cache: Cache<String, BusinessProfile>,
    allow_private_hosts: bool,
}

impl AnthropicAnalyzer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AppError> {
        // Redirects to private address literals are refused; named hosts are
        // checked before the first request only.
        let redirects = reqwest::redirect::Policy::custom(|attempt| {
            if attempt.previous().len() >= 5 {
                attempt.error("too many redirects")
            } else if literal_ip(attempt.url()).is_some_and(|ip| !is_public_ip(ip)) {
                attempt.error("redirect to a non-public address")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(redirects)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Anthropic client: {}", e))
            })?;

        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600))
            .max_capacity(1_000)
            .build();

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            extractor: std::sync::Arc::new(TextExtractor::new()?),
            cache,
            allow_private_hosts: false,
        })
    }

    /// Allows websites on loopback and private networks. Off by default.
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Rejects websites that resolve to a non-public address.
    async fn ensure_public_host(&self, website: &Url) -> Result<(), AppError> {
        if self.allow_private_hosts {
            return Ok(());
        }

        let addrs: Vec<IpAddr> = match (literal_ip(website), website.host_str()) {
            (Some(ip), _) => vec![ip],
            (None, Some(domain)) => {
                let port = website.port_or_known_default().unwrap_or(80);
                tokio::net::lookup_host((domain, port))
                    .await
                    .map_err(|e| {
                        AppError::BadRequest(format!("Cannot resolve website host {}: {}", domain, e))
                    })?
                    .map(|addr| addr.ip())
                    .collect()
            }
            (None, None) => {
                return Err(AppError::BadRequest(format!("Website {} has no host", website)))
            }
        };

        if addrs.is_empty() || addrs.iter().any(|ip| !is_public_ip(*ip)) {
            tracing::warn!("Refusing to fetch {}: resolves to {:?}", website, addrs);
            return Err(AppError::BadRequest(format!(
                "Website {} does not resolve to a public address",
                website
            )));
        }
        Ok(())
    }

    async fn fetch_site_text(&self, website: &Url) -> Result<String, AppError> {
        self.ensure_public_host(website).await?;
        tracing::info!("Fetching website for analysis: {}", website);

        let mut response = self
            .client
            .get(website.clone())
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Website fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Website {} returned {}",
                website,
                response.status()
            )));
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to read website body: {}", e))
        })? {
            let room = MAX_SITE_BYTES - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!("Website {} truncated at {} bytes", website, MAX_SITE_BYTES);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        let html = String::from_utf8_lossy(&body);
        Ok(self.extractor.extract(&html))
    }

    async fn ask_model(&self, prompt: String) -> Result<String, AppError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "max_tokens": 2048,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": prompt }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Anthropic request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Anthropic returned {}: {}",
                status, error_text
            )));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Anthropic response: {}", e))
        })?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(AppError::ExternalApiError(
                "Anthropic response had no text content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl ProfileAnalyzer for AnthropicAnalyzer {
    async fn analyze(&self, website: &Url) -> Result<BusinessProfile, AppError> {
        let cache_key = website.to_string();
        if let Some(profile) = self.cache.get(&cache_key).await {
            tracing::debug!("Analysis cache HIT for {}", website);
            return Ok(profile);
        }

        let text = self.fetch_site_text(website).await?;
        if text.is_empty() {
            return Err(AppError::ExternalApiError(format!(
                "Website {} has no readable text",
                website
            )));
        }

        let reply = self.ask_model(analysis_prompt(website, &text)).await?;
        let profile = parse_profile(&reply, website)?;

        tracing::info!(
            "Generated profile for {}: {} ({}, confidence {})",
            website,
            profile.name,
            profile.business_type.as_str(),
            profile.confidence_score
        );
        self.cache.insert(cache_key, profile.clone()).await;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Url {
        Url::parse("https://party.example.com/").unwrap()
    }

    #[test]
    fn test_extract_strips_markup() {
        let extractor = TextExtractor::new().unwrap();
        let html = r#"<html><head><style>body{color:red}</style>
            <script>var x = "<b>";</script></head>
            <body><h1>Bounce &amp; Party</h1>
            <p>Tents,   tables
            and chairs.</p></body></html>"#;

        assert_eq!(extractor.extract(html), "Bounce & Party Tents, tables and chairs.");
    }

    #[test]
    fn test_extract_caps_length() {
        let extractor = TextExtractor::new().unwrap();
        let html = "a".repeat(MAX_SITE_CHARS * 2);
        assert_eq!(extractor.extract(&html).len(), MAX_SITE_CHARS);
    }

    #[test]
    fn test_parse_profile_tolerates_fences_and_fills_defaults() {
        let reply = r##"Here you go:
```json
{"name": "Bounce Town", "type": "party_rental", "confidenceScore": 140,
 "features": ["Free setup"], "branding": {"primaryColor": "#ff0000"}}
```"##;

        let profile = parse_profile(reply, &site()).unwrap();
        assert_eq!(profile.name, "Bounce Town");
        assert_eq!(profile.business_type, BusinessType::PartyRental);
        assert_eq!(profile.confidence_score, 100);
        assert_eq!(profile.branding.primary_color, "#ff0000");
        assert_eq!(profile.branding.secondary_color, Branding::default().secondary_color);
        assert_eq!(profile.contact.website.as_deref(), Some("https://party.example.com/"));
        assert_eq!(profile.features, vec!["Free setup"]);
    }

    #[test]
    fn test_parse_profile_unknown_type_is_custom() {
        let profile = parse_profile(r#"{"name": "Boats R Us", "type": "boat_rental"}"#, &site()).unwrap();
        assert_eq!(profile.business_type, BusinessType::Custom);
    }

    #[test]
    fn test_public_ip_classification() {
        for public in ["93.184.216.34", "8.8.8.8", "2606:2800:220:1:248:1893:25c8:1946"] {
            assert!(is_public_ip(public.parse().unwrap()), "{} should be public", public);
        }
        for private in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "::1",
            "fd00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
        ] {
            assert!(!is_public_ip(private.parse().unwrap()), "{} should not be public", private);
        }
    }

    #[tokio::test]
    async fn test_analyze_refuses_private_websites() {
        let analyzer = AnthropicAnalyzer::new("http://127.0.0.1:9", "key", "model").unwrap();

        for target in ["http://127.0.0.1:9/", "http://169.254.169.254/latest/meta-data", "http://[::1]/"] {
            let err = analyzer.analyze(&Url::parse(target).unwrap()).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{} gave {:?}", target, err);
        }
    }

    #[test]
    fn test_parse_profile_rejects_missing_name_or_json() {
        assert!(parse_profile("I could not read the site.", &site()).is_err());
        assert!(parse_profile(r#"{"type": "car_rental"}"#, &site()).is_err());
    }
}
