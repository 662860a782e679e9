use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Placeholder revenue attributed to every business in the aggregate stats.
pub const REVENUE_PER_BUSINESS: u64 = 45_000;

// ============ Response Envelope ============

/// Success envelope shared by the data-returning routes: `{success: true, data}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Always `true`; failures use the error envelope instead.
    pub success: bool,
    /// Route-specific payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wraps `data` in a success envelope.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// ============ Business Records ============

/// Kind of rental business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    HeavyEquipment,
    PartyRental,
    CarRental,
    ToolRental,
    Custom,
}

impl BusinessType {
    /// Wire and database name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::HeavyEquipment => "heavy_equipment",
            BusinessType::PartyRental => "party_rental",
            BusinessType::CarRental => "car_rental",
            BusinessType::ToolRental => "tool_rental",
            BusinessType::Custom => "custom",
        }
    }

    /// Parses a type name, falling back to `Custom` for anything unrecognized.
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or(BusinessType::Custom)
    }
}

impl FromStr for BusinessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heavy_equipment" => Ok(BusinessType::HeavyEquipment),
            "party_rental" => Ok(BusinessType::PartyRental),
            "car_rental" => Ok(BusinessType::CarRental),
            "tool_rental" => Ok(BusinessType::ToolRental),
            "custom" => Ok(BusinessType::Custom),
            other => Err(format!("Unknown business type '{}'", other)),
        }
    }
}

/// Lifecycle status of a business. New records start in `Setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessStatus {
    Active,
    Setup,
    Inactive,
}

impl BusinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessStatus::Active => "active",
            BusinessStatus::Setup => "setup",
            BusinessStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for BusinessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(BusinessStatus::Active),
            "setup" => Ok(BusinessStatus::Setup),
            "inactive" => Ok(BusinessStatus::Inactive),
            other => Err(format!(
                "Invalid status '{}'. Expected one of: active, setup, inactive",
                other
            )),
        }
    }
}

impl fmt::Display for BusinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to reach a business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    /// Website the profile was generated from.
    pub website: Option<String>,
    /// Contact email address.
    pub email: Option<String>,
    /// Phone number as printed on the website.
    pub phone: Option<String>,
    /// Street address.
    pub address: Option<String>,
}

/// Visual identity used by the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    /// Main brand color as a CSS hex string.
    pub primary_color: String,
    /// Accent color as a CSS hex string.
    pub secondary_color: String,
    /// Logo image URL, if one was found.
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            primary_color: "#1e40af".to_string(),
            secondary_color: "#f59e0b".to_string(),
            logo_url: None,
        }
    }
}

/// Everything describing a business except its identity, status and timestamps.
///
/// Produced by website analysis and handed to the store for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    /// Display name of the business.
    pub name: String,
    /// Kind of rental business, serialized as `type`.
    #[serde(rename = "type")]
    pub business_type: BusinessType,
    /// Free-text industry label, e.g. "Event Rentals".
    pub industry: String,
    /// How to reach the business.
    #[serde(default)]
    pub contact: ContactInfo,
    /// Short description of what the business rents out.
    #[serde(default)]
    pub description: String,
    /// Selling points listed on the storefront.
    #[serde(default)]
    pub features: Vec<String>,
    /// Storefront colors and logo.
    #[serde(default)]
    pub branding: Branding,
    /// Confidence of the generated profile, 0-100.
    pub confidence_score: u8,
    /// Unstructured details such as service area or years in business.
    #[serde(default)]
    pub business_details: Value,
    /// Reputation on a 0-5 scale.
    pub reputation_score: f64,
    /// Review counts, social profiles and detected technologies.
    #[serde(default)]
    pub web_intelligence: Value,
}

/// A stored business record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    /// Store-assigned identifier.
    pub id: String,
    /// Profile fields, flattened into the record on the wire.
    #[serde(flatten)]
    pub profile: BusinessProfile,
    /// Lifecycle status.
    pub status: BusinessStatus,
    /// When the record was stored.
    pub created_at: DateTime<Utc>,
    /// Last status change, or `created_at` if none.
    pub updated_at: DateTime<Utc>,
}

/// Aggregates over the whole business collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessStats {
    /// Number of stored businesses.
    pub total: usize,
    /// Businesses with status `active`.
    pub active: usize,
    /// `total` times [`REVENUE_PER_BUSINESS`].
    pub total_revenue: u64,
    /// Mean reputation score; `None` when there are no businesses.
    pub avg_reputation: Option<f64>,
}

impl BusinessStats {
    /// Derives the stats from a slice of records.
    pub fn from_records(records: &[Business]) -> Self {
        let total = records.len();
        let active = records
            .iter()
            .filter(|b| b.status == BusinessStatus::Active)
            .count();
        let avg_reputation = if total == 0 {
            None
        } else {
            let sum: f64 = records.iter().map(|b| b.profile.reputation_score).sum();
            Some(sum / total as f64)
        };

        Self {
            total,
            active,
            total_revenue: total as u64 * REVENUE_PER_BUSINESS,
            avg_reputation,
        }
    }
}

/// Payload of `GET /api/businesses`.
#[derive(Debug, Serialize)]
pub struct BusinessListData {
    pub businesses: Vec<Business>,
    pub stats: BusinessStats,
}

/// Payload of `GET /api/business/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDetailData {
    pub business: Business,
    pub stats: BusinessStats,
    /// Time the response was produced.
    pub last_updated: DateTime<Utc>,
}

/// Payload of `POST /api/businesses`.
#[derive(Debug, Serialize)]
pub struct CreatedBusinessData {
    pub id: String,
    pub business: Business,
}

/// Body of `POST /api/businesses`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBusinessRequest {
    pub website_url: Option<String>,
}

/// Body of `PUT /api/business/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

// ============ Equipment ============

/// An equipment item offered for rent by a business.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Equipment {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning business.
    pub business_id: String,
    /// Display name.
    pub name: String,
    /// Free-form category, matched exactly by the listing filter.
    pub category: String,
    /// Optional description, searched along with the name.
    pub description: Option<String>,
    /// Price per day. Stored with two decimal places.
    pub daily_rate: f64,
    /// Price per week, if offered.
    pub weekly_rate: Option<f64>,
    /// Price per month, if offered.
    pub monthly_rate: Option<f64>,
    /// Availability status, `available` by default.
    pub status: String,
    /// Units in stock.
    pub quantity: i32,
    /// Product image URL.
    pub image_url: Option<String>,
    /// Arbitrary technical specifications as a JSON object.
    pub specifications: Value,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// A validated equipment item ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEquipment {
    pub business_id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub daily_rate: f64,
    pub weekly_rate: Option<f64>,
    pub monthly_rate: Option<f64>,
    pub status: String,
    pub quantity: i32,
    pub image_url: Option<String>,
    pub specifications: Value,
}

/// Body of `POST /api/equipment`. Everything is optional so that missing
/// fields are reported in the envelope instead of as a decoding failure.
#[derive(Debug, Default, Deserialize)]
pub struct CreateEquipmentRequest {
    pub business_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub daily_rate: Option<f64>,
    pub weekly_rate: Option<f64>,
    pub monthly_rate: Option<f64>,
    pub status: Option<String>,
    pub quantity: Option<i32>,
    pub image_url: Option<String>,
    pub specifications: Option<Value>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CreateEquipmentRequest {
    /// Checks required fields and fills defaults.
    ///
    /// Returns the names of the missing required fields on failure.
    pub fn into_new_equipment(self) -> Result<NewEquipment, Vec<&'static str>> {
        let business_id = non_blank(self.business_id);
        let name = non_blank(self.name);
        let category = non_blank(self.category);

        let mut missing = Vec::new();
        if business_id.is_none() {
            missing.push("business_id");
        }
        if name.is_none() {
            missing.push("name");
        }
        if category.is_none() {
            missing.push("category");
        }
        if self.daily_rate.is_none() {
            missing.push("daily_rate");
        }

        match (business_id, name, category, self.daily_rate) {
            (Some(business_id), Some(name), Some(category), Some(daily_rate)) => {
                Ok(NewEquipment {
                    business_id,
                    name,
                    category,
                    description: self.description,
                    daily_rate,
                    weekly_rate: self.weekly_rate,
                    monthly_rate: self.monthly_rate,
                    status: non_blank(self.status).unwrap_or_else(|| "available".to_string()),
                    quantity: self.quantity.unwrap_or(1),
                    image_url: self.image_url,
                    specifications: self
                        .specifications
                        .unwrap_or_else(|| Value::Object(Default::default())),
                })
            }
            _ => Err(missing),
        }
    }
}

/// Query string of `GET /api/equipment`.
#[derive(Debug, Default, Deserialize)]
pub struct EquipmentQuery {
    /// Required; the listing is always scoped to one business.
    pub business_id: Option<String>,
    /// Exact category match.
    pub category: Option<String>,
    /// Exact status match.
    pub status: Option<String>,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, clamped to [`MAX_PAGE_SIZE`].
    pub limit: Option<u32>,
}

/// Page size when the query gives none.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Normalized equipment listing filter.
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentFilter {
    pub business_id: String,
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl EquipmentFilter {
    /// Builds a filter from the raw query; `None` when `business_id` is absent.
    pub fn from_query(query: EquipmentQuery) -> Option<Self> {
        Some(Self {
            business_id: non_blank(query.business_id)?,
            category: non_blank(query.category),
            status: non_blank(query.status),
            search: non_blank(query.search),
            page: query.page.unwrap_or(1).max(1),
            limit: query
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }

    /// Rows to skip before the current page.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Whether an item passes the business, category, status and search filters.
    pub fn matches(&self, item: &Equipment) -> bool {
        if item.business_id != self.business_id {
            return false;
        }
        if let Some(ref category) = self.category {
            if &item.category != category {
                return false;
            }
        }
        if let Some(ref status) = self.status {
            if &item.status != status {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let in_name = item.name.to_lowercase().contains(&needle);
            let in_description = item
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

/// One page of equipment plus the total number of matches.
#[derive(Debug, Clone)]
pub struct EquipmentPage {
    pub items: Vec<Equipment>,
    pub total: u64,
}

/// Paging metadata returned with equipment listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current 1-based page.
    pub page: u32,
    /// Page size in effect.
    pub limit: u32,
    /// Matching items across all pages.
    pub total: u64,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
}

impl Pagination {
    /// Computes the page count for `total` matches.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit.max(1) as u64),
        }
    }
}

/// Body of `GET /api/equipment`. Pagination sits beside `data`, not inside it.
#[derive(Debug, Serialize)]
pub struct EquipmentListResponse {
    pub success: bool,
    pub data: Vec<Equipment>,
    pub pagination: Pagination,
}
