use crate::errors::{AppError, ResultExt};
use crate::models::{
    Branding, Business, BusinessProfile, BusinessStats, BusinessStatus, BusinessType, ContactInfo,
    REVENUE_PER_BUSINESS,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage for business records.
///
/// Records are never deleted. Lookups of unknown ids yield `None` rather than
/// an error, and status updates of unknown ids are no-ops.
#[async_trait]
pub trait BusinessStore: Send + Sync {
    /// Stores a new business in `setup` status and returns its fresh id.
    async fn insert(&self, profile: BusinessProfile) -> Result<String, AppError>;

    /// All businesses, most recently created first.
    async fn get_all(&self) -> Result<Vec<Business>, AppError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Business>, AppError>;

    /// Overwrites the status and refreshes `updated_at`.
    /// Returns `false` when no business has this id.
    async fn update_status(&self, id: &str, status: BusinessStatus) -> Result<bool, AppError>;

    async fn get_stats(&self) -> Result<BusinessStats, AppError>;
}

/// The fixed demo profile used when seeding an empty collection.
pub fn demo_profile() -> BusinessProfile {
    BusinessProfile {
        name: "Summit Equipment Rentals".to_string(),
        business_type: BusinessType::HeavyEquipment,
        industry: "Construction Equipment Rental".to_string(),
        contact: ContactInfo {
            website: Some("https://summit-rentals.example.com".to_string()),
            email: Some("info@summit-rentals.example.com".to_string()),
            phone: Some("(555) 010-4477".to_string()),
            address: Some("1200 Industrial Way, Denver, CO 80216".to_string()),
        },
        description: "Excavators, skid steers and aerial lifts for contractors and homeowners."
            .to_string(),
        features: vec![
            "Same-day delivery".to_string(),
            "Online booking".to_string(),
            "Operator training".to_string(),
        ],
        branding: Branding::default(),
        confidence_score: 92,
        business_details: json!({
            "yearsInBusiness": 12,
            "serviceArea": "Denver metro",
            "fleetSize": 85
        }),
        reputation_score: 4.7,
        web_intelligence: json!({
            "reviewCount": 214,
            "socialProfiles": ["facebook", "linkedin"]
        }),
    }
}

/// Process-local store. Suitable for development and tests; data is lost on restart.
#[derive(Default)]
pub struct MemoryBusinessStore {
    records: RwLock<Vec<Business>>,
    seed_demo: bool,
}

impl MemoryBusinessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that inserts the demo business the first time it is listed while empty.
    pub fn with_demo_seed() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            seed_demo: true,
        }
    }

    fn new_record(profile: BusinessProfile, status: BusinessStatus) -> Business {
        let now = Utc::now();
        Business {
            id: Uuid::new_v4().to_string(),
            profile,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl BusinessStore for MemoryBusinessStore {
    async fn insert(&self, profile: BusinessProfile) -> Result<String, AppError> {
        let record = Self::new_record(profile, BusinessStatus::Setup);
        let id = record.id.clone();
        self.records.write().await.push(record);
        tracing::debug!("Inserted business {}", id);
        Ok(id)
    }

    async fn get_all(&self) -> Result<Vec<Business>, AppError> {
        if self.seed_demo {
            let mut records = self.records.write().await;
            if records.is_empty() {
                tracing::info!("Business collection empty, seeding demo business");
                records.push(Self::new_record(demo_profile(), BusinessStatus::Active));
            }
        }

        let mut all = self.records.read().await.clone();
        // Newest insertions first so equal timestamps still list the latest record first
        all.reverse();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Business>, AppError> {
        Ok(self.records.read().await.iter().find(|b| b.id == id).cloned())
    }

    async fn update_status(&self, id: &str, status: BusinessStatus) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|b| b.id == id) {
            Some(record) => {
                record.status = status;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => {
                tracing::debug!("Status update for unknown business {} ignored", id);
                Ok(false)
            }
        }
    }

    async fn get_stats(&self) -> Result<BusinessStats, AppError> {
        Ok(BusinessStats::from_records(&self.records.read().await))
    }
}

#[derive(FromRow)]
struct BusinessRow {
    id: String,
    name: String,
    business_type: String,
    industry: String,
    website: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    description: String,
    features: Json<Vec<String>>,
    branding: Json<Branding>,
    confidence_score: i16,
    business_details: Value,
    reputation_score: f64,
    web_intelligence: Value,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BusinessRow> for Business {
    type Error = AppError;

    fn try_from(row: BusinessRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<BusinessStatus>().map_err(|e| {
            AppError::InternalError(format!("Corrupt status on business {}: {}", row.id, e))
        })?;

        Ok(Business {
            id: row.id,
            profile: BusinessProfile {
                name: row.name,
                business_type: BusinessType::parse_lossy(&row.business_type),
                industry: row.industry,
                contact: ContactInfo {
                    website: row.website,
                    email: row.email,
                    phone: row.phone,
                    address: row.address,
                },
                description: row.description,
                features: row.features.0,
                branding: row.branding.0,
                confidence_score: row.confidence_score.clamp(0, 100) as u8,
                business_details: row.business_details,
                reputation_score: row.reputation_score,
                web_intelligence: row.web_intelligence,
            },
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Advisory lock key serializing demo seeding across connections.
const DEMO_SEED_LOCK_KEY: i64 = 0x7265_6e74_616c_0001;

const SELECT_BUSINESS: &str = r#"
    SELECT id, name, business_type, industry, website, email, phone, address,
           description, features, branding, confidence_score, business_details,
           reputation_score, web_intelligence, status, created_at, updated_at
    FROM businesses
"#;

/// Postgres-backed store. Writes run inside transactions.
#[derive(Clone)]
pub struct PgBusinessStore {
    pool: PgPool,
    seed_demo: bool,
}

impl PgBusinessStore {
    pub fn new(pool: PgPool, seed_demo: bool) -> Self {
        Self { pool, seed_demo }
    }

    async fn insert_with_status(
        &self,
        profile: BusinessProfile,
        status: BusinessStatus,
        only_if_empty: bool,
    ) -> Result<Option<String>, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        // The seeding variant inserts only while the table is still empty
        let guard = if only_if_empty {
            "WHERE NOT EXISTS (SELECT 1 FROM businesses)"
        } else {
            ""
        };
        let sql = format!(
            r#"
            INSERT INTO businesses (
                id, name, business_type, industry, website, email, phone, address,
                description, features, branding, confidence_score, business_details,
                reputation_score, web_intelligence, status, created_at, updated_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17
            {}
            "#,
            guard
        );

        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        if only_if_empty {
            // Held until commit; the guarded insert below then sees any seed
            // committed by a concurrent reader
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(DEMO_SEED_LOCK_KEY)
                .execute(&mut *tx)
                .await
                .context("Failed to take demo seed lock")?;
        }

        let result = sqlx::query(&sql)
            .bind(&id)
            .bind(&profile.name)
            .bind(profile.business_type.as_str())
            .bind(&profile.industry)
            .bind(&profile.contact.website)
            .bind(&profile.contact.email)
            .bind(&profile.contact.phone)
            .bind(&profile.contact.address)
            .bind(&profile.description)
            .bind(Json(&profile.features))
            .bind(Json(&profile.branding))
            .bind(profile.confidence_score as i16)
            .bind(&profile.business_details)
            .bind(profile.reputation_score)
            .bind(&profile.web_intelligence)
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert business")?;

        tx.commit().await.context("Failed to commit business insert")?;

        Ok((result.rows_affected() > 0).then_some(id))
    }
}

#[async_trait]
impl BusinessStore for PgBusinessStore {
    async fn insert(&self, profile: BusinessProfile) -> Result<String, AppError> {
        let id = self
            .insert_with_status(profile, BusinessStatus::Setup, false)
            .await?
            .ok_or_else(|| AppError::InternalError("Business insert affected no rows".into()))?;
        tracing::debug!("Inserted business {}", id);
        Ok(id)
    }

    async fn get_all(&self) -> Result<Vec<Business>, AppError> {
        if self.seed_demo {
            if let Some(id) = self
                .insert_with_status(demo_profile(), BusinessStatus::Active, true)
                .await?
            {
                tracing::info!("Business table empty, seeded demo business {}", id);
            }
        }

        let rows = sqlx::query_as::<_, BusinessRow>(&format!(
            "{} ORDER BY created_at DESC",
            SELECT_BUSINESS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list businesses")?;

        rows.into_iter().map(Business::try_from).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Business>, AppError> {
        let row = sqlx::query_as::<_, BusinessRow>(&format!("{} WHERE id = $1", SELECT_BUSINESS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load business")?;

        row.map(Business::try_from).transpose()
    }

    async fn update_status(&self, id: &str, status: BusinessStatus) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        let result = sqlx::query(
            "UPDATE businesses SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to update business status")?;

        tx.commit().await.context("Failed to commit status update")?;

        if result.rows_affected() == 0 {
            tracing::debug!("Status update for unknown business {} ignored", id);
        }
        Ok(result.rows_affected() > 0)
    }

    async fn get_stats(&self) -> Result<BusinessStats, AppError> {
        let (total, active, avg_reputation): (i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'active'),
                   AVG(reputation_score)
            FROM businesses
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to aggregate business stats")?;

        let total = total.max(0) as usize;
        Ok(BusinessStats {
            total,
            active: active.max(0) as usize,
            total_revenue: total as u64 * REVENUE_PER_BUSINESS,
            avg_reputation,
        })
    }
}
