use crate::errors::{AppError, ResultExt};
use crate::models::{Equipment, EquipmentFilter, EquipmentPage, NewEquipment};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage for the equipment inventory of every business.
#[async_trait]
pub trait EquipmentStore: Send + Sync {
    /// One page of matching equipment, newest first, plus the total match count.
    async fn list(&self, filter: &EquipmentFilter) -> Result<EquipmentPage, AppError>;

    /// Stores a validated item and returns it as persisted.
    async fn create(&self, new: NewEquipment) -> Result<Equipment, AppError>;
}

/// Assigns an id and timestamps to a validated item.
fn build_equipment(new: NewEquipment) -> Equipment {
    let now = Utc::now();
    Equipment {
        id: Uuid::new_v4(),
        business_id: new.business_id,
        name: new.name,
        category: new.category,
        description: new.description,
        daily_rate: new.daily_rate,
        weekly_rate: new.weekly_rate,
        monthly_rate: new.monthly_rate,
        status: new.status,
        quantity: new.quantity,
        image_url: new.image_url,
        specifications: new.specifications,
        created_at: now,
        updated_at: now,
    }
}

/// In-process inventory used when no database is configured.
#[derive(Default)]
pub struct MemoryEquipmentStore {
    items: RwLock<Vec<Equipment>>,
}

impl MemoryEquipmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EquipmentStore for MemoryEquipmentStore {
    async fn list(&self, filter: &EquipmentFilter) -> Result<EquipmentPage, AppError> {
        let items = self.items.read().await;

        let mut matching: Vec<&Equipment> = items.iter().rev().filter(|e| filter.matches(e)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(EquipmentPage { items: page, total })
    }

    async fn create(&self, new: NewEquipment) -> Result<Equipment, AppError> {
        let item = build_equipment(new);
        self.items.write().await.push(item.clone());
        Ok(item)
    }
}

/// Escapes `\`, `%` and `_` so `term` matches literally under `LIKE ... ESCAPE '\'`.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

const EQUIPMENT_COLUMNS: &str = r#"id, business_id, name, category, description,
       daily_rate::float8 AS daily_rate, weekly_rate::float8 AS weekly_rate,
       monthly_rate::float8 AS monthly_rate, status, quantity, image_url,
       specifications, created_at, updated_at"#;

/// Postgres-backed inventory. Rates are stored as `NUMERIC(12,2)` and read
/// back as `float8`.
#[derive(Clone)]
pub struct PgEquipmentStore {
    pool: PgPool,
}

impl PgEquipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends the `WHERE` clause shared by the count and page queries.
    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a EquipmentFilter) {
        builder.push(" WHERE business_id = ");
        builder.push_bind(&filter.business_id);
        if let Some(ref category) = filter.category {
            builder.push(" AND category = ");
            builder.push_bind(category);
        }
        if let Some(ref status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(ref search) = filter.search {
            let pattern = format!("%{}%", escape_like(search));
            builder.push(" AND (name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(r" ESCAPE '\' OR description ILIKE ");
            builder.push_bind(pattern);
            builder.push(r" ESCAPE '\')");
        }
    }
}

#[async_trait]
impl EquipmentStore for PgEquipmentStore {
    async fn list(&self, filter: &EquipmentFilter) -> Result<EquipmentPage, AppError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM equipment");
        Self::push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count equipment")?;

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM equipment",
            EQUIPMENT_COLUMNS
        ));
        Self::push_filters(&mut query, filter);
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(filter.limit as i64);
        query.push(" OFFSET ");
        query.push_bind(filter.offset() as i64);

        let items = query
            .build_query_as::<Equipment>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list equipment")?;

        Ok(EquipmentPage {
            items,
            total: total.max(0) as u64,
        })
    }

    async fn create(&self, new: NewEquipment) -> Result<Equipment, AppError> {
        let item = build_equipment(new);

        // Returns the stored row so rates come back rounded to cents
        let sql = format!(
            r#"
            INSERT INTO equipment (
                id, business_id, name, category, description, daily_rate, weekly_rate,
                monthly_rate, status, quantity, image_url, specifications, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {}
            "#,
            EQUIPMENT_COLUMNS
        );
        let stored = sqlx::query_as::<_, Equipment>(&sql)
        .bind(item.id)
        .bind(&item.business_id)
        .bind(&item.name)
        .bind(&item.category)
        .bind(&item.description)
        .bind(item.daily_rate)
        .bind(item.weekly_rate)
        .bind(item.monthly_rate)
        .bind(&item.status)
        .bind(item.quantity)
        .bind(&item.image_url)
        .bind(&item.specifications)
        .bind(item.created_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert equipment")?;

        tracing::debug!("Created equipment {} for business {}", stored.id, stored.business_id);
        Ok(stored)
    }
}
