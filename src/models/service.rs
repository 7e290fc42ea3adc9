use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A bookable service offered by a tenant
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub deposit_cents: i64, // 0 = no deposit required
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceData {
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: i32,
    pub price_cents: i64,
    #[serde(default)]
    pub deposit_cents: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateServiceData {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub price_cents: Option<i64>,
    pub deposit_cents: Option<i64>,
}

impl Service {
    pub fn requires_deposit(&self) -> bool {
        self.deposit_cents > 0
    }

    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateServiceData,
    ) -> Result<Self, sqlx::Error> {
        let service = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO services (tenant_id, name, description, duration_minutes, price_cents, deposit_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.duration_minutes)
        .bind(data.price_cents)
        .bind(data.deposit_cents)
        .fetch_one(pool)
        .await?;

        Ok(service)
    }

    /// Finds a service scoped to its tenant
    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let service = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM services WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        Ok(service)
    }

    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let services = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM services
            WHERE tenant_id = $1 AND (is_active = TRUE OR NOT $2)
            ORDER BY name ASC
            "#,
        )
        .bind(tenant_id)
        .bind(active_only)
        .fetch_all(pool)
        .await?;

        Ok(services)
    }

    pub async fn count_active(pool: &PgPool, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM services WHERE tenant_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateServiceData,
    ) -> Result<Option<Self>, sqlx::Error> {
        let service = sqlx::query_as::<_, Self>(
            r#"
            UPDATE services
            SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                duration_minutes = COALESCE($5, duration_minutes),
                price_cents = COALESCE($6, price_cents),
                deposit_cents = COALESCE($7, deposit_cents),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.duration_minutes)
        .bind(data.price_cents)
        .bind(data.deposit_cents)
        .fetch_optional(pool)
        .await?;

        Ok(service)
    }

    /// Deactivates a service (soft delete; past bookings keep referencing it)
    pub async fn deactivate(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE services
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
