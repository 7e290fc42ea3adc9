use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerData {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Customer row with booking activity for the dashboard
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub total_bookings: i64,
    pub last_booking_date: Option<chrono::NaiveDate>,
}

impl Customer {
    /// Finds a customer by email within the tenant, creating it if needed.
    ///
    /// Name and phone of an existing customer are refreshed with the latest values.
    pub async fn upsert<'e, E>(
        executor: E,
        tenant_id: Uuid,
        data: &CustomerData,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let customer = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO customers (tenant_id, name, email, phone)
            VALUES ($1, $2, LOWER($3), $4)
            ON CONFLICT (tenant_id, email) DO UPDATE
            SET
                name = EXCLUDED.name,
                phone = COALESCE(EXCLUDED.phone, customers.phone),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(data.name.trim())
        .bind(data.email.trim())
        .bind(&data.phone)
        .fetch_one(executor)
        .await?;

        Ok(customer)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let customer = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM customers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(customer)
    }

    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CustomerSummary>, sqlx::Error> {
        let pattern = search.map(|s| format!("%{}%", s.trim().to_lowercase()));

        let customers = sqlx::query_as::<_, CustomerSummary>(
            r#"
            SELECT
                c.id, c.name, c.email, c.phone,
                COUNT(b.id) AS total_bookings,
                MAX(b.booking_date) AS last_booking_date
            FROM customers c
            LEFT JOIN bookings b ON b.customer_id = c.id
            WHERE c.tenant_id = $1
              AND ($2::text IS NULL OR LOWER(c.name) LIKE $2 OR c.email LIKE $2)
            GROUP BY c.id
            ORDER BY c.name ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_id)
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(customers)
    }
}
