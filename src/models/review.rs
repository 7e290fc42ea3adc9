use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

/// Review with the reviewer's display name and the reviewed service
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewWithAuthor {
    pub id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub is_visible: bool,
    pub customer_name: String,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateReviewData {
    pub tenant_id: Uuid,
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

impl Review {
    /// Inserts a review; `None` if the booking already has one
    pub async fn create(pool: &PgPool, data: CreateReviewData) -> Result<Option<Self>, sqlx::Error> {
        let review = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO reviews (tenant_id, booking_id, customer_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (booking_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(data.booking_id)
        .bind(data.customer_id)
        .bind(data.rating)
        .bind(&data.comment)
        .fetch_optional(pool)
        .await?;

        Ok(review)
    }

    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        visible_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewWithAuthor>, sqlx::Error> {
        let reviews = sqlx::query_as::<_, ReviewWithAuthor>(
            r#"
            SELECT
                r.id, r.rating, r.comment, r.is_visible,
                c.name AS customer_name, s.name AS service_name,
                r.created_at
            FROM reviews r
            JOIN customers c ON c.id = r.customer_id
            JOIN bookings b ON b.id = r.booking_id
            JOIN services s ON s.id = b.service_id
            WHERE r.tenant_id = $1 AND (r.is_visible = TRUE OR NOT $2)
            ORDER BY r.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_id)
        .bind(visible_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(reviews)
    }

    /// `(rating, count)` pairs for a tenant's reviews
    pub async fn rating_counts(
        pool: &PgPool,
        tenant_id: Uuid,
        visible_only: bool,
    ) -> Result<Vec<(i16, i64)>, sqlx::Error> {
        let counts: Vec<(i16, i64)> = sqlx::query_as(
            r#"
            SELECT rating, COUNT(*) FROM reviews
            WHERE tenant_id = $1 AND (is_visible = TRUE OR NOT $2)
            GROUP BY rating
            "#,
        )
        .bind(tenant_id)
        .bind(visible_only)
        .fetch_all(pool)
        .await?;

        Ok(counts)
    }

    pub async fn set_visibility(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        is_visible: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let review = sqlx::query_as::<_, Self>(
            r#"
            UPDATE reviews SET is_visible = $3
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(is_visible)
        .fetch_optional(pool)
        .await?;

        Ok(review)
    }
}
