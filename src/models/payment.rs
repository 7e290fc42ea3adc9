use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A Mercado Pago deposit attempt for a booking
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub booking_id: Uuid,
    pub mp_payment_id: Option<String>,
    pub mp_preference_id: Option<String>,
    pub status: String, // Mercado Pago status: 'pending', 'approved', 'rejected', ...
    pub status_detail: Option<String>,
    pub amount_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordPaymentData {
    pub tenant_id: Uuid,
    pub booking_id: Uuid,
    pub mp_payment_id: String,
    pub status: String,
    pub status_detail: Option<String>,
    pub amount_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Records the checkout preference created for a booking deposit
    pub async fn create_pending(
        pool: &PgPool,
        tenant_id: Uuid,
        booking_id: Uuid,
        preference_id: &str,
        amount_cents: i64,
    ) -> Result<Self, sqlx::Error> {
        let payment = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO payments (tenant_id, booking_id, mp_preference_id, status, amount_cents)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(booking_id)
        .bind(preference_id)
        .bind(amount_cents)
        .fetch_one(pool)
        .await?;

        Ok(payment)
    }

    /// Inserts or updates the row for a Mercado Pago payment id.
    ///
    /// A preference row of the same booking that has no payment id yet is
    /// claimed instead of inserting a duplicate.
    pub async fn record(pool: &PgPool, data: RecordPaymentData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM payments
            WHERE mp_payment_id = $1
               OR (booking_id = $2 AND mp_payment_id IS NULL)
            ORDER BY (mp_payment_id IS NULL) ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&data.mp_payment_id)
        .bind(data.booking_id)
        .fetch_optional(&mut *tx)
        .await?;

        let payment = match existing {
            Some(id) => {
                sqlx::query_as::<_, Self>(
                    r#"
                    UPDATE payments
                    SET
                        mp_payment_id = $2,
                        status = $3,
                        status_detail = $4,
                        amount_cents = $5,
                        paid_at = COALESCE($6, paid_at),
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(&data.mp_payment_id)
                .bind(&data.status)
                .bind(&data.status_detail)
                .bind(data.amount_cents)
                .bind(data.paid_at)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, Self>(
                    r#"
                    INSERT INTO payments (
                        tenant_id, booking_id, mp_payment_id, status, status_detail,
                        amount_cents, paid_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING *
                    "#,
                )
                .bind(data.tenant_id)
                .bind(data.booking_id)
                .bind(&data.mp_payment_id)
                .bind(&data.status)
                .bind(&data.status_detail)
                .bind(data.amount_cents)
                .bind(data.paid_at)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;

        Ok(payment)
    }

    pub async fn list_by_booking(pool: &PgPool, booking_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let payments = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at DESC
            "#,
        )
        .bind(booking_id)
        .fetch_all(pool)
        .await?;

        Ok(payments)
    }
}
