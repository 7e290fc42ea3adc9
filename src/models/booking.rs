use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::time_utils::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// PENDING -> CONFIRMED | CANCELLED, CONFIRMED -> COMPLETED | CANCELLED
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses that hold a slot in the calendar
    pub fn occupies_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("Unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub booking_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: String, // see BookingStatus
    pub price_cents: i64,
    pub deposit_cents: i64,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn status(&self) -> Result<BookingStatus, String> {
        self.status.parse()
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time.clone(), self.end_time.clone())
    }
}

/// Whether a booking held by `booked_employee` takes time away from `requested`.
///
/// A booking without an employee blocks the whole tenant calendar, and a
/// request without an employee is blocked by every booking.
pub fn blocks_calendar(booked_employee: Option<Uuid>, requested: Option<Uuid>) -> bool {
    match (booked_employee, requested) {
        (None, _) | (_, None) => true,
        (Some(booked), Some(requested)) => booked == requested,
    }
}

/// Booking joined with the names the dashboard shows
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookingDetails {
    pub id: Uuid,
    pub booking_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub price_cents: i64,
    pub deposit_cents: i64,
    pub notes: Option<String>,
    pub service_id: Uuid,
    pub service_name: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub employee_id: Option<Uuid>,
    pub employee_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBookingData {
    pub tenant_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub booking_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: BookingStatus,
    pub price_cents: i64,
    pub deposit_cents: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
    pub employee_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

impl Booking {
    pub async fn create<'e, E>(executor: E, data: CreateBookingData) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let confirmed_at = (data.status == BookingStatus::Confirmed).then(Utc::now);

        let booking = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO bookings (
                tenant_id, service_id, customer_id, employee_id, booking_date,
                start_time, end_time, status, price_cents, deposit_cents, notes, confirmed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(data.tenant_id)
        .bind(data.service_id)
        .bind(data.customer_id)
        .bind(data.employee_id)
        .bind(data.booking_date)
        .bind(&data.start_time)
        .bind(&data.end_time)
        .bind(data.status.as_str())
        .bind(data.price_cents)
        .bind(data.deposit_cents)
        .bind(&data.notes)
        .bind(confirmed_at)
        .fetch_one(executor)
        .await?;

        Ok(booking)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let booking = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bookings WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(booking)
    }

    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let booking = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM bookings WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        Ok(booking)
    }

    /// Time ranges already taken on a date, filtered by [`blocks_calendar`]
    pub async fn busy_ranges<'e, E>(
        executor: E,
        tenant_id: Uuid,
        date: NaiveDate,
        employee_id: Option<Uuid>,
    ) -> Result<Vec<TimeRange>, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows: Vec<(String, String, Option<Uuid>)> = sqlx::query_as(
            r#"
            SELECT start_time, end_time, employee_id FROM bookings
            WHERE tenant_id = $1
              AND booking_date = $2
              AND status IN ('PENDING', 'CONFIRMED')
            ORDER BY start_time ASC
            "#,
        )
        .bind(tenant_id)
        .bind(date)
        .fetch_all(executor)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, _, booked)| blocks_calendar(*booked, employee_id))
            .map(|(start, end, _)| TimeRange::new(start, end))
            .collect())
    }

    pub async fn list_details(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &BookingFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BookingDetails>, sqlx::Error> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                b.id, b.booking_date, b.start_time, b.end_time, b.status,
                b.price_cents, b.deposit_cents, b.notes,
                s.id AS service_id, s.name AS service_name,
                c.id AS customer_id, c.name AS customer_name,
                c.email AS customer_email, c.phone AS customer_phone,
                e.id AS employee_id, e.name AS employee_name,
                b.created_at
            FROM bookings b
            JOIN services s ON s.id = b.service_id
            JOIN customers c ON c.id = b.customer_id
            LEFT JOIN employees e ON e.id = b.employee_id
            WHERE b.tenant_id = "#,
        );
        query.push_bind(tenant_id);

        if let Some(from) = filter.from {
            query.push(" AND b.booking_date >= ");
            query.push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND b.booking_date <= ");
            query.push_bind(to);
        }
        if let Some(status) = filter.status {
            query.push(" AND b.status = ");
            query.push_bind(status.as_str());
        }
        if let Some(employee_id) = filter.employee_id {
            query.push(" AND b.employee_id = ");
            query.push_bind(employee_id);
        }
        if let Some(customer_id) = filter.customer_id {
            query.push(" AND b.customer_id = ");
            query.push_bind(customer_id);
        }

        query.push(" ORDER BY b.booking_date ASC, b.start_time ASC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let bookings = query
            .build_query_as::<BookingDetails>()
            .fetch_all(pool)
            .await?;

        Ok(bookings)
    }

    /// Moves a booking from `from` to `to`.
    ///
    /// Returns `None` when the booking is no longer in `from` (lost a race).
    pub async fn transition(
        pool: &PgPool,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        reason: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let booking = sqlx::query_as::<_, Self>(
            r#"
            UPDATE bookings
            SET
                status = $3,
                cancellation_reason = CASE WHEN $3 = 'CANCELLED' THEN $4 ELSE cancellation_reason END,
                confirmed_at = CASE WHEN $3 = 'CONFIRMED' THEN NOW() ELSE confirmed_at END,
                cancelled_at = CASE WHEN $3 = 'CANCELLED' THEN NOW() ELSE cancelled_at END,
                completed_at = CASE WHEN $3 = 'COMPLETED' THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(reason)
        .fetch_optional(pool)
        .await?;

        Ok(booking)
    }

    /// Cancels PENDING bookings created before `cutoff` that have no approved payment
    pub async fn cancel_stale_pending(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE bookings b
            SET
                status = 'CANCELLED',
                cancellation_reason = 'Deposit not paid in time',
                cancelled_at = NOW(),
                updated_at = NOW()
            WHERE b.status = 'PENDING'
              AND b.created_at < $1
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.booking_id = b.id AND p.status = 'approved'
              )
            RETURNING b.id
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use BookingStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Pending));
        for next in [Pending, Confirmed, Completed, Cancelled] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_tenant_wide_bookings_block_every_employee() {
        let ana = Uuid::new_v4();
        let bruno = Uuid::new_v4();

        assert!(blocks_calendar(None, Some(ana)));
        assert!(blocks_calendar(None, None));
        assert!(blocks_calendar(Some(ana), None));
        assert!(blocks_calendar(Some(ana), Some(ana)));
        assert!(!blocks_calendar(Some(bruno), Some(ana)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("confirmed".parse::<BookingStatus>(), Ok(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::Cancelled.to_string(), "CANCELLED");
        assert!("NO_SHOW".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_status_serde_uses_uppercase() {
        let json = serde_json::to_string(&BookingStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        let parsed: BookingStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(parsed, BookingStatus::Completed);
    }

    #[test]
    fn test_slot_holding_statuses() {
        assert!(BookingStatus::Pending.occupies_slot());
        assert!(BookingStatus::Confirmed.occupies_slot());
        assert!(!BookingStatus::Cancelled.occupies_slot());
        assert!(BookingStatus::Completed.is_terminal());
    }
}
