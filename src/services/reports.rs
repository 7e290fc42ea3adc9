use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::BookingStatus;

pub const MAX_RANGE_DAYS: i64 = 366;
const TOP_SERVICES: i64 = 5;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReportRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

pub fn validate_range(range: &ReportRange) -> Result<(), AppError> {
    if range.from > range.to {
        return Err(AppError::Validation(format!(
            "from ({}) must not be after to ({})",
            range.from, range.to
        )));
    }
    if (range.to - range.from).num_days() >= MAX_RANGE_DAYS {
        return Err(AppError::Validation(format!(
            "Reports cover at most {} days",
            MAX_RANGE_DAYS
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub total: i64,
}

impl StatusCounts {
    /// Builds counts from `(status, count)` rows; unknown statuses are skipped
    pub fn from_rows(rows: &[(String, i64)]) -> Self {
        let mut counts = Self::default();
        for (status, count) in rows {
            let slot = match status.parse::<BookingStatus>() {
                Ok(BookingStatus::Pending) => &mut counts.pending,
                Ok(BookingStatus::Confirmed) => &mut counts.confirmed,
                Ok(BookingStatus::Completed) => &mut counts.completed,
                Ok(BookingStatus::Cancelled) => &mut counts.cancelled,
                Err(_) => continue,
            };
            *slot += count;
            counts.total += count;
        }
        counts
    }

    /// Share of cancelled bookings, rounded to three decimals
    pub fn cancellation_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.cancelled as f64 / self.total as f64 * 1000.0).round() / 1000.0
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceRanking {
    pub service_id: Uuid,
    pub name: String,
    pub bookings: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub bookings: StatusCounts,
    pub cancellation_rate: f64,
    pub completed_revenue_cents: i64,
    pub deposits_collected_cents: i64,
    pub distinct_customers: i64,
    pub top_services: Vec<ServiceRanking>,
}

#[tracing::instrument(skip(pool))]
pub async fn summary(
    pool: &PgPool,
    tenant_id: Uuid,
    range: ReportRange,
) -> Result<ReportSummary, AppError> {
    validate_range(&range)?;

    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*)
        FROM bookings
        WHERE tenant_id = $1 AND booking_date BETWEEN $2 AND $3
        GROUP BY status
        "#,
    )
    .bind(tenant_id)
    .bind(range.from)
    .bind(range.to)
    .fetch_all(pool)
    .await?;
    let bookings = StatusCounts::from_rows(&rows);

    let (completed_revenue_cents, distinct_customers): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(price_cents) FILTER (WHERE status = 'COMPLETED'), 0)::BIGINT,
            COUNT(DISTINCT customer_id)
        FROM bookings
        WHERE tenant_id = $1 AND booking_date BETWEEN $2 AND $3
        "#,
    )
    .bind(tenant_id)
    .bind(range.from)
    .bind(range.to)
    .fetch_one(pool)
    .await?;

    let deposits_collected_cents: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(p.amount_cents), 0)::BIGINT
        FROM payments p
        JOIN bookings b ON b.id = p.booking_id
        WHERE p.tenant_id = $1
          AND p.status = 'approved'
          AND b.booking_date BETWEEN $2 AND $3
        "#,
    )
    .bind(tenant_id)
    .bind(range.from)
    .bind(range.to)
    .fetch_one(pool)
    .await?;

    let top_services = sqlx::query_as::<_, ServiceRanking>(
        r#"
        SELECT
            s.id AS service_id,
            s.name,
            COUNT(b.id) AS bookings,
            COALESCE(SUM(b.price_cents) FILTER (WHERE b.status = 'COMPLETED'), 0)::BIGINT AS revenue_cents
        FROM bookings b
        JOIN services s ON s.id = b.service_id
        WHERE b.tenant_id = $1
          AND b.booking_date BETWEEN $2 AND $3
          AND b.status <> 'CANCELLED'
        GROUP BY s.id, s.name
        ORDER BY bookings DESC, s.name ASC
        LIMIT $4
        "#,
    )
    .bind(tenant_id)
    .bind(range.from)
    .bind(range.to)
    .bind(TOP_SERVICES)
    .fetch_all(pool)
    .await?;

    Ok(ReportSummary {
        from: range.from,
        to: range.to,
        cancellation_rate: bookings.cancellation_rate(),
        bookings,
        completed_revenue_cents,
        deposits_collected_cents,
        distinct_customers,
        top_services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_range() {
        let ok = ReportRange {
            from: date(2024, 1, 1),
            to: date(2024, 1, 31),
        };
        assert!(validate_range(&ok).is_ok());

        let same_day = ReportRange {
            from: date(2024, 1, 1),
            to: date(2024, 1, 1),
        };
        assert!(validate_range(&same_day).is_ok());

        let inverted = ReportRange {
            from: date(2024, 2, 1),
            to: date(2024, 1, 1),
        };
        assert!(matches!(validate_range(&inverted), Err(AppError::Validation(_))));

        let too_long = ReportRange {
            from: date(2023, 1, 1),
            to: date(2024, 1, 2),
        };
        assert!(matches!(validate_range(&too_long), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_status_counts() {
        let rows = vec![
            ("PENDING".to_string(), 2),
            ("CONFIRMED".to_string(), 3),
            ("COMPLETED".to_string(), 4),
            ("CANCELLED".to_string(), 1),
            ("ARCHIVED".to_string(), 9),
        ];
        let counts = StatusCounts::from_rows(&rows);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.completed, 4);
        assert_eq!(counts.total, 10);
        assert_eq!(counts.cancellation_rate(), 0.1);
    }

    #[test]
    fn test_cancellation_rate_without_bookings() {
        assert_eq!(StatusCounts::default().cancellation_rate(), 0.0);

        let counts = StatusCounts::from_rows(&[("CANCELLED".to_string(), 1), ("COMPLETED".to_string(), 2)]);
        assert_eq!(counts.cancellation_rate(), 0.333);
    }
}
