use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::time_utils::{self, TimeError, TimeRange};

/// A block of working hours on one weekday (0 = Sunday)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub employee_id: Option<Uuid>, // None = tenant-wide hours
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time.clone(), self.end_time.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ScheduleError {
    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("day_of_week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDay(i16),

    #[error("Schedule on day {day} ends ({end}) before it starts ({start})")]
    EmptyRange { day: i16, start: String, end: String },

    #[error("Schedule blocks overlap on day {0}")]
    Overlap(i16),
}

/// Canonicalizes times and rejects invalid or overlapping blocks.
///
/// The result is sorted by day, then start time.
pub fn normalize_entries(entries: Vec<ScheduleEntry>) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let mut normalized = Vec::with_capacity(entries.len());

    for entry in entries {
        if !(0..=6).contains(&entry.day_of_week) {
            return Err(ScheduleError::InvalidDay(entry.day_of_week));
        }

        let start_time = time_utils::format(&entry.start_time)?;
        let end_time = time_utils::format(&entry.end_time)?;

        if !time_utils::is_before(&start_time, &end_time)? {
            return Err(ScheduleError::EmptyRange {
                day: entry.day_of_week,
                start: start_time,
                end: end_time,
            });
        }

        normalized.push(ScheduleEntry {
            day_of_week: entry.day_of_week,
            start_time,
            end_time,
        });
    }

    // Canonical "HH:MM" strings sort chronologically
    normalized.sort_by(|a, b| {
        a.day_of_week
            .cmp(&b.day_of_week)
            .then_with(|| a.start_time.cmp(&b.start_time))
    });

    for pair in normalized.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.day_of_week == b.day_of_week
            && time_utils::do_ranges_overlap(
                &TimeRange::new(a.start_time.as_str(), a.end_time.as_str()),
                &TimeRange::new(b.start_time.as_str(), b.end_time.as_str()),
            )?
        {
            return Err(ScheduleError::Overlap(a.day_of_week));
        }
    }

    Ok(normalized)
}

impl Schedule {
    /// Lists the weekly schedule of a tenant (`employee_id = None`) or of one employee
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        employee_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let schedules = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM schedules
            WHERE tenant_id = $1 AND employee_id IS NOT DISTINCT FROM $2
            ORDER BY day_of_week ASC, start_time ASC
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_all(pool)
        .await?;

        Ok(schedules)
    }

    pub async fn list_for_day(
        pool: &PgPool,
        tenant_id: Uuid,
        employee_id: Option<Uuid>,
        day_of_week: i16,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let schedules = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM schedules
            WHERE tenant_id = $1
              AND employee_id IS NOT DISTINCT FROM $2
              AND day_of_week = $3
            ORDER BY start_time ASC
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .bind(day_of_week)
        .fetch_all(pool)
        .await?;

        Ok(schedules)
    }

    pub async fn has_any(
        pool: &PgPool,
        tenant_id: Uuid,
        employee_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM schedules WHERE tenant_id = $1 AND employee_id = $2)
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// Replaces the whole weekly schedule in one transaction.
    ///
    /// Entries must already be normalized with [`normalize_entries`].
    pub async fn replace_weekly(
        pool: &PgPool,
        tenant_id: Uuid,
        employee_id: Option<Uuid>,
        entries: &[ScheduleEntry],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM schedules
            WHERE tenant_id = $1 AND employee_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;

        let mut created = Vec::with_capacity(entries.len());
        for entry in entries {
            let schedule = sqlx::query_as::<_, Self>(
                r#"
                INSERT INTO schedules (tenant_id, employee_id, day_of_week, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(tenant_id)
            .bind(employee_id)
            .bind(entry.day_of_week)
            .bind(&entry.start_time)
            .bind(&entry.end_time)
            .fetch_one(&mut *tx)
            .await?;

            created.push(schedule);
        }

        tx.commit().await?;

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(day: i16, start: &str, end: &str) -> ScheduleEntry {
        ScheduleEntry {
            day_of_week: day,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn test_normalize_sorts_and_pads() {
        let result = normalize_entries(vec![
            entry(2, "14:00", "18:00"),
            entry(1, "9:00", "13:00"),
            entry(2, "9:00", "13:00"),
        ])
        .unwrap();

        assert_eq!(
            result,
            vec![
                entry(1, "09:00", "13:00"),
                entry(2, "09:00", "13:00"),
                entry(2, "14:00", "18:00"),
            ]
        );
    }

    #[test]
    fn test_split_shift_touching_is_allowed() {
        let result = normalize_entries(vec![entry(3, "09:00", "12:00"), entry(3, "12:00", "15:00")]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_overlapping_blocks_rejected() {
        let result = normalize_entries(vec![entry(3, "09:00", "12:00"), entry(3, "11:00", "15:00")]);
        assert_eq!(result, Err(ScheduleError::Overlap(3)));
    }

    #[test]
    fn test_invalid_day_and_range() {
        assert_eq!(
            normalize_entries(vec![entry(7, "09:00", "10:00")]),
            Err(ScheduleError::InvalidDay(7))
        );
        assert!(matches!(
            normalize_entries(vec![entry(1, "10:00", "10:00")]),
            Err(ScheduleError::EmptyRange { day: 1, .. })
        ));
        assert!(matches!(
            normalize_entries(vec![entry(1, "10:00", "24:00")]),
            Err(ScheduleError::Time(TimeError::InvalidFormat(_)))
        ));
    }
}
