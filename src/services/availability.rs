use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    booking::Booking, employee::Employee, schedule::Schedule, service::Service, tenant::Tenant,
};
use crate::time_utils::{self, TimeError, TimeRange};

#[derive(thiserror::Error, Debug)]
pub enum AvailabilityError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("Cannot book a date in the past ({0})")]
    DateInPast(NaiveDate),

    #[error("Bookings are only accepted up to {0} days ahead")]
    BeyondBookingWindow(i32),

    #[error("Employee not found")]
    EmployeeNotFound,

    #[error("Employee does not perform this service")]
    EmployeeDoesNotPerformService,
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::DatabaseError(e) => AppError::Database(e),
            AvailabilityError::Time(e) => AppError::Time(e),
            AvailabilityError::EmployeeNotFound => AppError::NotFound(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Day of week as stored in schedules (0 = Sunday)
pub fn day_of_week(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// Rejects dates before `today` or more than `window_days` after it
pub fn check_booking_window(
    date: NaiveDate,
    today: NaiveDate,
    window_days: i32,
) -> Result<(), AvailabilityError> {
    if date < today {
        return Err(AvailabilityError::DateInPast(date));
    }
    if date > today + Duration::days(i64::from(window_days)) {
        return Err(AvailabilityError::BeyondBookingWindow(window_days));
    }
    Ok(())
}

/// Start times at which a service of `duration_minutes` fits.
///
/// Candidates are generated every `interval_minutes` inside each working
/// window. A candidate survives if the whole appointment ends by the
/// window's end, does not overlap any busy range and does not start before
/// `not_before`. The result is sorted and free of duplicates.
pub fn compute_available_slots(
    windows: &[TimeRange],
    busy: &[TimeRange],
    duration_minutes: i64,
    interval_minutes: i64,
    not_before: Option<&str>,
) -> Result<Vec<String>, TimeError> {
    if duration_minutes <= 0 {
        return Err(TimeError::InvalidInterval(duration_minutes));
    }

    let not_before = not_before.map(time_utils::to_minutes).transpose()?;
    let busy = busy
        .iter()
        .map(|r| Ok((time_utils::to_minutes(&r.start)?, time_utils::to_minutes(&r.end)?)))
        .collect::<Result<Vec<(i64, i64)>, TimeError>>()?;

    let mut available = BTreeSet::new();

    for window in windows {
        let window_end = time_utils::to_minutes(&window.end)?;
        let slots = time_utils::generate_time_slots(&window.start, &window.end, interval_minutes)?;

        for start in slots.minutes() {
            let end = start.saturating_add(duration_minutes);
            if end > window_end {
                break;
            }
            if not_before.is_some_and(|limit| start < limit) {
                continue;
            }
            if busy.iter().any(|&(busy_start, busy_end)| start < busy_end && busy_start < end) {
                continue;
            }
            available.insert(start);
        }
    }

    available.into_iter().map(time_utils::from_minutes).collect()
}

/// An employee can be booked only while active and assigned to the service.
/// `employee` is the lookup scoped to the tenant, so foreign ids arrive as `None`.
pub fn check_employee(
    employee: Option<&Employee>,
    performs_service: bool,
) -> Result<(), AvailabilityError> {
    match employee {
        Some(employee) if employee.is_active => {
            if performs_service {
                Ok(())
            } else {
                Err(AvailabilityError::EmployeeDoesNotPerformService)
            }
        }
        _ => Err(AvailabilityError::EmployeeNotFound),
    }
}

pub async fn ensure_employee_serves(
    pool: &PgPool,
    tenant_id: Uuid,
    employee_id: Uuid,
    service_id: Uuid,
) -> Result<(), AvailabilityError> {
    let employee = Employee::find_for_tenant(pool, tenant_id, employee_id).await?;
    let performs = match &employee {
        Some(_) => Employee::performs_service(pool, employee_id, service_id).await?,
        None => false,
    };
    check_employee(employee.as_ref(), performs)
}

/// Working windows for a day: the employee's own schedule when it has one,
/// otherwise the tenant-wide hours.
pub async fn working_windows(
    pool: &PgPool,
    tenant_id: Uuid,
    employee_id: Option<Uuid>,
    date: NaiveDate,
) -> Result<Vec<TimeRange>, sqlx::Error> {
    let day = day_of_week(date);

    let schedules = match employee_id {
        Some(employee_id) if Schedule::has_any(pool, tenant_id, employee_id).await? => {
            Schedule::list_for_day(pool, tenant_id, Some(employee_id), day).await?
        }
        _ => Schedule::list_for_day(pool, tenant_id, None, day).await?,
    };

    Ok(schedules.iter().map(Schedule::range).collect())
}

/// Bookable start times for `service` on `date`
#[tracing::instrument(skip(pool, tenant, service), fields(tenant_id = %tenant.id, service_id = %service.id))]
pub async fn available_slots(
    pool: &PgPool,
    tenant: &Tenant,
    service: &Service,
    date: NaiveDate,
    employee_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AvailabilityError> {
    let local_now = tenant.local_now(now);
    check_booking_window(date, local_now.date(), tenant.booking_window_days)?;

    if let Some(employee_id) = employee_id {
        ensure_employee_serves(pool, tenant.id, employee_id, service.id).await?;
    }

    let windows = working_windows(pool, tenant.id, employee_id, date).await?;
    if windows.is_empty() {
        return Ok(Vec::new());
    }

    let busy = Booking::busy_ranges(pool, tenant.id, date, employee_id).await?;

    let not_before = (date == local_now.date()).then(|| local_now.format("%H:%M").to_string());

    let slots = compute_available_slots(
        &windows,
        &busy,
        i64::from(service.duration_minutes),
        i64::from(tenant.slot_interval_minutes),
        not_before.as_deref(),
    )?;

    tracing::debug!(slots = slots.len(), %date, "Computed availability");

    Ok(slots)
}
