use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    booking::{Booking, BookingStatus, CreateBookingData},
    customer::{Customer, CustomerData},
    service::Service,
    tenant::Tenant,
};
use crate::services::availability::{self, AvailabilityError};
use crate::time_utils::{self, TimeError, TimeRange};

#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("The requested time {0} is not available")]
    SlotUnavailable(String),

    #[error("Cannot change booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Booking was modified concurrently, please retry")]
    ConcurrentUpdate,

    #[error("Invalid customer data: {0}")]
    InvalidCustomer(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::DatabaseError(e) => AppError::Database(e),
            BookingError::Availability(e) => e.into(),
            BookingError::Time(e) => AppError::Time(e),
            BookingError::ServiceNotFound | BookingError::BookingNotFound => {
                AppError::NotFound(err.to_string())
            }
            BookingError::InvalidCustomer(_) => AppError::Validation(err.to_string()),
            BookingError::SlotUnavailable(_)
            | BookingError::InvalidTransition { .. }
            | BookingError::ConcurrentUpdate => AppError::Conflict(err.to_string()),
        }
    }
}

/// Booking request coming from a public booking page or the dashboard
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub service_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: String,
    pub customer: CustomerData,
    pub notes: Option<String>,
}

pub fn validate_customer(customer: &CustomerData) -> Result<(), BookingError> {
    if customer.name.trim().is_empty() {
        return Err(BookingError::InvalidCustomer("name is required".to_string()));
    }

    let email = customer.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(BookingError::InvalidCustomer(format!(
            "invalid email address: {}",
            email
        )));
    }

    Ok(())
}

/// True if `candidate` overlaps any of `taken`
pub fn conflicts_with(candidate: &TimeRange, taken: &[TimeRange]) -> Result<bool, TimeError> {
    for range in taken {
        if time_utils::do_ranges_overlap(candidate, range)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Initial status of a new booking: deposits must be paid before it is confirmed
pub fn initial_status(service: &Service) -> BookingStatus {
    if service.requires_deposit() {
        BookingStatus::Pending
    } else {
        BookingStatus::Confirmed
    }
}

/// Creates a booking after checking the slot is still free.
///
/// The final overlap check and the insert run in one transaction holding a
/// per-(tenant, date) advisory lock, so two concurrent requests for the
/// same time cannot both succeed.
#[tracing::instrument(skip(pool, tenant, request), fields(tenant_id = %tenant.id, service_id = %request.service_id, date = %request.date))]
pub async fn create_booking(
    pool: &PgPool,
    tenant: &Tenant,
    request: BookingRequest,
    now: DateTime<Utc>,
) -> Result<(Booking, Service), BookingError> {
    validate_customer(&request.customer)?;

    let service = Service::find_for_tenant(pool, tenant.id, request.service_id)
        .await?
        .filter(|s| s.is_active)
        .ok_or(BookingError::ServiceNotFound)?;

    let start_time = time_utils::format(&request.start_time)?;
    let end_time =
        time_utils::calculate_end_time(&start_time, i64::from(service.duration_minutes))?;

    // Also rejects unknown, inactive or unassigned employees
    let offered = availability::available_slots(
        pool,
        tenant,
        &service,
        request.date,
        request.employee_id,
        now,
    )
    .await?;
    if !offered.contains(&start_time) {
        return Err(BookingError::SlotUnavailable(start_time));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("booking:{}:{}", tenant.id, request.date))
        .execute(&mut *tx)
        .await?;

    let taken = Booking::busy_ranges(&mut *tx, tenant.id, request.date, request.employee_id).await?;
    let candidate = TimeRange::new(start_time.as_str(), end_time.as_str());
    if conflicts_with(&candidate, &taken)? {
        return Err(BookingError::SlotUnavailable(start_time));
    }

    let customer = Customer::upsert(&mut *tx, tenant.id, &request.customer).await?;

    let booking = Booking::create(
        &mut *tx,
        CreateBookingData {
            tenant_id: tenant.id,
            service_id: service.id,
            customer_id: customer.id,
            employee_id: request.employee_id,
            booking_date: request.date,
            start_time,
            end_time,
            status: initial_status(&service),
            price_cents: service.price_cents,
            deposit_cents: service.deposit_cents,
            notes: request.notes,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        booking_id = %booking.id,
        customer_id = %customer.id,
        start_time = %booking.start_time,
        status = %booking.status,
        "Booking created"
    );

    Ok((booking, service))
}

/// Applies a status change, enforcing the booking lifecycle
#[tracing::instrument(skip(pool, reason))]
pub async fn change_status(
    pool: &PgPool,
    tenant_id: Uuid,
    booking_id: Uuid,
    next: BookingStatus,
    reason: Option<String>,
) -> Result<Booking, BookingError> {
    let booking = Booking::find_for_tenant(pool, tenant_id, booking_id)
        .await?
        .ok_or(BookingError::BookingNotFound)?;

    let current = booking
        .status()
        .map_err(|e| BookingError::DatabaseError(sqlx::Error::Decode(e.into())))?;

    if !current.can_transition_to(next) {
        return Err(BookingError::InvalidTransition {
            from: current,
            to: next,
        });
    }

    let updated = Booking::transition(pool, booking_id, current, next, reason)
        .await?
        .ok_or(BookingError::ConcurrentUpdate)?;

    tracing::info!(%booking_id, from = %current, to = %next, "Booking status changed");

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(name: &str, email: &str) -> CustomerData {
        CustomerData {
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
        }
    }

    fn service(deposit_cents: i64) -> Service {
        Service {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Corte".to_string(),
            description: None,
            duration_minutes: 30,
            price_cents: 500_000,
            deposit_cents,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_customer() {
        assert!(validate_customer(&customer("Ana", "ana@example.com")).is_ok());
        assert!(validate_customer(&customer("  ", "ana@example.com")).is_err());
        assert!(validate_customer(&customer("Ana", "ana.example.com")).is_err());
        assert!(validate_customer(&customer("Ana", "@example.com")).is_err());
        assert!(validate_customer(&customer("Ana", "ana@localhost")).is_err());
    }

    #[test]
    fn test_conflicts_with() {
        let taken = vec![TimeRange::new("09:00", "09:30"), TimeRange::new("11:00", "12:00")];
        assert!(conflicts_with(&TimeRange::new("09:15", "09:45"), &taken).unwrap());
        assert!(!conflicts_with(&TimeRange::new("09:30", "10:00"), &taken).unwrap());
        assert!(conflicts_with(&TimeRange::new("10:30", "11:30"), &taken).unwrap());
        assert!(!conflicts_with(&TimeRange::new("12:00", "12:30"), &[]).unwrap());
    }

    #[test]
    fn test_deposit_services_start_pending() {
        assert_eq!(initial_status(&service(100_000)), BookingStatus::Pending);
        assert_eq!(initial_status(&service(0)), BookingStatus::Confirmed);
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = BookingError::SlotUnavailable("09:00".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = BookingError::ServiceNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = BookingError::Availability(AvailabilityError::BeyondBookingWindow(30)).into();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
