use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::api::pagination::Pagination;
use crate::api::reviews::{listing, ReviewListing};
use crate::error::AppError;
use crate::models::{
    booking::{Booking, BookingStatus},
    customer::Customer,
    employee::Employee,
    review::Review,
    service::Service,
    tenant::{Tenant, TenantProfile},
};
use crate::services::{
    availability,
    bookings::{self, BookingRequest},
    payments::CheckoutSession,
    reviews::{self, SubmitReviewRequest},
};

async fn find_tenant(state: &AppState, slug: &str) -> Result<Tenant, AppError> {
    Tenant::find_active_by_slug(&state.pool, slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Business '{}' not found", slug)))
}

#[derive(Debug, Serialize)]
struct PublicEmployee {
    id: Uuid,
    name: String,
    service_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct BookingPage {
    tenant: TenantProfile,
    services: Vec<Service>,
    employees: Vec<PublicEmployee>,
    accepts_deposits: bool,
}

/// Everything a booking page needs to render
async fn booking_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BookingPage>, AppError> {
    let tenant = find_tenant(&state, &slug).await?;

    let services = Service::list_by_tenant(&state.pool, tenant.id, true).await?;

    let mut employees = Vec::new();
    for employee in Employee::list_by_tenant(&state.pool, tenant.id).await? {
        if !employee.is_active {
            continue;
        }
        let service_ids = Employee::service_ids(&state.pool, employee.id).await?;
        employees.push(PublicEmployee {
            id: employee.id,
            name: employee.name,
            service_ids,
        });
    }

    Ok(Json(BookingPage {
        accepts_deposits: state.payments.can_charge(&tenant),
        tenant: TenantProfile::from(&tenant),
        services,
        employees,
    }))
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    service_id: Uuid,
    date: NaiveDate,
    employee_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct AvailabilityResponse {
    date: NaiveDate,
    service_id: Uuid,
    employee_id: Option<Uuid>,
    duration_minutes: i32,
    slots: Vec<String>,
}

async fn get_availability(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let tenant = find_tenant(&state, &slug).await?;

    let service = Service::find_for_tenant(&state.pool, tenant.id, query.service_id)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    let slots = availability::available_slots(
        &state.pool,
        &tenant,
        &service,
        query.date,
        query.employee_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(AvailabilityResponse {
        date: query.date,
        service_id: service.id,
        employee_id: query.employee_id,
        duration_minutes: service.duration_minutes,
        slots,
    }))
}

#[derive(Debug, Serialize)]
struct CreatedBooking {
    booking: Booking,
    /// Present when a deposit must be paid to confirm the booking
    checkout: Option<CheckoutSession>,
}

/// Books a slot; deposit-backed services also get a checkout link
async fn create_booking(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let tenant = find_tenant(&state, &slug).await?;

    let (booking, service) = bookings::create_booking(&state.pool, &tenant, req, Utc::now()).await?;

    if booking.status() != Ok(BookingStatus::Pending) {
        return Ok((
            StatusCode::CREATED,
            Json(CreatedBooking {
                booking,
                checkout: None,
            }),
        ));
    }

    let customer = Customer::find_by_id(&state.pool, booking.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer not found".to_string()))?;

    match state
        .payments
        .start_deposit_checkout(&state.pool, &tenant, &booking, &service, &customer)
        .await
    {
        Ok(checkout) => Ok((
            StatusCode::CREATED,
            Json(CreatedBooking {
                booking,
                checkout: Some(checkout),
            }),
        )),
        Err(e) => {
            // Without a checkout the slot would stay held until it expires
            tracing::error!(booking_id = %booking.id, error = %e, "Deposit checkout failed, releasing slot");
            bookings::change_status(
                &state.pool,
                tenant.id,
                booking.id,
                BookingStatus::Cancelled,
                Some("Deposit checkout could not be created".to_string()),
            )
            .await?;
            Err(e.into())
        }
    }
}

async fn public_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<ReviewListing>, AppError> {
    let tenant = find_tenant(&state, &slug).await?;
    Ok(Json(listing(&state, tenant.id, true, &page).await?))
}

async fn submit_review(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = reviews::submit_review(&state.pool, booking_id, req).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/public/:slug", get(booking_page))
        .route("/api/public/:slug/availability", get(get_availability))
        .route("/api/public/:slug/bookings", post(create_booking))
        .route("/api/public/:slug/reviews", get(public_reviews))
        .route("/api/public/bookings/:id/review", post(submit_review))
}
