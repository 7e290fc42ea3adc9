use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::auth::{client_ip, current_tenant};
use crate::api::middleware::session::AppState;
use crate::api::pagination::Pagination;
use crate::error::AppError;
use crate::models::{
    audit_log::{self, AuditLog, NewAuditLog},
    booking::{Booking, BookingDetails, BookingFilter, BookingStatus},
    payment::Payment,
};
use crate::services::bookings;

#[derive(Debug, Serialize)]
struct BookingWithPayments {
    #[serde(flatten)]
    booking: Booking,
    payments: Vec<Payment>,
}

async fn list_bookings(
    State(state): State<AppState>,
    session: Session,
    Query(filter): Query<BookingFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<BookingDetails>>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(AppError::Validation("from must not be after to".to_string()));
        }
    }

    let bookings =
        Booking::list_details(&state.pool, tenant_id, &filter, page.limit(), page.offset()).await?;

    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingWithPayments>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    let booking = Booking::find_for_tenant(&state.pool, tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
    let payments = Payment::list_by_booking(&state.pool, booking.id).await?;

    Ok(Json(BookingWithPayments { booking, payments }))
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    reason: Option<String>,
}

async fn transition(
    state: &AppState,
    session: &Session,
    ip_address: Option<String>,
    id: Uuid,
    next: BookingStatus,
    reason: Option<String>,
) -> Result<Json<Booking>, AppError> {
    let tenant_id = current_tenant(session).await?;

    let booking = bookings::change_status(&state.pool, tenant_id, id, next, reason).await?;

    AuditLog::record_quietly(
        &state.pool,
        NewAuditLog {
            tenant_id: Some(tenant_id),
            actor: format!("tenant:{}", tenant_id),
            action: audit_log::ACTION_BOOKING_STATUS_CHANGED,
            entity_type: Some("booking"),
            entity_id: Some(id.to_string()),
            ip_address,
            metadata: Some(json!({ "to": next })),
        },
    )
    .await;

    Ok(Json(booking))
}

async fn confirm_booking(
    State(state): State<AppState>,
    session: Session,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    transition(&state, &session, client_ip(&headers), id, BookingStatus::Confirmed, None).await
}

async fn cancel_booking(
    State(state): State<AppState>,
    session: Session,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Booking>, AppError> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    transition(&state, &session, client_ip(&headers), id, BookingStatus::Cancelled, reason).await
}

async fn complete_booking(
    State(state): State<AppState>,
    session: Session,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    transition(&state, &session, client_ip(&headers), id, BookingStatus::Completed, None).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", get(list_bookings))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/confirm", post(confirm_booking))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
        .route("/api/bookings/:id/complete", post(complete_booking))
}
