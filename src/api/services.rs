use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::models::service::{CreateServiceData, Service, UpdateServiceData};
use crate::services::subscriptions;

const MAX_DURATION_MINUTES: i32 = 24 * 60;

fn validate_pricing(
    duration_minutes: Option<i32>,
    price_cents: Option<i64>,
    deposit_cents: Option<i64>,
) -> Result<(), AppError> {
    if duration_minutes.is_some_and(|d| d <= 0 || d > MAX_DURATION_MINUTES) {
        return Err(AppError::Validation(format!(
            "duration_minutes must be between 1 and {}",
            MAX_DURATION_MINUTES
        )));
    }
    if price_cents.is_some_and(|p| p < 0) || deposit_cents.is_some_and(|d| d < 0) {
        return Err(AppError::Validation(
            "prices cannot be negative".to_string(),
        ));
    }
    if let (Some(price), Some(deposit)) = (price_cents, deposit_cents) {
        if deposit > price {
            return Err(AppError::Validation(
                "deposit cannot exceed the price".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn validate_new_service(data: &CreateServiceData) -> Result<(), AppError> {
    if data.name.trim().is_empty() {
        return Err(AppError::Validation("Service name is required".to_string()));
    }
    validate_pricing(
        Some(data.duration_minutes),
        Some(data.price_cents),
        Some(data.deposit_cents),
    )
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_services(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Service>>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    let services = Service::list_by_tenant(&state.pool, tenant_id, !query.include_inactive).await?;
    Ok(Json(services))
}

async fn create_service(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateServiceData>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    let tenant_id = current_tenant(&session).await?;
    validate_new_service(&req)?;
    subscriptions::ensure_can_add_service(&state.pool, tenant_id).await?;

    let service = Service::create(&state.pool, tenant_id, req).await?;

    tracing::info!(service_id = %service.id, %tenant_id, "Service created");

    Ok((StatusCode::CREATED, Json(service)))
}

async fn get_service(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Service>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    let service = Service::find_for_tenant(&state.pool, tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
    Ok(Json(service))
}

async fn update_service(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateServiceData>,
) -> Result<Json<Service>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    let current = Service::find_for_tenant(&state.pool, tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Service name is required".to_string()));
    }
    // Check the resulting pair, not just the fields being changed
    validate_pricing(
        req.duration_minutes,
        Some(req.price_cents.unwrap_or(current.price_cents)),
        Some(req.deposit_cents.unwrap_or(current.deposit_cents)),
    )?;

    let service = Service::update(&state.pool, tenant_id, id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Service not found".to_string()))?;

    tracing::info!(service_id = %service.id, "Service updated");

    Ok(Json(service))
}

/// Services are deactivated, never deleted, so past bookings keep their reference
async fn deactivate_service(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = current_tenant(&session).await?;
    if !Service::deactivate(&state.pool, tenant_id, id).await? {
        return Err(AppError::NotFound("Service not found".to_string()));
    }

    tracing::info!(service_id = %id, "Service deactivated");

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/services", get(list_services).post(create_service))
        .route(
            "/api/services/:id",
            get(get_service)
                .put(update_service)
                .delete(deactivate_service),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, duration: i32, price: i64, deposit: i64) -> CreateServiceData {
        CreateServiceData {
            name: name.to_string(),
            description: None,
            duration_minutes: duration,
            price_cents: price,
            deposit_cents: deposit,
        }
    }

    #[test]
    fn test_validate_new_service() {
        assert!(validate_new_service(&service("Corte", 30, 500_000, 100_000)).is_ok());
        assert!(validate_new_service(&service("Corte", 30, 0, 0)).is_ok());
        assert!(validate_new_service(&service(" ", 30, 500_000, 0)).is_err());
        assert!(validate_new_service(&service("Corte", 0, 500_000, 0)).is_err());
        assert!(validate_new_service(&service("Corte", 1441, 500_000, 0)).is_err());
        assert!(validate_new_service(&service("Corte", 30, -1, 0)).is_err());
        assert!(validate_new_service(&service("Corte", 30, 1000, 2000)).is_err());
    }
}
