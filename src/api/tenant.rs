use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::auth::{account_response, AccountResponse};
use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::models::tenant::{Tenant, UpdateTenantData};
use crate::services::subscriptions::{self, SubscriptionOverview};

/// Rejects settings that would break availability computation
pub fn validate_settings(data: &UpdateTenantData) -> Result<(), AppError> {
    if data.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if data
        .slot_interval_minutes
        .is_some_and(|m| !(5..=240).contains(&m))
    {
        return Err(AppError::Validation(
            "slot_interval_minutes must be between 5 and 240".to_string(),
        ));
    }
    if data
        .booking_window_days
        .is_some_and(|d| !(1..=365).contains(&d))
    {
        return Err(AppError::Validation(
            "booking_window_days must be between 1 and 365".to_string(),
        ));
    }
    // UTC-12:00 to UTC+14:00
    if data
        .utc_offset_minutes
        .is_some_and(|o| !(-720..=840).contains(&o))
    {
        return Err(AppError::Validation(
            "utc_offset_minutes must be between -720 and 840".to_string(),
        ));
    }
    Ok(())
}

async fn get_tenant(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<AccountResponse>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    let tenant = Tenant::find_by_id(&state.pool, tenant_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(account_response(&state, tenant).await?))
}

async fn update_tenant(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UpdateTenantData>,
) -> Result<Json<Tenant>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    validate_settings(&req)?;

    let tenant = Tenant::update(&state.pool, tenant_id, req).await?;

    tracing::info!(tenant_id = %tenant.id, "Tenant settings updated");

    Ok(Json(tenant))
}

#[derive(Debug, Deserialize)]
struct MercadoPagoTokenRequest {
    /// `null` disconnects the account
    access_token: Option<String>,
}

/// Connects (or disconnects) the tenant's own Mercado Pago account
async fn set_mercadopago_token(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<MercadoPagoTokenRequest>,
) -> Result<StatusCode, AppError> {
    let tenant_id = current_tenant(&session).await?;

    let sealed = match req.access_token.as_deref().map(str::trim) {
        Some("") => {
            return Err(AppError::Validation(
                "access_token cannot be empty".to_string(),
            ))
        }
        Some(token) => Some(state.payments.seal_tenant_token(tenant_id, token)?),
        None => None,
    };

    let connected = sealed.is_some();
    Tenant::set_mp_access_token(&state.pool, tenant_id, sealed).await?;

    tracing::info!(%tenant_id, connected, "Mercado Pago account updated");

    Ok(StatusCode::NO_CONTENT)
}

async fn get_subscription(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<SubscriptionOverview>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    Ok(Json(subscriptions::overview(&state.pool, tenant_id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tenant", get(get_tenant).put(update_tenant))
        .route("/api/tenant/mercadopago", put(set_mercadopago_token))
        .route("/api/subscription", get(get_subscription))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_settings() {
        assert!(validate_settings(&UpdateTenantData::default()).is_ok());

        let ok = UpdateTenantData {
            slot_interval_minutes: Some(15),
            booking_window_days: Some(90),
            utc_offset_minutes: Some(-180),
            ..Default::default()
        };
        assert!(validate_settings(&ok).is_ok());

        for bad in [
            UpdateTenantData {
                name: Some("  ".to_string()),
                ..Default::default()
            },
            UpdateTenantData {
                slot_interval_minutes: Some(0),
                ..Default::default()
            },
            UpdateTenantData {
                booking_window_days: Some(400),
                ..Default::default()
            },
            UpdateTenantData {
                utc_offset_minutes: Some(-900),
                ..Default::default()
            },
        ] {
            assert!(matches!(validate_settings(&bad), Err(AppError::Validation(_))));
        }
    }
}
