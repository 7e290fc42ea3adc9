use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_sessions::Session;

use crate::api::middleware::auth::{client_ip, current_tenant};
use crate::api::middleware::session::{
    AppState, SESSION_KEY_SESSION_STARTED_AT, SESSION_KEY_TENANT_ID,
};
use crate::error::AppError;
use crate::models::tenant::Tenant;
use crate::services::auth::{self, LoginRequest, RegisterRequest};
use crate::services::subscriptions::{self, SubscriptionOverview};

#[derive(Debug, Serialize)]
pub(crate) struct AccountResponse {
    tenant: Tenant,
    mercadopago_connected: bool,
    subscription: SubscriptionOverview,
}

pub(crate) async fn account_response(state: &AppState, tenant: Tenant) -> Result<AccountResponse, AppError> {
    let subscription = subscriptions::overview(&state.pool, tenant.id).await?;
    Ok(AccountResponse {
        mercadopago_connected: tenant.mp_access_token.is_some(),
        tenant,
        subscription,
    })
}

async fn start_session(session: &Session, tenant: &Tenant) -> Result<(), AppError> {
    // New id on privilege change
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    session
        .insert(SESSION_KEY_TENANT_ID, tenant.id)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    session
        .insert(SESSION_KEY_SESSION_STARTED_AT, Utc::now().to_rfc3339())
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;
    Ok(())
}

/// Registers a business and logs its owner in
async fn register(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let tenant = auth::register(&state.pool, req, client_ip(&headers), Utc::now()).await?;
    start_session(&session, &tenant).await?;

    Ok((StatusCode::CREATED, Json(account_response(&state, tenant).await?)))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let tenant = auth::login(&state.pool, req, client_ip(&headers), Utc::now()).await?;
    start_session(&session, &tenant).await?;

    Ok(Json(account_response(&state, tenant).await?))
}

/// Logs out the owner
async fn logout(session: Session) -> Result<StatusCode, AppError> {
    session
        .flush()
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

async fn me(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<AccountResponse>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    let tenant = Tenant::find_by_id(&state.pool, tenant_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(account_response(&state, tenant).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}
