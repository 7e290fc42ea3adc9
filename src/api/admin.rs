use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    middleware,
    routing::{get, patch, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::auth::{client_ip, require_admin_key};
use crate::api::middleware::session::AppState;
use crate::api::pagination::{Page, Pagination};
use crate::error::AppError;
use crate::models::{
    audit_log::{AuditLog, AuditLogFilter},
    subscription::Subscription,
    tenant::{Tenant, TenantFilter, TenantOverview},
};
use crate::services::admin::{self, PlatformStats, SecuritySummary, SubscriptionChange};

async fn list_tenants(
    State(state): State<AppState>,
    Query(filter): Query<TenantFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<TenantOverview>>, AppError> {
    let (tenants, total) =
        Tenant::list_overview(&state.pool, &filter, page.limit(), page.offset()).await?;

    Ok(Json(Page::new(tenants, &page, total)))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    is_active: bool,
}

async fn set_tenant_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = admin::set_tenant_active(&state.pool, id, req.is_active, client_ip(&headers)).await?;
    Ok(Json(tenant))
}

async fn change_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(change): Json<SubscriptionChange>,
) -> Result<Json<Subscription>, AppError> {
    let subscription =
        admin::change_subscription(&state.pool, id, change, client_ip(&headers)).await?;
    Ok(Json(subscription))
}

async fn list_audit_logs(
    State(state): State<AppState>,
    Query(filter): Query<AuditLogFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<AuditLog>>, AppError> {
    let (logs, total) = AuditLog::list(&state.pool, &filter, page.limit(), page.offset()).await?;
    Ok(Json(Page::new(logs, &page, total)))
}

async fn security(State(state): State<AppState>) -> Result<Json<SecuritySummary>, AppError> {
    Ok(Json(admin::security_summary(&state.pool, Utc::now()).await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<PlatformStats>, AppError> {
    Ok(Json(admin::platform_stats(&state.pool, Utc::now()).await?))
}

/// Platform operator routes, all behind the admin key
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/tenants", get(list_tenants))
        .route("/api/admin/tenants/:id/status", patch(set_tenant_status))
        .route("/api/admin/tenants/:id/subscription", put(change_subscription))
        .route("/api/admin/audit-logs", get(list_audit_logs))
        .route("/api/admin/security", get(security))
        .route("/api/admin/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state, require_admin_key))
}
