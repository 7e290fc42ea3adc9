use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_sessions::Session;

use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::services::reports::{self, ReportRange, ReportSummary};

/// `GET /api/reports/summary?from=YYYY-MM-DD&to=YYYY-MM-DD`
async fn summary(
    State(state): State<AppState>,
    session: Session,
    Query(range): Query<ReportRange>,
) -> Result<Json<ReportSummary>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    Ok(Json(reports::summary(&state.pool, tenant_id, range).await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reports/summary", get(summary))
}
