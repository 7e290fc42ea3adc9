use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::models::{
    employee::Employee,
    schedule::{self, Schedule, ScheduleEntry, ScheduleError},
};

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Time(e) => AppError::Time(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// `?employee_id=` selects an employee's own hours; absent means tenant-wide
#[derive(Debug, Default, Deserialize)]
struct ScheduleQuery {
    employee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ReplaceScheduleRequest {
    employee_id: Option<Uuid>,
    entries: Vec<ScheduleEntry>,
}

async fn ensure_employee(state: &AppState, tenant_id: Uuid, employee_id: Option<Uuid>) -> Result<(), AppError> {
    if let Some(employee_id) = employee_id {
        Employee::find_for_tenant(&state.pool, tenant_id, employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))?;
    }
    Ok(())
}

async fn list_schedules(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Vec<Schedule>>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    ensure_employee(&state, tenant_id, query.employee_id).await?;

    Ok(Json(Schedule::list(&state.pool, tenant_id, query.employee_id).await?))
}

/// Replaces the whole weekly schedule; an empty list clears it
async fn replace_schedules(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<ReplaceScheduleRequest>,
) -> Result<Json<Vec<Schedule>>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    ensure_employee(&state, tenant_id, req.employee_id).await?;

    let entries = schedule::normalize_entries(req.entries)?;
    let schedules =
        Schedule::replace_weekly(&state.pool, tenant_id, req.employee_id, &entries).await?;

    tracing::info!(
        %tenant_id,
        employee_id = ?req.employee_id,
        blocks = schedules.len(),
        "Weekly schedule replaced"
    );

    Ok(Json(schedules))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/schedules", get(list_schedules).put(replace_schedules))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_errors_are_validation_errors() {
        let err: AppError = ScheduleError::Overlap(1).into();
        assert!(matches!(err, AppError::Validation(_)));

        let err: AppError = ScheduleError::InvalidDay(9).into();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
