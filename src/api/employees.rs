use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::models::{
    employee::{CreateEmployeeData, Employee, UpdateEmployeeData},
    service::Service,
};
use crate::services::subscriptions;

#[derive(Debug, Serialize)]
struct EmployeeWithServices {
    #[serde(flatten)]
    employee: Employee,
    service_ids: Vec<Uuid>,
}

async fn list_employees(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<EmployeeWithServices>>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    let employees = Employee::list_by_tenant(&state.pool, tenant_id).await?;
    let mut result = Vec::with_capacity(employees.len());
    for employee in employees {
        let service_ids = Employee::service_ids(&state.pool, employee.id).await?;
        result.push(EmployeeWithServices {
            employee,
            service_ids,
        });
    }

    Ok(Json(result))
}

async fn create_employee(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateEmployeeData>,
) -> Result<(StatusCode, Json<Employee>), AppError> {
    let tenant_id = current_tenant(&session).await?;
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Employee name is required".to_string()));
    }
    subscriptions::ensure_can_add_employee(&state.pool, tenant_id).await?;

    let employee = Employee::create(&state.pool, tenant_id, req).await?;

    tracing::info!(employee_id = %employee.id, %tenant_id, "Employee created");

    Ok((StatusCode::CREATED, Json(employee)))
}

async fn update_employee(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEmployeeData>,
) -> Result<Json<Employee>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Employee name is required".to_string()));
    }

    let employee = Employee::update(&state.pool, tenant_id, id, req)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))?;

    Ok(Json(employee))
}

async fn deactivate_employee(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let tenant_id = current_tenant(&session).await?;
    if !Employee::deactivate(&state.pool, tenant_id, id).await? {
        return Err(AppError::NotFound("Employee not found".to_string()));
    }

    tracing::info!(employee_id = %id, "Employee deactivated");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct AssignServicesRequest {
    service_ids: Vec<Uuid>,
}

/// Replaces the set of services an employee performs
async fn assign_services(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(mut req): Json<AssignServicesRequest>,
) -> Result<Json<Vec<Uuid>>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    Employee::find_for_tenant(&state.pool, tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".to_string()))?;

    req.service_ids.sort();
    req.service_ids.dedup();
    for service_id in &req.service_ids {
        if Service::find_for_tenant(&state.pool, tenant_id, *service_id)
            .await?
            .is_none()
        {
            return Err(AppError::Validation(format!(
                "Unknown service: {}",
                service_id
            )));
        }
    }

    Employee::set_services(&state.pool, id, &req.service_ids).await?;

    tracing::info!(employee_id = %id, services = req.service_ids.len(), "Employee services updated");

    Ok(Json(req.service_ids))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/employees", get(list_employees).post(create_employee))
        .route(
            "/api/employees/:id",
            put(update_employee).delete(deactivate_employee),
        )
        .route("/api/employees/:id/services", put(assign_services))
}
