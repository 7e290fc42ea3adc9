use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::api::pagination::Pagination;
use crate::error::AppError;
use crate::models::customer::{Customer, CustomerSummary};

#[derive(Debug, Default, Deserialize)]
struct CustomerQuery {
    search: Option<String>,
}

/// Customers with their booking activity, most recent first
async fn list_customers(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CustomerQuery>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<CustomerSummary>>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let customers =
        Customer::list_by_tenant(&state.pool, tenant_id, search, page.limit(), page.offset()).await?;

    Ok(Json(customers))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/customers", get(list_customers))
}
