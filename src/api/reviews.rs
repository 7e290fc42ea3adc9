use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::api::middleware::auth::current_tenant;
use crate::api::middleware::session::AppState;
use crate::api::pagination::Pagination;
use crate::error::AppError;
use crate::models::review::{Review, ReviewWithAuthor};
use crate::services::reviews::{self, ReviewSummary};

#[derive(Debug, Serialize)]
pub struct ReviewListing {
    pub summary: ReviewSummary,
    pub reviews: Vec<ReviewWithAuthor>,
}

/// Reviews of a tenant with their summary; hidden ones only when `visible_only` is false
pub async fn listing(
    state: &AppState,
    tenant_id: Uuid,
    visible_only: bool,
    page: &Pagination,
) -> Result<ReviewListing, AppError> {
    let summary = reviews::summary(&state.pool, tenant_id, visible_only).await?;
    let reviews =
        Review::list_by_tenant(&state.pool, tenant_id, visible_only, page.limit(), page.offset())
            .await?;

    Ok(ReviewListing { summary, reviews })
}

async fn list_reviews(
    State(state): State<AppState>,
    session: Session,
    Query(page): Query<Pagination>,
) -> Result<Json<ReviewListing>, AppError> {
    let tenant_id = current_tenant(&session).await?;
    Ok(Json(listing(&state, tenant_id, false, &page).await?))
}

#[derive(Debug, Deserialize)]
struct VisibilityRequest {
    is_visible: bool,
}

async fn set_visibility(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<Review>, AppError> {
    let tenant_id = current_tenant(&session).await?;

    let review = Review::set_visibility(&state.pool, tenant_id, id, req.is_visible)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    tracing::info!(review_id = %id, is_visible = req.is_visible, "Review visibility changed");

    Ok(Json(review))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reviews", get(list_reviews))
        .route("/api/reviews/:id/visibility", put(set_visibility))
}
