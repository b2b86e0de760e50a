use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentReviewer, CurrentUser};
use crate::core::state::AppState;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::material::{
    MaterialResponse, MaterialStatistics, ReviewRequest, ReviewResponse,
};
use crate::services::review::{ReviewDecision, ReviewError};

pub(super) async fn review_material(
    CurrentReviewer(reviewer): CurrentReviewer,
    State(state): State<AppState>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let limit = state.settings().review().rate_limit_per_minute;
    match state.redis().allow_review(&reviewer.account_id, limit).await {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::TooManyRequests("Too many review submissions")),
        Err(err) => {
            tracing::warn!(error = %err, "Review rate limit check failed; allowing request");
        }
    }

    let decision = ReviewDecision::parse(&payload.status);
    let outcome = state
        .engine()
        .submit_review(&payload.material_id, &decision, &payload.comment, &reviewer.account_id)
        .await
        .map_err(map_review_error)?;

    Ok(Json(ReviewResponse::from_outcome(&payload.status, outcome)))
}

pub(super) async fn list_materials(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MaterialResponse>>, ApiError> {
    let materials = repositories::materials::list(state.db(), uploader_scope(&user))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list materials"))?;

    Ok(Json(materials.into_iter().map(MaterialResponse::from).collect()))
}

pub(super) async fn list_pending(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MaterialResponse>>, ApiError> {
    let exclude_reviewer = user.role.can_review().then_some(user.account_id.as_str());
    let materials =
        repositories::materials::list_pending(state.db(), uploader_scope(&user), exclude_reviewer)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list pending materials"))?;

    Ok(Json(materials.into_iter().map(MaterialResponse::from).collect()))
}

pub(super) async fn statistics(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<MaterialStatistics>, ApiError> {
    let scope = uploader_scope(&user);
    let counts = repositories::materials::status_counts(state.db(), scope)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count materials"))?;
    let categories = repositories::materials::category_counts(state.db(), scope)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count material categories"))?;

    Ok(Json(MaterialStatistics {
        total: counts.total,
        pending: counts.pending,
        approved: counts.approved,
        rejected: counts.rejected,
        by_category: categories.into_iter().map(|row| (row.category, row.count)).collect(),
    }))
}

pub(super) async fn get_material(
    Path(material_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<MaterialResponse>, ApiError> {
    let material = repositories::materials::find_by_id(state.db(), &material_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch material"))?
        .ok_or_else(|| ApiError::NotFound("Material not found".to_string()))?;

    if material.uploader != user.account_id && !user.role.can_review() {
        return Err(ApiError::Forbidden("Not enough permissions"));
    }

    Ok(Json(MaterialResponse::from(material)))
}

pub(super) async fn delete_material(
    Path(material_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let material = repositories::materials::find_by_id(state.db(), &material_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch material"))?
        .ok_or_else(|| ApiError::NotFound("Material not found".to_string()))?;

    if material.uploader != user.account_id && user.role != UserRole::Admin {
        return Err(ApiError::Forbidden("Not enough permissions"));
    }

    let deleted = repositories::materials::delete(state.db(), &material_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete material"))?;
    if !deleted {
        return Err(ApiError::NotFound("Material not found".to_string()));
    }

    tracing::info!(material_id = %material_id, deleted_by = %user.account_id, "Material deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Plain users only see their own uploads.
fn uploader_scope(user: &User) -> Option<&str> {
    (!user.role.can_review()).then_some(user.account_id.as_str())
}

fn map_review_error(error: ReviewError) -> ApiError {
    match error {
        ReviewError::MissingMaterialId | ReviewError::InvalidReviewer => {
            ApiError::BadRequest(error.to_string())
        }
        ReviewError::NotFound(_) => ApiError::NotFound("Material not found".to_string()),
        ReviewError::Conflict(_) => {
            ApiError::Conflict("Material is being reviewed concurrently, retry".to_string())
        }
        ReviewError::Load { .. } => ApiError::internal(error, "Failed to load material"),
        ReviewError::Persist { .. } => ApiError::internal(error, "Failed to save review"),
        ReviewError::Finalize(_) | ReviewError::FinalizeAndPersist { .. } => {
            ApiError::internal(error, "Failed to finalize approved material")
        }
    }
}
