use axum::extract::State;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::models::MaterialRecord;
use crate::repositories;
use crate::schemas::bonus::{BonusRecordResponse, BonusSummaryResponse};
use crate::services::bonus::{self, BonusType};

pub(super) async fn academic_list(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BonusRecordResponse>>, ApiError> {
    list_for(&state, &user.account_id, BonusType::Academic).await
}

pub(super) async fn comprehensive_list(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BonusRecordResponse>>, ApiError> {
    list_for(&state, &user.account_id, BonusType::Comprehensive).await
}

pub(super) async fn summary(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<BonusSummaryResponse>, ApiError> {
    let records = load_records(&state, &user.account_id).await?;
    Ok(Json(bonus::summarize(&records).into()))
}

async fn list_for(
    state: &AppState,
    account_id: &str,
    target: BonusType,
) -> Result<Json<Vec<BonusRecordResponse>>, ApiError> {
    let records = load_records(state, account_id).await?;
    Ok(Json(
        bonus::filter_by_type(records, target).into_iter().map(BonusRecordResponse::from).collect(),
    ))
}

async fn load_records(state: &AppState, account_id: &str) -> Result<Vec<MaterialRecord>, ApiError> {
    repositories::material_records::list_by_account(state.db(), account_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load bonus records"))
}
