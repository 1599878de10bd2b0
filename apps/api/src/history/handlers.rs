use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ArticleRecord, HistoryOwner};
use crate::auth::{authenticate, BearerToken};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Optional; when present it must name the signed-in user.
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryListResponse {
    pub articles: Vec<ArticleRecord>,
}

#[derive(Debug, Serialize)]
pub struct HistoryClearResponse {
    pub success: bool,
    pub deleted: u64,
}

/// The history owner is the verified caller. A `userId` naming anyone else is refused.
async fn owner_for(
    state: &AppState,
    token: &BearerToken,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<HistoryOwner, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let identity = authenticate(state.identity.as_ref(), token).await?;

    if let Some(claimed) = query.user_id.as_deref().map(str::trim) {
        if !claimed.is_empty() && claimed != identity.user_id {
            return Err(AppError::Forbidden(
                "userId does not match the signed-in user".to_string(),
            ));
        }
    }
    Ok(HistoryOwner::new(state.config.app_id.clone(), identity.user_id))
}

/// GET /api/v1/history
pub async fn handle_list_history(
    State(state): State<AppState>,
    token: BearerToken,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryListResponse>, AppError> {
    let owner = owner_for(&state, &token, query).await?;
    let articles = state.history.list(&owner).await?;
    Ok(Json(HistoryListResponse { articles }))
}

/// DELETE /api/v1/history
pub async fn handle_clear_history(
    State(state): State<AppState>,
    token: BearerToken,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryClearResponse>, AppError> {
    let owner = owner_for(&state, &token, query).await?;
    let deleted = state.history.clear(&owner).await?;
    tracing::info!(user_id = %owner.user_id, deleted, "History cleared");
    Ok(Json(HistoryClearResponse {
        success: true,
        deleted,
    }))
}
