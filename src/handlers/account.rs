//! External account API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::accounts::{CreateAccountRequest, ExternalAccount};
use crate::error::{ApiError, ApiResult};
use crate::models::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListAccountsQuery {
    pub user_id: Uuid,
}

/// Register a destination account
pub async fn create_account(
    State(app_state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> ApiResult<Json<ApiResponse<ExternalAccount>>> {
    request.validate()?;

    let account = app_state.account_service.create_account(request).await?;
    Ok(Json(ApiResponse::ok(account)))
}

/// Accounts for a user, default first
pub async fn list_accounts(
    State(app_state): State<AppState>,
    Query(query): Query<ListAccountsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ExternalAccount>>>> {
    let accounts = app_state
        .account_service
        .list_for_user(query.user_id)
        .await?;

    Ok(Json(ApiResponse::ok(accounts)))
}

/// Get a single account by ID
pub async fn get_account(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ExternalAccount>>> {
    let account = app_state
        .account_service
        .get_account(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    Ok(Json(ApiResponse::ok(account)))
}
