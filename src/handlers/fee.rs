//! Fee ledger API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::fees::{CreateFeeRequest, Fee, ListFeesQuery};
use crate::models::ApiResponse;
use crate::state::AppState;

/// Record an ad hoc fee against a user
pub async fn create_fee(
    State(app_state): State<AppState>,
    Json(request): Json<CreateFeeRequest>,
) -> ApiResult<Json<ApiResponse<Fee>>> {
    request.validate()?;

    let fee = app_state.fee_service.add_fee(request).await?;
    app_state.notifier.fee_assessed(&fee).await;

    Ok(Json(ApiResponse::ok(fee)))
}

/// Mark a fee as paid
pub async fn pay_fee(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Fee>>> {
    let fee = app_state.fee_service.mark_paid(id).await?;
    Ok(Json(ApiResponse::ok(fee)))
}

/// Fees for a user, newest first
pub async fn list_fees(
    State(app_state): State<AppState>,
    Query(query): Query<ListFeesQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Fee>>>> {
    let fees = app_state.fee_service.list_fees(query).await?;
    Ok(Json(ApiResponse::ok(fees)))
}
