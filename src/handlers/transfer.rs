//! Transfer API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::codes::ValidationCode;
use crate::error::{ApiError, ApiResult};
use crate::events::TransferEvent;
use crate::models::ApiResponse;
use crate::state::AppState;
use crate::transfer::planner::DisbursementPlan;
use crate::transfer::{
    CreateTransferRequest, ListTransfersQuery, PauseTransferRequest, ReissueCodesRequest,
    RejectTransferRequest, SimulateTransferRequest, SubmitCodeRequest, Transfer,
};

/// Pause response: the updated transfer plus the resume code that was issued
#[derive(Serialize)]
pub struct PauseResponse {
    pub transfer: Transfer,
    pub resume_code: ValidationCode,
}

/// Preview the tranche plan and fees without creating anything
pub async fn simulate_transfer(
    State(app_state): State<AppState>,
    Json(request): Json<SimulateTransferRequest>,
) -> ApiResult<Json<ApiResponse<DisbursementPlan>>> {
    request.validate()?;

    let plan = app_state.transfer_service.simulate(
        request.amount,
        request.network,
        request.urgent,
        request.cost_allocation,
    );

    Ok(Json(ApiResponse::ok(plan)))
}

/// Create a transfer against a loan with available funds
pub async fn create_transfer(
    State(app_state): State<AppState>,
    Json(request): Json<CreateTransferRequest>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    request.validate()?;

    let transfer = app_state.transfer_service.create_transfer(request).await?;
    Ok(Json(ApiResponse::ok(transfer)))
}

/// List transfers with optional filters
pub async fn list_transfers(
    State(app_state): State<AppState>,
    Query(query): Query<ListTransfersQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Transfer>>>> {
    let transfers = app_state.transfer_service.list_transfers(query).await?;
    Ok(Json(ApiResponse::ok(transfers)))
}

/// Get a single transfer by ID
pub async fn get_transfer(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    let transfer = app_state
        .transfer_service
        .get_transfer(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transfer not found".to_string()))?;

    Ok(Json(ApiResponse::ok(transfer)))
}

/// Audit trail for a transfer, oldest first
pub async fn list_transfer_events(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<TransferEvent>>>> {
    // 404 for unknown transfers rather than an empty list
    app_state
        .transfer_service
        .get_transfer(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transfer not found".to_string()))?;

    let events = app_state.event_log.list_for_transfer(id).await?;
    Ok(Json(ApiResponse::ok(events)))
}

/// Submit a validation code to advance (or resume) a transfer
pub async fn submit_code(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitCodeRequest>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    request.validate()?;

    let transfer = app_state
        .transfer_service
        .submit_code(id, &request.code)
        .await?;

    Ok(Json(ApiResponse::ok(transfer)))
}

/// Reissue response: the transfer plus the replacement codes
#[derive(Serialize)]
pub struct ReissueResponse {
    pub transfer: Transfer,
    pub codes: Vec<ValidationCode>,
}

/// Replace expired validation codes for a stalled transfer
pub async fn reissue_codes(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReissueCodesRequest>,
) -> ApiResult<Json<ApiResponse<ReissueResponse>>> {
    let (transfer, codes) = app_state.transfer_service.reissue_codes(id, request).await?;

    Ok(Json(ApiResponse::ok(ReissueResponse { transfer, codes })))
}

/// Pause a transfer at its current progress
pub async fn pause_transfer(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PauseTransferRequest>,
) -> ApiResult<Json<ApiResponse<PauseResponse>>> {
    let (transfer, resume_code) = app_state.transfer_service.pause(id, request).await?;

    Ok(Json(ApiResponse::ok(PauseResponse {
        transfer,
        resume_code,
    })))
}

/// Admin sign-off on a transfer
pub async fn approve_transfer(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    let transfer = app_state.transfer_service.approve(id).await?;
    Ok(Json(ApiResponse::ok(transfer)))
}

/// Suspend a transfer pending investigation
pub async fn suspend_transfer(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    let transfer = app_state.transfer_service.suspend(id).await?;
    Ok(Json(ApiResponse::ok(transfer)))
}

/// Lift a suspension
pub async fn reinstate_transfer(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    let transfer = app_state.transfer_service.reinstate(id).await?;
    Ok(Json(ApiResponse::ok(transfer)))
}

/// Reject a transfer (terminal)
pub async fn reject_transfer(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectTransferRequest>,
) -> ApiResult<Json<ApiResponse<Transfer>>> {
    let transfer = app_state.transfer_service.reject(id, request).await?;
    Ok(Json(ApiResponse::ok(transfer)))
}
