//! Loan API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::codes::{DeliveryMethod, ValidationCode};
use crate::error::{ApiError, ApiResult};
use crate::loan::{CreateLoanRequest, DeleteLoanRequest, ListLoansQuery, Loan};
use crate::models::ApiResponse;
use crate::state::AppState;

/// Contract confirmation request
#[derive(Debug, Deserialize)]
pub struct ConfirmContractRequest {
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
}

/// Confirmation response: the updated loan plus its pre-generated codes
#[derive(Serialize)]
pub struct ConfirmContractResponse {
    pub loan: Loan,
    pub codes: Vec<ValidationCode>,
}

/// Open a loan application
pub async fn create_loan(
    State(app_state): State<AppState>,
    Json(request): Json<CreateLoanRequest>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    request.validate()?;

    let loan = app_state.loan_service.create_loan(request).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// List loans with optional filters
pub async fn list_loans(
    State(app_state): State<AppState>,
    Query(query): Query<ListLoansQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Loan>>>> {
    let loans = app_state.loan_service.list_loans(query).await?;
    Ok(Json(ApiResponse::ok(loans)))
}

/// Get a single loan by ID
pub async fn get_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = app_state
        .loan_service
        .get_loan(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Loan not found".to_string()))?;

    Ok(Json(ApiResponse::ok(loan)))
}

/// Approve a loan under review
pub async fn approve_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = app_state.loan_service.approve_loan(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// Reject a loan under review
pub async fn reject_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = app_state.loan_service.reject_loan(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// Generate the contract for an approved loan
pub async fn generate_contract(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = app_state.loan_service.generate_contract(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// Confirm the signed contract; pre-generates validation codes
pub async fn confirm_contract(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmContractRequest>,
) -> ApiResult<Json<ApiResponse<ConfirmContractResponse>>> {
    let (loan, codes) = app_state
        .loan_service
        .confirm_contract(id, request.delivery_method)
        .await?;

    Ok(Json(ApiResponse::ok(ConfirmContractResponse {
        loan,
        codes,
    })))
}

/// Release loan funds for transfer
pub async fn release_funds(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = app_state.loan_service.release_funds(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// Soft-delete a loan, keeping the row for audit
pub async fn delete_loan(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<DeleteLoanRequest>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = app_state.loan_service.soft_delete_loan(id, request).await?;
    Ok(Json(ApiResponse::ok(loan)))
}
