//! Loan models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Loan review lifecycle
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    PendingReview,
    Approved,
    Rejected,
    Active,
}

/// Contract lifecycle, independent of the review status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "contract_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    None,
    Generated,
    Signed,
}

/// Gate controlling whether approved funds may be referenced by a transfer
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "funds_availability", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FundsAvailability {
    Pending,
    PendingDisbursement,
    Available,
}

/// Loan model. Deleted loans are tombstoned, never physically removed.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub loan_type: String,
    pub amount: i64,
    /// Annual rate in basis points
    pub interest_rate: i32,
    pub duration_months: i32,
    pub status: LoanStatus,
    pub contract_status: ContractStatus,
    pub funds_availability: FundsAvailability,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub deletion_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to open a loan application
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub loan_type: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(range(min = 0, max = 10_000))]
    pub interest_rate: i32,
    #[validate(range(min = 1, max = 360))]
    pub duration_months: i32,
}

/// Query for listing loans
#[derive(Debug, Deserialize)]
pub struct ListLoansQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// Admin soft-delete request
#[derive(Debug, Deserialize, Validate)]
pub struct DeleteLoanRequest {
    pub deleted_by: Uuid,
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}
