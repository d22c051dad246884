//! Transfer models and state definitions
//!
//! Transfer status is a closed enum with exhaustive transition checks, not a
//! set of free-form strings: an invalid status cannot be represented, and a
//! missed match arm is a compile error.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::codes::DeliveryMethod;
use crate::transfer::planner::{CostAllocation, NetworkType};

/// Transfer lifecycle states
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "transfer_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Suspended,
    Completed,
}

impl TransferStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }

    /// States in which code consumption may advance the transfer
    /// (pause is checked separately on the transfer row).
    pub fn can_advance(&self) -> bool {
        matches!(
            self,
            TransferStatus::Pending | TransferStatus::InProgress | TransferStatus::Approved
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InProgress => "inprogress",
            TransferStatus::Approved => "approved",
            TransferStatus::Rejected => "rejected",
            TransferStatus::Suspended => "suspended",
            TransferStatus::Completed => "completed",
        }
    }
}

/// Transfer model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Transfer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub loan_id: Option<Uuid>,
    pub external_account_id: Option<Uuid>,
    pub amount: i64,
    pub fee_amount: i64,
    pub status: TransferStatus,
    pub current_step: i32,
    /// 0-100, derived from codes_validated / required_codes
    pub progress_percent: i32,
    pub required_codes: i32,
    pub codes_validated: i32,
    pub is_paused: bool,
    /// Progress level frozen at the most recent pause checkpoint
    pub pause_percent: Option<i32>,
    pub pause_codes_validated: Option<i32>,
    pub approved_at: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to initiate a transfer against a loan with available funds
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransferRequest {
    pub user_id: Uuid,
    pub loan_id: Uuid,
    pub external_account_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub network: NetworkType,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub cost_allocation: CostAllocation,
}

/// Request to run the disbursement planner without committing anything
#[derive(Debug, Deserialize, Validate)]
pub struct SimulateTransferRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    pub network: NetworkType,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub cost_allocation: CostAllocation,
}

/// Validation code submission against a transfer
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitCodeRequest {
    #[validate(length(min = 4, max = 32))]
    pub code: String,
}

/// Admin pause request; the resume code is issued on the given channel
#[derive(Debug, Deserialize)]
pub struct PauseTransferRequest {
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
}

/// Admin request to replace expired codes; replacements go out on the
/// given channel
#[derive(Debug, Deserialize)]
pub struct ReissueCodesRequest {
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
}

/// Admin rejection request
#[derive(Debug, Deserialize)]
pub struct RejectTransferRequest {
    pub reason: Option<String>,
}

/// Query parameters for listing transfers
#[derive(Debug, Deserialize)]
pub struct ListTransfersQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<TransferStatus>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::InProgress.is_terminal());
        assert!(!TransferStatus::Approved.is_terminal());
        assert!(!TransferStatus::Suspended.is_terminal());
    }

    #[test]
    fn test_advancement_eligibility() {
        assert!(TransferStatus::Pending.can_advance());
        assert!(TransferStatus::InProgress.can_advance());
        assert!(TransferStatus::Approved.can_advance());
        assert!(!TransferStatus::Suspended.can_advance());
        assert!(!TransferStatus::Completed.can_advance());
        assert!(!TransferStatus::Rejected.can_advance());
    }

    #[test]
    fn test_status_serialization_matches_db_enum() {
        for (status, expected) in [
            (TransferStatus::Pending, "\"pending\""),
            (TransferStatus::InProgress, "\"inprogress\""),
            (TransferStatus::Completed, "\"completed\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), expected);
            assert_eq!(format!("\"{}\"", status.as_str()), expected);
        }
    }
}
