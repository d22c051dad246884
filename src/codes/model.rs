//! Validation code models

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by code issuance and consumption
#[derive(Error, Debug)]
pub enum CodeError {
    #[error("Validation code not found")]
    NotFound,

    #[error("Validation code has already been used")]
    AlreadyConsumed,

    #[error("Validation code has expired")]
    Expired,

    #[error("Validation code submitted out of sequence")]
    OutOfSequence,

    /// Issuance could not obtain a monotonic sequence slot. Indicates a bug
    /// or pathological contention; never shown to end users.
    #[error("Code issuance sequence violated for {target}")]
    SequenceViolation { target: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Code category: first-stage tranche validation or pause-checkpoint resume
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "code_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    Initial,
    PauseResume,
}

/// Out-of-band channel used to deliver a code
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "delivery_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    #[default]
    Email,
    Sms,
    None,
}

/// A single-use, time-bounded validation code tied to a transfer or a loan.
///
/// Codes pre-generated at contract confirmation carry a `loan_id` only; the
/// `transfer_id` is stamped when a transfer consumes them.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ValidationCode {
    pub id: Uuid,
    pub code: String,
    pub transfer_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
    pub code_type: CodeType,
    pub code_context: Option<String>,
    pub sequence: i32,
    pub pause_percent: Option<i32>,
    pub delivery_method: DeliveryMethod,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ValidationCode {
    /// Whether the code is still usable at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now <= self.expires_at
    }
}

/// Issuance target: a code belongs to exactly one transfer or one loan
#[derive(Debug, Clone, Copy)]
pub enum CodeTarget {
    Transfer(Uuid),
    Loan(Uuid),
}

impl CodeTarget {
    pub fn transfer_id(&self) -> Option<Uuid> {
        match self {
            CodeTarget::Transfer(id) => Some(*id),
            CodeTarget::Loan(_) => None,
        }
    }

    pub fn loan_id(&self) -> Option<Uuid> {
        match self {
            CodeTarget::Transfer(_) => None,
            CodeTarget::Loan(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for CodeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeTarget::Transfer(id) => write!(f, "transfer {}", id),
            CodeTarget::Loan(id) => write!(f, "loan {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_code() -> ValidationCode {
        ValidationCode {
            id: Uuid::new_v4(),
            code: "ABCD123456".to_string(),
            transfer_id: None,
            loan_id: Some(Uuid::new_v4()),
            code_type: CodeType::Initial,
            code_context: None,
            sequence: 1,
            pause_percent: None,
            delivery_method: DeliveryMethod::Email,
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(48),
            consumed_at: None,
        }
    }

    #[test]
    fn test_code_validity_window() {
        let code = sample_code();
        assert!(code.is_valid_at(Utc::now()));
        assert!(!code.is_valid_at(Utc::now() + Duration::hours(49)));
    }

    #[test]
    fn test_consumed_code_is_invalid() {
        let mut code = sample_code();
        code.consumed_at = Some(Utc::now());
        assert!(!code.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_code_target_ids() {
        let id = Uuid::new_v4();
        assert_eq!(CodeTarget::Transfer(id).transfer_id(), Some(id));
        assert_eq!(CodeTarget::Transfer(id).loan_id(), None);
        assert_eq!(CodeTarget::Loan(id).loan_id(), Some(id));
    }
}
