//! Transfer service layer - the disbursement state machine
//!
//! Owns a transfer's lifecycle from creation through staged, code-validated
//! advancement to completion, plus the admin actions (approve, pause,
//! suspend, reinstate, reject). Every operation runs in a single database
//! transaction with the transfer row locked `FOR UPDATE`, so code
//! consumption and progress updates commit atomically and two racing
//! submissions cannot credit the same tranche twice. Audit events are
//! written in the same transaction as the state change they describe.

use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::codes::{
    CodeError, CodeService, CodeTarget, CodeType, DeliveryMethod, NewCode, ValidationCode,
};
use crate::events::EventLog;
use crate::fees::FeeService;
use crate::loan::{FundsAvailability, Loan};
use crate::transfer::planner::{self, CostAllocation, DisbursementPlan, FeePolicy, NetworkType};
use crate::models::PaginationParams;
use crate::transfer::{
    CreateTransferRequest, ListTransfersQuery, PauseTransferRequest, ReissueCodesRequest,
    RejectTransferRequest, Transfer, TransferStatus,
};

/// Transfer domain errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Transfer not found")]
    NotFound,

    #[error("Loan not found")]
    LoanNotFound,

    #[error("Loan funds are not available for transfer")]
    FundsNotAvailable,

    #[error("Cannot {action} this transfer ({detail})")]
    InvalidStateTransition {
        action: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Code(#[from] CodeError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transfer service
#[derive(Clone)]
pub struct TransferService {
    db_pool: PgPool,
    fee_policy: FeePolicy,
    codes: CodeService,
}

impl TransferService {
    pub fn new(db_pool: PgPool, fee_policy: FeePolicy, codes: CodeService) -> Self {
        Self {
            db_pool,
            fee_policy,
            codes,
        }
    }

    /// Run the disbursement planner without touching any state.
    pub fn simulate(
        &self,
        amount: i64,
        network: NetworkType,
        urgent: bool,
        cost_allocation: CostAllocation,
    ) -> DisbursementPlan {
        planner::plan(amount, network, urgent, cost_allocation, &self.fee_policy)
    }

    /// Initiate a transfer against a loan whose funds are available.
    ///
    /// Computes the tranche plan, records the total fee in the fee ledger
    /// and, when the loan has no usable pre-generated codes left, issues a
    /// fresh set bound directly to the transfer. Pre-generated loan codes
    /// are otherwise consumed lazily as tranches clear.
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<Transfer, TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(request.loan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(TransferError::LoanNotFound)?;

        // Do not reveal other users' loans
        if loan.user_id != request.user_id {
            return Err(TransferError::LoanNotFound);
        }
        if loan.funds_availability != FundsAvailability::Available {
            return Err(TransferError::FundsNotAvailable);
        }

        let plan = planner::plan(
            request.amount,
            request.network,
            request.urgent,
            request.cost_allocation,
            &self.fee_policy,
        );
        let required_codes = plan.required_codes();

        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (
                id, user_id, loan_id, external_account_id, amount, fee_amount,
                status, current_step, progress_percent, required_codes,
                codes_validated, is_paused, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 1, 0, $8, 0, false, $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.loan_id)
        .bind(request.external_account_id)
        .bind(request.amount)
        .bind(plan.fees.total)
        .bind(TransferStatus::Pending)
        .bind(required_codes)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        FeeService::add_fee_on(
            &mut tx,
            request.user_id,
            "transfer",
            &format!("Transfer fees ({} tranche plan)", required_codes),
            plan.fees.total,
            None,
        )
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "created",
            "Transfer created",
            json!({
                "amount": transfer.amount,
                "required_codes": required_codes,
                "fee_total": plan.fees.total,
                "tranches": plan.tranches,
            }),
        )
        .await?;

        // Fresh issuance only when the loan has no usable pre-generated codes
        let mut issued: Vec<ValidationCode> = Vec::new();
        let available = CodeService::available_for_loan_on(&mut tx, request.loan_id).await?;
        if available == 0 {
            for _ in 0..required_codes {
                let new_code = NewCode {
                    target: CodeTarget::Transfer(transfer.id),
                    code_type: CodeType::Initial,
                    code_context: None,
                    pause_percent: None,
                    delivery_method: DeliveryMethod::Email,
                };
                issued.push(
                    CodeService::issue_code_on(&mut tx, &new_code, self.codes.validity_hours())
                        .await?,
                );
            }
        }

        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            loan_id = %request.loan_id,
            amount = transfer.amount,
            required_codes,
            fresh_codes = issued.len(),
            "Transfer created"
        );

        for code in &issued {
            self.codes.deliver(code).await;
        }

        Ok(transfer)
    }

    /// Submit a validation code against a transfer.
    ///
    /// On a paused transfer only the matching pause-resume code is accepted,
    /// and it resumes advancement without crediting a tranche. Otherwise the
    /// lowest-sequence unconsumed initial code must be submitted; consuming
    /// it clears one tranche. Invalid submissions (unknown, used, expired,
    /// out of sequence) leave the transfer untouched.
    pub async fn submit_code(
        &self,
        transfer_id: Uuid,
        submitted: &str,
    ) -> Result<Transfer, TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if !transfer.status.can_advance() {
            return Err(TransferError::InvalidStateTransition {
                action: "advance",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }

        let code = CodeService::find_by_code_on(&mut tx, submitted)
            .await?
            .ok_or(CodeError::NotFound)?;

        // A code belongs to this transfer directly, or to its loan while not
        // yet bound to any transfer. Anything else is reported as unknown so
        // submissions cannot probe other targets' codes.
        let owned = code.transfer_id == Some(transfer.id)
            || (code.transfer_id.is_none()
                && code.loan_id.is_some()
                && code.loan_id == transfer.loan_id);
        if !owned {
            return Err(CodeError::NotFound.into());
        }

        // The code's own state is reported before order is enforced, so a
        // stale submission gets the specific reason rather than a generic
        // sequencing error.
        if code.consumed_at.is_some() {
            return Err(CodeError::AlreadyConsumed.into());
        }
        if Utc::now() > code.expires_at {
            return Err(CodeError::Expired.into());
        }

        if transfer.is_paused {
            return self.resume_with_code(tx, transfer, code, submitted).await;
        }

        if code.code_type == CodeType::PauseResume {
            return Err(TransferError::InvalidStateTransition {
                action: "resume",
                detail: "transfer is not paused".to_string(),
            });
        }

        // Tranches clear strictly in issuance order
        let expected =
            CodeService::next_pending_sequence_on(&mut tx, transfer.id, transfer.loan_id).await?;
        if expected != Some(code.sequence) {
            return Err(CodeError::OutOfSequence.into());
        }

        let consumed = CodeService::consume_code_on(&mut tx, submitted).await?;

        // Lazy binding of a pre-generated loan code
        if consumed.transfer_id.is_none() {
            sqlx::query("UPDATE transfer_validation_codes SET transfer_id = $2 WHERE id = $1")
                .bind(consumed.id)
                .bind(transfer.id)
                .execute(&mut *tx)
                .await?;
        }

        let codes_validated = transfer.codes_validated + 1;
        let progress_percent = codes_validated * 100 / transfer.required_codes;
        let completed = codes_validated == transfer.required_codes;
        let current_step = (codes_validated + 1).min(transfer.required_codes);

        let status = if completed {
            TransferStatus::Completed
        } else if transfer.status == TransferStatus::Pending {
            TransferStatus::InProgress
        } else {
            transfer.status
        };

        let now = Utc::now();
        let updated = sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers
            SET codes_validated = $2,
                progress_percent = $3,
                current_step = $4,
                status = $5,
                completed_at = CASE WHEN $6 THEN COALESCE(completed_at, $7) ELSE completed_at END,
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(transfer.id)
        .bind(codes_validated)
        .bind(progress_percent)
        .bind(current_step)
        .bind(status)
        .bind(completed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "tranche_cleared",
            &format!(
                "Tranche {} of {} validated",
                codes_validated, transfer.required_codes
            ),
            json!({
                "sequence": consumed.sequence,
                "codes_validated": codes_validated,
                "progress_percent": progress_percent,
            }),
        )
        .await?;

        if completed {
            EventLog::record_on(
                &mut tx,
                transfer.id,
                "completed",
                "All tranches validated, transfer completed",
                json!({ "codes_validated": codes_validated }),
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            transfer_id = %updated.id,
            codes_validated,
            progress_percent,
            status = updated.status.as_str(),
            "Transfer advanced"
        );

        Ok(updated)
    }

    /// Pause a transfer at its current progress. Freezes the checkpoint,
    /// records how many codes were validated before it, and issues the
    /// pause-resume code that will unlock advancement again. Each pause
    /// point can be used at most once.
    pub async fn pause(
        &self,
        transfer_id: Uuid,
        request: PauseTransferRequest,
    ) -> Result<(Transfer, ValidationCode), TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if !transfer.status.can_advance() {
            return Err(TransferError::InvalidStateTransition {
                action: "pause",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }
        if transfer.is_paused {
            return Err(TransferError::InvalidStateTransition {
                action: "pause",
                detail: "transfer is already paused".to_string(),
            });
        }
        if transfer.pause_percent == Some(transfer.progress_percent) {
            return Err(TransferError::InvalidStateTransition {
                action: "pause",
                detail: format!(
                    "pause point at {}% has already been used",
                    transfer.progress_percent
                ),
            });
        }

        let updated = sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers
            SET is_paused = true,
                pause_percent = $2,
                pause_codes_validated = $3,
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(transfer.id)
        .bind(transfer.progress_percent)
        .bind(transfer.codes_validated)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let resume_code = CodeService::issue_code_on(
            &mut tx,
            &NewCode {
                target: CodeTarget::Transfer(transfer.id),
                code_type: CodeType::PauseResume,
                code_context: Some("pause checkpoint".to_string()),
                pause_percent: Some(transfer.progress_percent),
                delivery_method: request.delivery_method,
            },
            self.codes.validity_hours(),
        )
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "paused",
            &format!("Transfer paused at {}%", transfer.progress_percent),
            json!({
                "pause_percent": transfer.progress_percent,
                "pause_codes_validated": transfer.codes_validated,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            transfer_id = %updated.id,
            pause_percent = transfer.progress_percent,
            "Transfer paused"
        );

        self.codes.deliver(&resume_code).await;

        Ok((updated, resume_code))
    }

    /// Replace expired codes so a stalled transfer can keep advancing.
    ///
    /// Expired codes are never revived; replacements are fresh codes with
    /// new sequence slots. On a paused transfer with no usable resume code
    /// this issues a new pause-resume code at the frozen checkpoint.
    /// Otherwise it tops the remaining tranches back up with transfer-bound
    /// initial codes. Refused when every required code is still usable.
    pub async fn reissue_codes(
        &self,
        transfer_id: Uuid,
        request: ReissueCodesRequest,
    ) -> Result<(Transfer, Vec<ValidationCode>), TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if !transfer.status.can_advance() {
            return Err(TransferError::InvalidStateTransition {
                action: "reissue codes for",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }

        let mut issued: Vec<ValidationCode> = Vec::new();

        if transfer.is_paused {
            let usable = CodeService::usable_resume_count_on(
                &mut tx,
                transfer.id,
                transfer.pause_percent,
            )
            .await?;
            if usable > 0 {
                return Err(TransferError::InvalidStateTransition {
                    action: "reissue codes for",
                    detail: "a usable resume code already exists".to_string(),
                });
            }

            issued.push(
                CodeService::issue_code_on(
                    &mut tx,
                    &NewCode {
                        target: CodeTarget::Transfer(transfer.id),
                        code_type: CodeType::PauseResume,
                        code_context: Some("reissued resume code".to_string()),
                        pause_percent: transfer.pause_percent,
                        delivery_method: request.delivery_method,
                    },
                    self.codes.validity_hours(),
                )
                .await?,
            );
        } else {
            let pending =
                CodeService::pending_initial_count_on(&mut tx, transfer.id, transfer.loan_id)
                    .await?;
            let remaining = (transfer.required_codes - transfer.codes_validated) as i64;
            let missing = remaining - pending;
            if missing <= 0 {
                return Err(TransferError::InvalidStateTransition {
                    action: "reissue codes for",
                    detail: "all required codes are still usable".to_string(),
                });
            }

            for _ in 0..missing {
                issued.push(
                    CodeService::issue_code_on(
                        &mut tx,
                        &NewCode {
                            target: CodeTarget::Transfer(transfer.id),
                            code_type: CodeType::Initial,
                            code_context: Some("reissued".to_string()),
                            pause_percent: None,
                            delivery_method: request.delivery_method,
                        },
                        self.codes.validity_hours(),
                    )
                    .await?,
                );
            }
        }

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "codes_reissued",
            &format!("{} replacement code(s) issued", issued.len()),
            json!({
                "count": issued.len(),
                "paused": transfer.is_paused,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            count = issued.len(),
            "Replacement validation codes issued"
        );

        for code in &issued {
            self.codes.deliver(code).await;
        }

        Ok((transfer, issued))
    }

    /// Admin sign-off. Sets `approved_at` exactly once; the transfer remains
    /// advanceable and completion is still driven by the final code.
    pub async fn approve(&self, transfer_id: Uuid) -> Result<Transfer, TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if transfer.approved_at.is_some() {
            return Err(TransferError::InvalidStateTransition {
                action: "approve",
                detail: "transfer is already approved".to_string(),
            });
        }
        if !matches!(
            transfer.status,
            TransferStatus::Pending | TransferStatus::InProgress
        ) {
            return Err(TransferError::InvalidStateTransition {
                action: "approve",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }

        let updated = sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers
            SET status = $2, approved_at = $3, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(transfer.id)
        .bind(TransferStatus::Approved)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "approved",
            "Transfer approved by administrator",
            json!({}),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(transfer_id = %updated.id, "Transfer approved");
        Ok(updated)
    }

    /// Halt a transfer indefinitely pending investigation. Unlike a pause
    /// checkpoint, suspension is only reversible by an explicit reinstate.
    pub async fn suspend(&self, transfer_id: Uuid) -> Result<Transfer, TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if transfer.status.is_terminal() || transfer.status == TransferStatus::Suspended {
            return Err(TransferError::InvalidStateTransition {
                action: "suspend",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }

        // suspended_at is set once and kept across reinstate/re-suspend
        let updated = sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers
            SET status = $2, suspended_at = COALESCE(suspended_at, $3), updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(transfer.id)
        .bind(TransferStatus::Suspended)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "suspended",
            "Transfer suspended by administrator",
            json!({}),
        )
        .await?;

        tx.commit().await?;

        tracing::warn!(transfer_id = %updated.id, "Transfer suspended");
        Ok(updated)
    }

    /// Lift a suspension, returning the transfer to in-progress.
    pub async fn reinstate(&self, transfer_id: Uuid) -> Result<Transfer, TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if transfer.status != TransferStatus::Suspended {
            return Err(TransferError::InvalidStateTransition {
                action: "reinstate",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }

        let updated = sqlx::query_as::<_, Transfer>(
            "UPDATE transfers SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(transfer.id)
        .bind(TransferStatus::InProgress)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "reinstated",
            "Suspension lifted, transfer back in progress",
            json!({}),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(transfer_id = %updated.id, "Transfer reinstated");
        Ok(updated)
    }

    /// Reject a transfer. Terminal; no funds are considered moved.
    pub async fn reject(
        &self,
        transfer_id: Uuid,
        request: RejectTransferRequest,
    ) -> Result<Transfer, TransferError> {
        let mut tx = self.db_pool.begin().await?;

        let transfer = Self::lock_transfer(&mut tx, transfer_id).await?;
        if transfer.status.is_terminal() {
            return Err(TransferError::InvalidStateTransition {
                action: "reject",
                detail: format!("status is {}", transfer.status.as_str()),
            });
        }

        let updated = sqlx::query_as::<_, Transfer>(
            "UPDATE transfers SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(transfer.id)
        .bind(TransferStatus::Rejected)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "rejected",
            "Transfer rejected by administrator",
            json!({ "reason": request.reason }),
        )
        .await?;

        tx.commit().await?;

        tracing::warn!(transfer_id = %updated.id, "Transfer rejected");
        Ok(updated)
    }

    /// Get a transfer by ID.
    pub async fn get_transfer(&self, id: &Uuid) -> Result<Option<Transfer>, TransferError> {
        let transfer = sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(transfer)
    }

    /// List transfers with filtering and pagination.
    pub async fn list_transfers(
        &self,
        query: ListTransfersQuery,
    ) -> Result<Vec<Transfer>, TransferError> {
        let (limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut builder: sqlx::QueryBuilder<Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM transfers WHERE 1=1");

        if let Some(user_id) = query.user_id {
            builder.push(" AND user_id = ");
            builder.push_bind(user_id);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let transfers = builder
            .build_query_as::<Transfer>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(transfers)
    }

    // ===== Private helpers =====

    async fn resume_with_code(
        &self,
        mut tx: Transaction<'_, Postgres>,
        transfer: Transfer,
        code: ValidationCode,
        submitted: &str,
    ) -> Result<Transfer, TransferError> {
        let matches_checkpoint =
            code.code_type == CodeType::PauseResume && code.pause_percent == transfer.pause_percent;
        if !matches_checkpoint {
            return Err(TransferError::InvalidStateTransition {
                action: "advance",
                detail: format!(
                    "transfer is paused at {}%, a matching resume code is required",
                    transfer.pause_percent.unwrap_or(0)
                ),
            });
        }

        let consumed = CodeService::consume_code_on(&mut tx, submitted).await?;

        // Resuming restores advancement from the frozen point; the resume
        // code does not clear a tranche.
        let updated = sqlx::query_as::<_, Transfer>(
            "UPDATE transfers SET is_paused = false, updated_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(transfer.id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        EventLog::record_on(
            &mut tx,
            transfer.id,
            "resumed",
            &format!(
                "Pause at {}% lifted, advancement resumed",
                transfer.pause_percent.unwrap_or(0)
            ),
            json!({
                "pause_percent": transfer.pause_percent,
                "resume_code_sequence": consumed.sequence,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(transfer_id = %updated.id, "Transfer resumed from pause checkpoint");
        Ok(updated)
    }

    async fn lock_transfer(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Transfer, TransferError> {
        sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(TransferError::NotFound)
    }
}
