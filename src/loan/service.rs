//! Loan service layer - review lifecycle and the funds-availability gate
//!
//! Contract confirmation is the only action that opens the gate towards
//! disbursement, and it also pre-generates the validation codes a later
//! transfer will consume. Transfer progress never mutates the gate.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::codes::{CodeError, CodeService, DeliveryMethod, ValidationCode};
use crate::loan::{
    ContractStatus, CreateLoanRequest, DeleteLoanRequest, FundsAvailability, ListLoansQuery, Loan,
    LoanStatus,
};
use crate::models::PaginationParams;

/// Loan domain errors
#[derive(Error, Debug)]
pub enum LoanError {
    #[error("Loan not found")]
    NotFound,

    #[error("Cannot {action} a loan in this state ({detail})")]
    InvalidStatus {
        action: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Code(#[from] CodeError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Loan service
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
    codes: CodeService,
    pregen_count: i32,
}

impl LoanService {
    pub fn new(db_pool: PgPool, codes: CodeService, pregen_count: i32) -> Self {
        Self {
            db_pool,
            codes,
            pregen_count,
        }
    }

    /// Open a loan application.
    pub async fn create_loan(&self, request: CreateLoanRequest) -> Result<Loan, LoanError> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, user_id, loan_type, amount, interest_rate, duration_months,
                status, contract_status, funds_availability, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.loan_type)
        .bind(request.amount)
        .bind(request.interest_rate)
        .bind(request.duration_months)
        .bind(LoanStatus::PendingReview)
        .bind(ContractStatus::None)
        .bind(FundsAvailability::Pending)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(loan_id = %loan.id, user_id = %loan.user_id, amount = loan.amount, "Loan application created");
        Ok(loan)
    }

    /// Admin approval: `pending_review -> approved`.
    pub async fn approve_loan(&self, id: Uuid) -> Result<Loan, LoanError> {
        self.transition_status(id, "approve", LoanStatus::PendingReview, LoanStatus::Approved)
            .await
    }

    /// Admin rejection: `pending_review -> rejected`.
    pub async fn reject_loan(&self, id: Uuid) -> Result<Loan, LoanError> {
        self.transition_status(id, "reject", LoanStatus::PendingReview, LoanStatus::Rejected)
            .await
    }

    /// Produce the contract document reference: contract `none -> generated`.
    /// Requires an approved loan. Document storage itself is external.
    pub async fn generate_contract(&self, id: Uuid) -> Result<Loan, LoanError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = Self::lock_loan(&mut tx, id).await?;
        if loan.status != LoanStatus::Approved {
            return Err(LoanError::InvalidStatus {
                action: "generate a contract for",
                detail: format!("status is {:?}", loan.status),
            });
        }
        if loan.contract_status != ContractStatus::None {
            return Err(LoanError::InvalidStatus {
                action: "generate a contract for",
                detail: format!("contract is {:?}", loan.contract_status),
            });
        }

        let loan = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET contract_status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(ContractStatus::Generated)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %loan.id, "Loan contract generated");
        Ok(loan)
    }

    /// Admin contract confirmation: contract `generated -> signed`, funds
    /// gate `pending -> pending_disbursement`, and bulk pre-generation of
    /// validation codes for the loan - all in one transaction. Code delivery
    /// happens after commit.
    pub async fn confirm_contract(
        &self,
        id: Uuid,
        delivery_method: DeliveryMethod,
    ) -> Result<(Loan, Vec<ValidationCode>), LoanError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = Self::lock_loan(&mut tx, id).await?;
        if loan.contract_status != ContractStatus::Generated {
            return Err(LoanError::InvalidStatus {
                action: "confirm the contract of",
                detail: format!("contract is {:?}", loan.contract_status),
            });
        }
        if loan.funds_availability != FundsAvailability::Pending {
            return Err(LoanError::InvalidStatus {
                action: "confirm the contract of",
                detail: format!("funds availability is {:?}", loan.funds_availability),
            });
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET contract_status = $2, funds_availability = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ContractStatus::Signed)
        .bind(FundsAvailability::PendingDisbursement)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let codes = CodeService::pre_generate_on(
            &mut tx,
            id,
            self.pregen_count,
            self.codes.validity_hours(),
            delivery_method,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            codes = codes.len(),
            "Contract confirmed, validation codes pre-generated"
        );

        for code in &codes {
            self.codes.deliver(code).await;
        }

        Ok((loan, codes))
    }

    /// Admin funds release: gate `pending_disbursement -> available`, loan
    /// becomes `active`. From here transfers referencing the loan may be
    /// created.
    pub async fn release_funds(&self, id: Uuid) -> Result<Loan, LoanError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = Self::lock_loan(&mut tx, id).await?;
        if loan.funds_availability != FundsAvailability::PendingDisbursement {
            return Err(LoanError::InvalidStatus {
                action: "release funds for",
                detail: format!("funds availability is {:?}", loan.funds_availability),
            });
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET funds_availability = $2, status = $3, updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(FundsAvailability::Available)
        .bind(LoanStatus::Active)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %loan.id, "Loan funds released for transfer");
        Ok(loan)
    }

    /// Soft-delete: tombstone the row, keep it for audit.
    pub async fn soft_delete_loan(
        &self,
        id: Uuid,
        request: DeleteLoanRequest,
    ) -> Result<Loan, LoanError> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET deleted_at = $2, deleted_by = $3, deletion_reason = $4, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(request.deleted_by)
        .bind(&request.reason)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(LoanError::NotFound)?;

        tracing::info!(loan_id = %loan.id, deleted_by = %request.deleted_by, "Loan soft-deleted");
        Ok(loan)
    }

    /// Get a loan by ID. Tombstoned loans are not visible.
    pub async fn get_loan(&self, id: &Uuid) -> Result<Option<Loan>, LoanError> {
        let loan =
            sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(loan)
    }

    /// List loans with filtering and pagination, excluding tombstoned rows.
    pub async fn list_loans(&self, query: ListLoansQuery) -> Result<Vec<Loan>, LoanError> {
        let (limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM loans WHERE deleted_at IS NULL");

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

        let loans = builder
            .build_query_as::<Loan>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(loans)
    }

    async fn lock_loan(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<Loan, LoanError> {
        sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LoanError::NotFound)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        action: &'static str,
        from: LoanStatus,
        to: LoanStatus,
    ) -> Result<Loan, LoanError> {
        let mut tx = self.db_pool.begin().await?;

        let loan = Self::lock_loan(&mut tx, id).await?;
        if loan.status != from {
            return Err(LoanError::InvalidStatus {
                action,
                detail: format!("status is {:?}", loan.status),
            });
        }

        let loan = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(to)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %loan.id, status = ?loan.status, "Loan status changed");
        Ok(loan)
    }
}
