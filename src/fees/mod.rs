//! Fee ledger
//!
//! Records ad hoc and workflow-generated fees against a user and tracks
//! paid/unpaid state. Fees are informational for billing and display; they
//! never gate transfer advancement.

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// Fee ledger errors
#[derive(Error, Debug)]
pub enum FeeError {
    #[error("Fee not found")]
    NotFound,

    #[error("Fee is already marked as paid")]
    AlreadyPaid,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A fee assessed against a user
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Fee {
    pub id: Uuid,
    pub user_id: Uuid,
    pub fee_type: String,
    pub reason: String,
    pub amount: i64,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    /// Notification/message explaining the fee to the user, when one exists
    pub related_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Request to record an ad hoc fee (admin action)
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeeRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub fee_type: String,
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub related_message_id: Option<Uuid>,
}

/// Query parameters for listing fees
#[derive(Debug, Deserialize)]
pub struct ListFeesQuery {
    pub user_id: Uuid,
    pub is_paid: Option<bool>,
}

/// Fee ledger service
#[derive(Clone)]
pub struct FeeService {
    db_pool: PgPool,
}

impl FeeService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Record a fee on an existing connection/transaction.
    pub async fn add_fee_on(
        conn: &mut PgConnection,
        user_id: Uuid,
        fee_type: &str,
        reason: &str,
        amount: i64,
        related_message_id: Option<Uuid>,
    ) -> Result<Fee, sqlx::Error> {
        sqlx::query_as::<_, Fee>(
            r#"
            INSERT INTO fees (id, user_id, fee_type, reason, amount, is_paid, related_message_id, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(fee_type)
        .bind(reason)
        .bind(amount)
        .bind(related_message_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
    }

    /// Record a fee (unpaid).
    pub async fn add_fee(&self, request: CreateFeeRequest) -> Result<Fee, FeeError> {
        let mut conn = self.db_pool.acquire().await?;
        let fee = Self::add_fee_on(
            &mut conn,
            request.user_id,
            &request.fee_type,
            &request.reason,
            request.amount,
            request.related_message_id,
        )
        .await?;

        tracing::info!(fee_id = %fee.id, user_id = %fee.user_id, amount = fee.amount, "Fee recorded");
        Ok(fee)
    }

    /// Mark a fee paid, exactly once. The conditional update guarantees a
    /// second payment attempt fails rather than overwriting `paid_at`.
    pub async fn mark_paid(&self, fee_id: Uuid) -> Result<Fee, FeeError> {
        let updated = sqlx::query_as::<_, Fee>(
            r#"
            UPDATE fees
            SET is_paid = true, paid_at = $2
            WHERE id = $1 AND is_paid = false
            RETURNING *
            "#,
        )
        .bind(fee_id)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        match updated {
            Some(fee) => {
                tracing::info!(fee_id = %fee.id, "Fee marked paid");
                Ok(fee)
            }
            None => {
                let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM fees WHERE id = $1")
                    .bind(fee_id)
                    .fetch_optional(&self.db_pool)
                    .await?;

                match exists {
                    Some(_) => Err(FeeError::AlreadyPaid),
                    None => Err(FeeError::NotFound),
                }
            }
        }
    }

    /// Fees for a user, newest first, optionally filtered by paid state.
    pub async fn list_fees(&self, query: ListFeesQuery) -> Result<Vec<Fee>, FeeError> {
        let mut builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM fees WHERE user_id = ");
        builder.push_bind(query.user_id);

        if let Some(is_paid) = query.is_paid {
            builder.push(" AND is_paid = ");
            builder.push_bind(is_paid);
        }

        builder.push(" ORDER BY created_at DESC");

        let fees = builder
            .build_query_as::<Fee>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(fees)
    }
}
