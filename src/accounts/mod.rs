//! External account reference data
//!
//! Destination accounts for transfers. Plain CRUD with light shape
//! validation; directory-level IBAN/BIC verification is an external
//! collaborator's job.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// A destination account owned by a user
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ExternalAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bank_name: String,
    pub iban: String,
    pub bic: String,
    pub account_label: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to register a destination account
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub bank_name: String,
    #[validate(length(min = 15, max = 34))]
    pub iban: String,
    #[validate(length(min = 8, max = 11))]
    pub bic: String,
    #[validate(length(min = 1, max = 64))]
    pub account_label: String,
    #[serde(default)]
    pub is_default: bool,
}

/// External account service
#[derive(Clone)]
pub struct AccountService {
    db_pool: PgPool,
}

impl AccountService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Register an account. Setting a new default clears the previous one in
    /// the same transaction.
    pub async fn create_account(&self, request: CreateAccountRequest) -> Result<ExternalAccount> {
        let mut tx = self.db_pool.begin().await?;

        if request.is_default {
            sqlx::query("UPDATE external_accounts SET is_default = false WHERE user_id = $1")
                .bind(request.user_id)
                .execute(&mut *tx)
                .await?;
        }

        let account = sqlx::query_as::<_, ExternalAccount>(
            r#"
            INSERT INTO external_accounts (id, user_id, bank_name, iban, bic, account_label, is_default, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.bank_name)
        .bind(&request.iban)
        .bind(&request.bic)
        .bind(&request.account_label)
        .bind(request.is_default)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert external account")?;

        tx.commit().await?;

        Ok(account)
    }

    /// Accounts for a user, default first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ExternalAccount>> {
        let accounts = sqlx::query_as::<_, ExternalAccount>(
            "SELECT * FROM external_accounts WHERE user_id = $1 ORDER BY is_default DESC, created_at",
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(accounts)
    }

    /// Look up a single account.
    pub async fn get_account(&self, id: &Uuid) -> Result<Option<ExternalAccount>> {
        let account =
            sqlx::query_as::<_, ExternalAccount>("SELECT * FROM external_accounts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(account)
    }
}
