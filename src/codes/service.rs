//! Validation code issuer
//!
//! Mints unique, time-bounded, single-use codes tied to a transfer or a
//! loan, with strictly monotonic per-target sequence numbers, and performs
//! atomic consumption. Sequencing is serialized through the database: the
//! sequence slot is computed in the INSERT itself and the partial unique
//! indexes reject concurrent duplicates, which are retried.

use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::codes::{CodeError, CodeTarget, CodeType, DeliveryMethod, ValidationCode};
use crate::notify::Notifier;

/// Length of the generated code token
const CODE_LENGTH: usize = 10;

/// Charset for code tokens. Excludes 0/O/1/I/L to keep codes readable when
/// typed back from an email or SMS.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Attempts before issuance gives up on a unique token/sequence slot
const MAX_ISSUE_ATTEMPTS: usize = 4;

/// Parameters for issuing a single code
#[derive(Debug, Clone)]
pub struct NewCode {
    pub target: CodeTarget,
    pub code_type: CodeType,
    pub code_context: Option<String>,
    pub pause_percent: Option<i32>,
    pub delivery_method: DeliveryMethod,
}

/// Validation code service. Issuance and consumption always run on the
/// caller's connection so they commit with the state change that needs them;
/// this type carries the policy (validity window) and the delivery channel.
#[derive(Clone)]
pub struct CodeService {
    validity_hours: i64,
    notifier: Notifier,
}

impl CodeService {
    pub fn new(validity_hours: i64, notifier: Notifier) -> Self {
        Self {
            validity_hours,
            notifier,
        }
    }

    /// Configured validity window, in hours
    pub fn validity_hours(&self) -> i64 {
        self.validity_hours
    }

    /// Hand a code to the out-of-band delivery collaborator.
    /// Called after the issuing transaction has committed.
    pub async fn deliver(&self, code: &ValidationCode) {
        self.notifier.deliver_code(code).await;
    }

    /// Issue a code on an existing connection/transaction.
    ///
    /// The sequence number is assigned inside the INSERT as one greater than
    /// the current per-target maximum. A collision on the code token or the
    /// sequence slot (concurrent issuer) is retried with fresh values; if the
    /// slot cannot be obtained after bounded retries the operation fails with
    /// [`CodeError::SequenceViolation`].
    pub async fn issue_code_on(
        conn: &mut PgConnection,
        new_code: &NewCode,
        validity_hours: i64,
    ) -> Result<ValidationCode, CodeError> {
        let transfer_id = new_code.target.transfer_id();
        let loan_id = new_code.target.loan_id();
        let now = Utc::now();
        let expires_at = now + Duration::hours(validity_hours);

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = generate_token();

            let inserted = sqlx::query_as::<_, ValidationCode>(
                r#"
                INSERT INTO transfer_validation_codes (
                    id, code, transfer_id, loan_id, code_type, code_context,
                    sequence, pause_percent, delivery_method, issued_at, expires_at
                )
                SELECT $1, $2, $3, $4, $5, $6,
                       COALESCE(MAX(sequence), 0) + 1,
                       $7, $8, $9, $10
                FROM transfer_validation_codes
                WHERE transfer_id = $3 OR loan_id = $4
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&token)
            .bind(transfer_id)
            .bind(loan_id)
            .bind(new_code.code_type)
            .bind(&new_code.code_context)
            .bind(new_code.pause_percent)
            .bind(new_code.delivery_method)
            .bind(now)
            .bind(expires_at)
            .fetch_one(&mut *conn)
            .await;

            match inserted {
                Ok(code) => {
                    tracing::info!(
                        code_id = %code.id,
                        target = %new_code.target,
                        sequence = code.sequence,
                        code_type = ?code.code_type,
                        "Validation code issued"
                    );
                    return Ok(code);
                }
                Err(sqlx::Error::Database(db)) if is_unique_violation(db.constraint()) => {
                    // Token or sequence collision, retry with fresh values
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let target = new_code.target.to_string();
        tracing::error!(target = %target, "Exhausted retries obtaining a code sequence slot");
        Err(CodeError::SequenceViolation { target })
    }

    /// Bulk pre-generation at contract confirmation: `count` initial codes
    /// bound to the loan, with strictly increasing sequence.
    pub async fn pre_generate_on(
        conn: &mut PgConnection,
        loan_id: Uuid,
        count: i32,
        validity_hours: i64,
        delivery_method: DeliveryMethod,
    ) -> Result<Vec<ValidationCode>, CodeError> {
        let mut codes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let new_code = NewCode {
                target: CodeTarget::Loan(loan_id),
                code_type: CodeType::Initial,
                code_context: Some("pre-generated".to_string()),
                pause_percent: None,
                delivery_method,
            };
            codes.push(Self::issue_code_on(conn, &new_code, validity_hours).await?);
        }
        Ok(codes)
    }

    /// Look up a code by its token.
    pub async fn find_by_code_on(
        conn: &mut PgConnection,
        submitted: &str,
    ) -> Result<Option<ValidationCode>, CodeError> {
        let code = sqlx::query_as::<_, ValidationCode>(
            "SELECT * FROM transfer_validation_codes WHERE code = $1",
        )
        .bind(submitted)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(code)
    }

    /// Consume a code exactly once.
    ///
    /// Classification (not found / already used / expired) never mutates
    /// state. The happy path sets `consumed_at` with a single conditional
    /// update, so of two racing consumers exactly one wins and the other
    /// observes [`CodeError::AlreadyConsumed`].
    pub async fn consume_code_on(
        conn: &mut PgConnection,
        submitted: &str,
    ) -> Result<ValidationCode, CodeError> {
        let existing = Self::find_by_code_on(conn, submitted)
            .await?
            .ok_or(CodeError::NotFound)?;

        if existing.consumed_at.is_some() {
            return Err(CodeError::AlreadyConsumed);
        }
        let now = Utc::now();
        if now > existing.expires_at {
            return Err(CodeError::Expired);
        }

        let consumed = sqlx::query_as::<_, ValidationCode>(
            r#"
            UPDATE transfer_validation_codes
            SET consumed_at = $2
            WHERE code = $1 AND consumed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(submitted)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
        // Lost a race between classification and update
        .ok_or(CodeError::AlreadyConsumed)?;

        tracing::info!(code_id = %consumed.id, sequence = consumed.sequence, "Validation code consumed");
        Ok(consumed)
    }

    /// Lowest unconsumed, unexpired initial-code sequence for a transfer and
    /// its loan. This is the sequence the next submitted code must carry.
    pub async fn next_pending_sequence_on(
        conn: &mut PgConnection,
        transfer_id: Uuid,
        loan_id: Option<Uuid>,
    ) -> Result<Option<i32>, CodeError> {
        let row: (Option<i32>,) = sqlx::query_as(
            r#"
            SELECT MIN(sequence)
            FROM transfer_validation_codes
            WHERE code_type = 'initial'
              AND consumed_at IS NULL
              AND expires_at > $3
              AND (transfer_id = $1 OR (transfer_id IS NULL AND loan_id = $2))
            "#,
        )
        .bind(transfer_id)
        .bind(loan_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.0)
    }

    /// Unconsumed, unexpired initial codes a transfer can still submit,
    /// counting both transfer-bound and not-yet-bound loan codes.
    pub async fn pending_initial_count_on(
        conn: &mut PgConnection,
        transfer_id: Uuid,
        loan_id: Option<Uuid>,
    ) -> Result<i64, CodeError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM transfer_validation_codes
            WHERE code_type = 'initial'
              AND consumed_at IS NULL
              AND expires_at > $3
              AND (transfer_id = $1 OR (transfer_id IS NULL AND loan_id = $2))
            "#,
        )
        .bind(transfer_id)
        .bind(loan_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.0)
    }

    /// Usable resume codes for a transfer's pause checkpoint.
    pub async fn usable_resume_count_on(
        conn: &mut PgConnection,
        transfer_id: Uuid,
        pause_percent: Option<i32>,
    ) -> Result<i64, CodeError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM transfer_validation_codes
            WHERE transfer_id = $1
              AND code_type = 'pause_resume'
              AND pause_percent IS NOT DISTINCT FROM $2
              AND consumed_at IS NULL
              AND expires_at > $3
            "#,
        )
        .bind(transfer_id)
        .bind(pause_percent)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.0)
    }

    /// Number of usable pre-generated codes still attached to a loan.
    pub async fn available_for_loan_on(
        conn: &mut PgConnection,
        loan_id: Uuid,
    ) -> Result<i64, CodeError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM transfer_validation_codes
            WHERE loan_id = $1
              AND transfer_id IS NULL
              AND consumed_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(loan_id)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.0)
    }
}

/// Generate a code token from the OS-seeded CSPRNG.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

fn is_unique_violation(constraint: Option<&str>) -> bool {
    matches!(
        constraint,
        Some(name) if name.contains("code_key") || name.contains("sequence")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), CODE_LENGTH);
        assert!(token.bytes().all(|b| CODE_CHARSET.contains(&b)));
    }

    #[test]
    fn test_generate_token_avoids_ambiguous_chars() {
        for _ in 0..100 {
            let token = generate_token();
            assert!(!token.contains('0'));
            assert!(!token.contains('O'));
            assert!(!token.contains('1'));
            assert!(!token.contains('I'));
            assert!(!token.contains('L'));
        }
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(is_unique_violation(Some(
            "transfer_validation_codes_code_key"
        )));
        assert!(is_unique_violation(Some("uniq_codes_loan_sequence")));
        assert!(is_unique_violation(Some("uniq_codes_transfer_sequence")));
        assert!(!is_unique_violation(Some("transfers_pkey")));
        assert!(!is_unique_violation(None));
    }
}
