//! Transfer event log
//!
//! Append-only audit trail of transfer state transitions, kept for display
//! and dispute resolution. There are no update or delete paths.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// A single audit entry for a transfer
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct TransferEvent {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub event_type: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Event log service
#[derive(Clone)]
pub struct EventLog {
    db_pool: PgPool,
}

impl EventLog {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Append an event on an existing connection/transaction, so the entry
    /// commits atomically with the state change it describes.
    pub async fn record_on(
        conn: &mut PgConnection,
        transfer_id: Uuid,
        event_type: &str,
        message: &str,
        metadata: serde_json::Value,
    ) -> Result<TransferEvent, sqlx::Error> {
        sqlx::query_as::<_, TransferEvent>(
            r#"
            INSERT INTO transfer_events (id, transfer_id, event_type, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(transfer_id)
        .bind(event_type)
        .bind(message)
        .bind(metadata)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
    }

    /// Events for a transfer, oldest first.
    pub async fn list_for_transfer(&self, transfer_id: Uuid) -> Result<Vec<TransferEvent>> {
        let events = sqlx::query_as::<_, TransferEvent>(
            "SELECT * FROM transfer_events WHERE transfer_id = $1 ORDER BY created_at",
        )
        .bind(transfer_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(events)
    }
}
