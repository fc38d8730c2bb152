use anima_core::{DecisionRecord, SignalEnvelope, StateBlob, StateStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

/// One row of the decision journal, without the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub request_id: Uuid,
    pub tier: String,
    pub action: String,
    pub confidence: f32,
    pub incoherent: bool,
    pub degraded: bool,
    pub created_at: i64,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS engine_state (
                instance_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                state_blob BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create engine_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                request_id TEXT PRIMARY KEY,
                tier TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                incoherent INTEGER NOT NULL,
                degraded INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create decisions table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_created ON decisions(created_at)")
            .execute(&self.pool)
            .await
            .context("Failed to create decisions created_at index")?;

        // Signals that arrived after their request was decided
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS late_signals (
                id TEXT PRIMARY KEY,
                request_id TEXT,
                provider TEXT NOT NULL,
                category TEXT NOT NULL,
                action TEXT NOT NULL,
                envelope_json TEXT NOT NULL,
                received_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create late_signals table")?;

        Ok(())
    }

    // =========================================================================
    // Decision journal
    // =========================================================================

    pub async fn record_decision(&self, record: &DecisionRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize decision record")?;
        let outcome = &record.outcome;

        sqlx::query(
            "INSERT INTO decisions (request_id, tier, action, confidence, incoherent, degraded, record_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(request_id) DO UPDATE SET record_json = excluded.record_json",
        )
        .bind(outcome.request_id.to_string())
        .bind(outcome.tier.as_str())
        .bind(outcome.action().as_str())
        .bind(outcome.confidence)
        .bind(outcome.incoherent)
        .bind(outcome.is_degraded())
        .bind(&json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to record decision")?;

        tracing::trace!(request_id = %outcome.request_id, "Decision journaled");
        Ok(())
    }

    pub async fn load_decision(&self, request_id: Uuid) -> Result<Option<DecisionRecord>> {
        let row = sqlx::query("SELECT record_json FROM decisions WHERE request_id = ?")
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query decisions")?;

        match row {
            Some(row) => {
                let json: String = row.get("record_json");
                let record =
                    serde_json::from_str(&json).context("Failed to deserialize decision record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Most recent decisions first.
    pub async fn recent_decisions(&self, limit: i64) -> Result<Vec<DecisionSummary>> {
        let rows = sqlx::query(
            "SELECT request_id, tier, action, confidence, incoherent, degraded, created_at \
             FROM decisions ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recent decisions")?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.get("request_id");
                Ok(DecisionSummary {
                    request_id: Uuid::parse_str(&id).context("Invalid request id in journal")?,
                    tier: row.get("tier"),
                    action: row.get("action"),
                    confidence: row.get("confidence"),
                    incoherent: row.get("incoherent"),
                    degraded: row.get("degraded"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    pub async fn record_late_signal(
        &self,
        envelope: &SignalEnvelope,
        request_id: Option<Uuid>,
    ) -> Result<()> {
        let json = serde_json::to_string(envelope).context("Failed to serialize late signal")?;
        sqlx::query(
            "INSERT OR REPLACE INTO late_signals (id, request_id, provider, category, action, envelope_json, received_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(envelope.id.to_string())
        .bind(request_id.map(|id| id.to_string()))
        .bind(&envelope.provider)
        .bind(envelope.category.as_str())
        .bind(envelope.action().as_str())
        .bind(&json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to record late signal")?;
        Ok(())
    }

    pub async fn late_signals_for(&self, request_id: Uuid) -> Result<Vec<SignalEnvelope>> {
        let rows = sqlx::query(
            "SELECT envelope_json FROM late_signals WHERE request_id = ? ORDER BY received_at ASC",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query late signals")?;

        rows.into_iter()
            .map(|row| {
                let json: String = row.get("envelope_json");
                serde_json::from_str(&json).context("Failed to deserialize late signal")
            })
            .collect()
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn save(&self, instance_id: &str, blob: &StateBlob) -> Result<()> {
        sqlx::query(
            "INSERT INTO engine_state (instance_id, version, state_blob, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(instance_id) DO UPDATE SET version = excluded.version, \
             state_blob = excluded.state_blob, updated_at = excluded.updated_at",
        )
        .bind(instance_id)
        .bind(i64::from(blob.version))
        .bind(&blob.bytes)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to save engine state")?;

        tracing::debug!(instance = instance_id, "Engine state saved");
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<Option<StateBlob>> {
        let row = sqlx::query("SELECT version, state_blob FROM engine_state WHERE instance_id = ?")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query engine_state")?;

        match row {
            Some(row) => {
                let version: i64 = row.get("version");
                let bytes: Vec<u8> = row.get("state_blob");
                let version = u32::try_from(version).context("Stored blob version out of range")?;
                Ok(Some(StateBlob::new(version, bytes)))
            }
            None => Ok(None),
        }
    }
}
