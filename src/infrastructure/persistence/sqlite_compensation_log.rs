use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use crate::application::ports::{CompensationLog, CompensationLogError, IngestIntent, IntentId};
use crate::domain::value_objects::TenantId;

/// SQLite-backed write-ahead compensation log.
pub struct SqliteCompensationLog {
    pool: SqlitePool,
}

impl SqliteCompensationLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompensationLog for SqliteCompensationLog {
    async fn record(
        &self,
        tenant_id: &TenantId,
        reserved_bytes: u64,
    ) -> Result<IntentId, CompensationLogError> {
        let id = IntentId::generate();

        sqlx::query(
            r#"
            INSERT INTO compensation_log (id, tenant_id, reserved_bytes, staged_path, created_at)
            VALUES (?1, ?2, ?3, NULL, ?4)
            "#,
        )
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .bind(reserved_bytes as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn mark_staged(&self, id: &IntentId, path: &Path) -> Result<(), CompensationLogError> {
        sqlx::query("UPDATE compensation_log SET staged_path = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(path.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn clear(&self, id: &IntentId) -> Result<(), CompensationLogError> {
        sqlx::query("DELETE FROM compensation_log WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IngestIntent>, CompensationLogError> {
        let rows: Vec<(String, String, i64, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, reserved_bytes, staged_path, created_at
            FROM compensation_log
            WHERE created_at < ?1
            ORDER BY created_at
            LIMIT ?2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut intents = Vec::with_capacity(rows.len());
        for (id, tenant_id, reserved_bytes, staged_path, created_at) in rows {
            // Unparseable rows are skipped rather than wedging the reaper;
            // they stay in the table and keep showing up in diagnostics
            let (Ok(id), Ok(tenant_id)) = (
                uuid::Uuid::parse_str(&id),
                TenantId::from_string(&tenant_id),
            ) else {
                tracing::error!(row_id = %id, "malformed compensation log row");
                continue;
            };

            intents.push(IngestIntent {
                id: IntentId::new(id),
                tenant_id,
                reserved_bytes: reserved_bytes as u64,
                staged_path: staged_path.map(PathBuf::from),
                created_at,
            });
        }

        Ok(intents)
    }
}
