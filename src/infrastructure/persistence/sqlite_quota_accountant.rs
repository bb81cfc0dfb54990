use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::application::ports::{QuotaAccountant, QuotaError};
use crate::domain::entities::QuotaLedgerEntry;
use crate::domain::value_objects::TenantId;

/// SQLite-backed quota accountant.
///
/// Every operation is a single UPDATE whose arithmetic and limit check
/// happen inside the statement, so concurrent reservations can never
/// interleave a stale read with a write.
pub struct SqliteQuotaAccountant {
    pool: SqlitePool,
    default_limit_bytes: u64,
}

impl SqliteQuotaAccountant {
    pub fn new(pool: SqlitePool, default_limit_bytes: u64) -> Self {
        Self {
            pool,
            default_limit_bytes,
        }
    }
}

#[async_trait]
impl QuotaAccountant for SqliteQuotaAccountant {
    async fn reserve(&self, tenant_id: &TenantId, bytes: u64) -> Result<(), QuotaError> {
        // First use creates the ledger row with the configured default limit
        sqlx::query(
            r#"
            INSERT INTO quota_ledger (tenant_id, bytes_consumed, bytes_reserved, quota_limit)
            VALUES (?1, 0, 0, ?2)
            ON CONFLICT(tenant_id) DO NOTHING
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(self.default_limit_bytes as i64)
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE quota_ledger
            SET bytes_reserved = bytes_reserved + ?2
            WHERE tenant_id = ?1
              AND bytes_consumed + bytes_reserved + ?2 <= quota_limit
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(bytes as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QuotaError::Exceeded {
                tenant_id: tenant_id.to_string(),
                requested: bytes,
            });
        }

        Ok(())
    }

    async fn release(&self, tenant_id: &TenantId, bytes: u64) -> Result<(), QuotaError> {
        // Saturating: releasing more than is reserved clamps at zero so a
        // duplicate compensation cannot drive the column negative
        sqlx::query(
            r#"
            UPDATE quota_ledger
            SET bytes_reserved = MAX(bytes_reserved - ?2, 0)
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(bytes as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn commit(
        &self,
        tenant_id: &TenantId,
        reserved: u64,
        charged: u64,
    ) -> Result<(), QuotaError> {
        sqlx::query(
            r#"
            UPDATE quota_ledger
            SET bytes_reserved = MAX(bytes_reserved - ?2, 0),
                bytes_consumed = bytes_consumed + ?3
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(reserved as i64)
        .bind(charged as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn credit(&self, tenant_id: &TenantId, bytes: u64) -> Result<(), QuotaError> {
        sqlx::query(
            r#"
            UPDATE quota_ledger
            SET bytes_consumed = MAX(bytes_consumed - ?2, 0)
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(bytes as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entry(&self, tenant_id: &TenantId) -> Result<Option<QuotaLedgerEntry>, QuotaError> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT bytes_consumed, bytes_reserved, quota_limit
            FROM quota_ledger WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(consumed, reserved, limit)| {
            QuotaLedgerEntry::reconstruct(
                *tenant_id,
                consumed as u64,
                reserved as u64,
                limit as u64,
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connect;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn test_accountant(limit: u64) -> (TempDir, SqliteQuotaAccountant) {
        let dir = TempDir::new().unwrap();
        let pool = connect(&dir.path().join("ledger.db")).await.unwrap();
        (dir, SqliteQuotaAccountant::new(pool, limit))
    }

    #[tokio::test]
    async fn test_reserve_within_limit() {
        let (_dir, quota) = test_accountant(1000).await;
        let tenant = TenantId::new(Uuid::new_v4());

        quota.reserve(&tenant, 600).await.unwrap();
        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_reserved(), 600);
        assert_eq!(entry.bytes_consumed(), 0);
    }

    #[tokio::test]
    async fn test_reserve_over_limit_fails_cleanly() {
        let (_dir, quota) = test_accountant(1000).await;
        let tenant = TenantId::new(Uuid::new_v4());

        quota.reserve(&tenant, 800).await.unwrap();
        let err = quota.reserve(&tenant, 300).await.unwrap_err();
        assert!(matches!(err, QuotaError::Exceeded { .. }));

        // Failed reservation must not move the ledger
        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_reserved(), 800);
    }

    #[tokio::test]
    async fn test_commit_converts_reservation_with_corrected_size() {
        let (_dir, quota) = test_accountant(10_000).await;
        let tenant = TenantId::new(Uuid::new_v4());

        // Declared 1000, actual 950: the 50-byte delta returns to headroom
        quota.reserve(&tenant, 1000).await.unwrap();
        quota.commit(&tenant, 1000, 950).await.unwrap();

        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_reserved(), 0);
        assert_eq!(entry.bytes_consumed(), 950);
    }

    #[tokio::test]
    async fn test_release_returns_exact_reservation() {
        let (_dir, quota) = test_accountant(1000).await;
        let tenant = TenantId::new(Uuid::new_v4());

        quota.reserve(&tenant, 400).await.unwrap();
        quota.release(&tenant, 400).await.unwrap();

        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_reserved(), 0);
        // Full headroom is back
        quota.reserve(&tenant, 1000).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_saturates_at_zero() {
        let (_dir, quota) = test_accountant(1000).await;
        let tenant = TenantId::new(Uuid::new_v4());

        quota.reserve(&tenant, 100).await.unwrap();
        quota.release(&tenant, 100).await.unwrap();
        quota.release(&tenant, 100).await.unwrap();

        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_reserved(), 0);
    }

    #[tokio::test]
    async fn test_credit_returns_consumed_bytes() {
        let (_dir, quota) = test_accountant(1000).await;
        let tenant = TenantId::new(Uuid::new_v4());

        quota.reserve(&tenant, 500).await.unwrap();
        quota.commit(&tenant, 500, 500).await.unwrap();
        quota.credit(&tenant, 500).await.unwrap();

        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_consumed(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversubscribe() {
        let (_dir, quota) = test_accountant(1000).await;
        let quota = std::sync::Arc::new(quota);
        let tenant = TenantId::new(Uuid::new_v4());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let quota = std::sync::Arc::clone(&quota);
            handles.push(tokio::spawn(
                async move { quota.reserve(&tenant, 300).await },
            ));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }

        // 1000-byte limit admits exactly three 300-byte reservations
        assert_eq!(granted, 3);
        let entry = quota.entry(&tenant).await.unwrap().unwrap();
        assert_eq!(entry.bytes_reserved(), 900);
    }
}
