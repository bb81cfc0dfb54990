use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::error;

use crate::application::ports::{DetachOutcome, LedgerError, ReferenceLedger};
use crate::domain::entities::{ContentBlob, Reference};
use crate::domain::value_objects::{Fingerprint, OwnerId, TenantId};
use crate::infrastructure::persistence::is_unique_violation;

/// SQLite-backed reference ledger.
///
/// Every mutation runs inside a single transaction so a reference row and
/// its count change commit or roll back together. With the single-writer
/// pool, transactions on the same fingerprint serialize at the database.
pub struct SqliteReferenceLedger {
    pool: SqlitePool,
}

impl SqliteReferenceLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_reference(
        tx: &mut Transaction<'_, Sqlite>,
        reference: &Reference,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO refs (owner_id, fingerprint, tenant_id, charged_bytes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(reference.owner_id().to_string())
        .bind(reference.fingerprint().as_hex())
        .bind(reference.tenant_id().to_string())
        .bind(reference.charged_bytes() as i64)
        .bind(reference.created_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(reference.owner_id().to_string())
            } else {
                e.into()
            }
        })?;

        Ok(())
    }
}

#[async_trait]
impl ReferenceLedger for SqliteReferenceLedger {
    async fn create_blob(
        &self,
        blob: &ContentBlob,
        reference: &Reference,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO blobs (fingerprint, size_bytes, storage_location, ref_count, created_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            "#,
        )
        .bind(blob.fingerprint().as_hex())
        .bind(blob.size_bytes() as i64)
        .bind(blob.storage_location())
        .bind(blob.created_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(blob.fingerprint().to_string())
            } else {
                LedgerError::from(e)
            }
        })?;

        Self::insert_reference(&mut tx, reference).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn attach(&self, reference: &Reference) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE blobs SET ref_count = ref_count + 1 WHERE fingerprint = ?1")
            .bind(reference.fingerprint().as_hex())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls the increment attempt back
            return Err(LedgerError::NotFound(reference.fingerprint().to_string()));
        }

        Self::insert_reference(&mut tx, reference).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn detach(&self, owner_id: &OwnerId) -> Result<DetachOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let ref_row: Option<RefRow> = sqlx::query_as(
            r#"
            SELECT owner_id, fingerprint, tenant_id, charged_bytes, created_at
            FROM refs WHERE owner_id = ?1
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ref_row) = ref_row else {
            return Err(LedgerError::NotFound(owner_id.to_string()));
        };
        let reference = ref_row.into_domain()?;

        sqlx::query("DELETE FROM refs WHERE owner_id = ?1")
            .bind(owner_id.to_string())
            .execute(&mut *tx)
            .await?;

        let blob_row: Option<BlobRow> = sqlx::query_as(
            r#"
            UPDATE blobs SET ref_count = ref_count - 1
            WHERE fingerprint = ?1
            RETURNING fingerprint, size_bytes, storage_location, ref_count, created_at
            "#,
        )
        .bind(reference.fingerprint().as_hex())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(blob_row) = blob_row else {
            // A reference without a blob row: bookkeeping is corrupt.
            // Dropping the transaction restores the reference row; nothing
            // is silently repaired.
            error!(
                owner_id = %owner_id,
                fingerprint = %reference.fingerprint(),
                "reference points at nonexistent blob row"
            );
            return Err(LedgerError::IntegrityViolation(format!(
                "reference {} points at nonexistent blob {}",
                owner_id,
                reference.fingerprint()
            )));
        };
        let blob = blob_row.into_domain()?;

        if blob.ref_count() < 0 {
            error!(fingerprint = %blob.fingerprint(), ref_count = blob.ref_count(),
                "reference count went negative");
            return Err(LedgerError::IntegrityViolation(format!(
                "reference count for {} went negative",
                blob.fingerprint()
            )));
        }

        if blob.ref_count() == 0 {
            sqlx::query("DELETE FROM blobs WHERE fingerprint = ?1")
                .bind(blob.fingerprint().as_hex())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(DetachOutcome::BlobDropped { reference, blob })
        } else {
            let ref_count = blob.ref_count();
            tx.commit().await?;
            Ok(DetachOutcome::Remaining {
                reference,
                ref_count,
            })
        }
    }

    async fn find_blob(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ContentBlob>, LedgerError> {
        let row: Option<BlobRow> = sqlx::query_as(
            r#"
            SELECT fingerprint, size_bytes, storage_location, ref_count, created_at
            FROM blobs WHERE fingerprint = ?1
            "#,
        )
        .bind(fingerprint.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    async fn find_reference(&self, owner_id: &OwnerId) -> Result<Option<Reference>, LedgerError> {
        let row: Option<RefRow> = sqlx::query_as(
            r#"
            SELECT owner_id, fingerprint, tenant_id, charged_bytes, created_at
            FROM refs WHERE owner_id = ?1
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    async fn reference_count(&self, fingerprint: &Fingerprint) -> Result<i64, LedgerError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT ref_count FROM blobs WHERE fingerprint = ?1")
                .bind(fingerprint.as_hex())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.0).unwrap_or(0))
    }

    async fn find_orphaned(&self, limit: i64) -> Result<Vec<ContentBlob>, LedgerError> {
        let rows: Vec<BlobRow> = sqlx::query_as(
            r#"
            SELECT fingerprint, size_bytes, storage_location, ref_count, created_at
            FROM blobs WHERE ref_count = 0 LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    async fn delete_blob_if_unreferenced(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM blobs WHERE fingerprint = ?1 AND ref_count = 0")
            .bind(fingerprint.as_hex())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct BlobRow {
    fingerprint: String,
    size_bytes: i64,
    storage_location: String,
    ref_count: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl BlobRow {
    fn into_domain(self) -> Result<ContentBlob, LedgerError> {
        let fingerprint = Fingerprint::from_hex(self.fingerprint)
            .map_err(|e| LedgerError::IntegrityViolation(e.to_string()))?;

        Ok(ContentBlob::reconstruct(
            fingerprint,
            self.size_bytes as u64,
            self.storage_location,
            self.ref_count,
            self.created_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct RefRow {
    owner_id: String,
    fingerprint: String,
    tenant_id: String,
    charged_bytes: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl RefRow {
    fn into_domain(self) -> Result<Reference, LedgerError> {
        let owner_id = OwnerId::from_string(&self.owner_id)
            .map_err(|e| LedgerError::IntegrityViolation(e.to_string()))?;
        let fingerprint = Fingerprint::from_hex(self.fingerprint)
            .map_err(|e| LedgerError::IntegrityViolation(e.to_string()))?;
        let tenant_id = TenantId::from_string(&self.tenant_id)
            .map_err(|e| LedgerError::IntegrityViolation(e.to_string()))?;

        Ok(Reference::reconstruct(
            owner_id,
            fingerprint,
            tenant_id,
            self.charged_bytes as u64,
            self.created_at,
        ))
    }
}
