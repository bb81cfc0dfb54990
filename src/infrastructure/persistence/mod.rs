mod pool;
mod sqlite_compensation_log;
mod sqlite_quota_accountant;
mod sqlite_reference_ledger;

pub use pool::connect;
pub use sqlite_compensation_log::SqliteCompensationLog;
pub use sqlite_quota_accountant::SqliteQuotaAccountant;
pub use sqlite_reference_ledger::SqliteReferenceLedger;

/// Benign uniqueness race detection shared by the ledger adapters
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
