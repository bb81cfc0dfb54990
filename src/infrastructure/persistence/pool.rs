use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Ledger schema (embedded)
const SCHEMA: &str = include_str!("schema.sql");

/// Open (creating if missing) the ledger database and apply the schema.
pub async fn connect(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }

    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        // Prevent transient "database is locked" errors under concurrent access
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        // SQLite permits only one writer; a single connection serializes
        // ledger transactions instead of surfacing busy errors
        .max_connections(1)
        .connect_with(opts)
        .await?;

    migrate(&pool).await?;
    info!("Ledger database ready at {:?}", path);

    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.split(';') {
        let trimmed = statement.trim();
        let has_sql = trimmed.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("--")
        });
        if has_sql {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}
