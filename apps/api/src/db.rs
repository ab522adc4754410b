use std::path::Path;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

/// Opens (creating if missing) the SQLite database backing the exemplar index.
/// WAL allows concurrent readers alongside the single writer; FULL sync makes
/// every committed write durable before the call returns.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    info!("Opening exemplar index at {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Exemplar index connection pool established");
    Ok(pool)
}
