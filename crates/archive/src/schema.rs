use {dmrecall_common::Error, sqlx::SqlitePool};

/// Create the messages table and its indexes. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> dmrecall_common::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::StoreWrite(format!("migration failed: {e}")))
}
