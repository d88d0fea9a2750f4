//! Database Module
//!
//! Embedded SurrealDB storage. All engine mutations go through
//! single-statement conditional `UPDATE ... WHERE` queries in
//! [`repository`] — there is no in-memory read-modify-write of record
//! state, which keeps concurrent webhook deliveries for the same order
//! safe without long-lived locks.

pub mod repository;

use std::path::Path;

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem, RocksDb};

use crate::utils::AppError;

const NAMESPACE: &str = "aurum";
const DATABASE: &str = "recon";

/// Open the embedded database at `data_dir` and apply schema definitions.
pub async fn connect(data_dir: &Path) -> Result<Surreal<Db>, AppError> {
    let path = data_dir.join("recon.db");
    let db = Surreal::new::<RocksDb>(path.as_path())
        .await
        .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;
    init(&db).await?;
    tracing::info!(path = %path.display(), "Database opened (embedded, RocksDB)");
    Ok(db)
}

/// In-memory database — used by tests.
pub async fn connect_memory() -> Result<Surreal<Db>, AppError> {
    let db = Surreal::new::<Mem>(())
        .await
        .map_err(|e| AppError::database(format!("Failed to open in-memory database: {e}")))?;
    init(&db).await?;
    Ok(db)
}

async fn init(db: &Surreal<Db>) -> Result<(), AppError> {
    db.use_ns(NAMESPACE)
        .use_db(DATABASE)
        .await
        .map_err(|e| AppError::database(format!("Failed to select namespace: {e}")))?;
    define_schema(db).await
}

/// Unique indexes on the human-facing reference numbers.
///
/// Everything else stays schemaless; webhook-fed fields evolve with the
/// carrier and the engine tolerates unknown extras.
async fn define_schema(db: &Surreal<Db>) -> Result<(), AppError> {
    db.query(
        "DEFINE INDEX IF NOT EXISTS order_number_idx ON TABLE order FIELDS order_number UNIQUE;
         DEFINE INDEX IF NOT EXISTS return_number_idx ON TABLE return_request FIELDS return_number UNIQUE;",
    )
    .await
    .map_err(|e| AppError::database(format!("Failed to define schema: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_rocksdb_in_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = connect(dir.path()).await.unwrap();
        // sanity: schema definition is idempotent
        define_schema(&db).await.unwrap();
    }

    #[tokio::test]
    async fn memory_engine_round_trips() {
        let db = connect_memory().await.unwrap();
        let mut res = db.query("RETURN 1 + 1").await.unwrap();
        let v: Option<i64> = res.take(0).unwrap();
        assert_eq!(v, Some(2));
    }
}
