//! Transaction log SurrealDB storage
//!
//! Append-only: only `append` and `query` exist, no update or delete.

use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use thiserror::Error;

use super::types::{TxEntry, TxListResponse, TxQuery};

#[derive(Debug, Error)]
pub enum TxLogError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<surrealdb::Error> for TxLogError {
    fn from(err: surrealdb::Error) -> Self {
        TxLogError::Database(err.to_string())
    }
}

pub type TxLogResult<T> = Result<T, TxLogError>;

/// COUNT result row
#[derive(Debug, serde::Deserialize)]
struct CountResult {
    total: u64,
}

/// Transaction log storage (SurrealDB, table `transaction_log`)
#[derive(Clone)]
pub struct TxLogStorage {
    db: Surreal<Db>,
}

impl TxLogStorage {
    pub fn new(db: Surreal<Db>) -> Self {
        Self { db }
    }

    /// Append one entry.
    pub async fn append(&self, entry: TxEntry) -> TxLogResult<()> {
        let mut res = self
            .db
            .query("CREATE transaction_log CONTENT $data")
            .bind(("data", entry))
            .await?;
        let _: Vec<TxEntry> = res.take(0)?;
        Ok(())
    }

    /// Query entries, newest first, with total count for paging.
    pub async fn query(&self, q: &TxQuery) -> TxLogResult<TxListResponse> {
        let mut conditions = Vec::new();

        if q.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if q.to.is_some() {
            conditions.push("timestamp <= $to");
        }
        if q.tx_type.is_some() {
            conditions.push("tx_type = $tx_type");
        }
        if q.reference.is_some() {
            conditions.push("reference = $reference");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT count() as total FROM transaction_log{where_clause} GROUP ALL; \
             SELECT * FROM transaction_log{where_clause} ORDER BY timestamp DESC LIMIT {} START {}",
            q.limit, q.offset
        );

        let mut qb = self.db.query(&sql);
        if let Some(from) = q.from {
            qb = qb.bind(("from", from));
        }
        if let Some(to) = q.to {
            qb = qb.bind(("to", to));
        }
        if let Some(tx_type) = q.tx_type {
            let tx_type_str = serde_json::to_value(tx_type)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            qb = qb.bind(("tx_type", tx_type_str));
        }
        if let Some(ref reference) = q.reference {
            qb = qb.bind(("reference", reference.clone()));
        }

        let mut result = qb.await?;
        let count: Vec<CountResult> = result.take(0)?;
        let total = count.first().map(|c| c.total).unwrap_or(0);
        let items: Vec<TxEntry> = result.take(1)?;

        Ok(TxListResponse { items, total })
    }
}
