//! Transaction logger service
//!
//! Cheap-to-clone handle + background worker. `log` pushes onto a
//! bounded mpsc channel with `try_send`: if the channel is full or the
//! worker is gone, the entry is reported to the process log and dropped —
//! the primary state mutation always proceeds.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use surrealdb::Surreal;
use surrealdb::engine::local::Db;

use super::storage::TxLogStorage;
use super::types::{TxEntry, TxLevel, TxListResponse, TxQuery, TxType};
use crate::utils::AppError;

/// Channel capacity — large enough to ride out webhook bursts
const CHANNEL_CAPACITY: usize = 4096;

/// Handle for appending and querying transaction log entries
#[derive(Clone)]
pub struct TransactionLogger {
    tx: mpsc::Sender<TxEntry>,
    storage: TxLogStorage,
}

impl std::fmt::Debug for TransactionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLogger").finish_non_exhaustive()
    }
}

impl TransactionLogger {
    /// Record one transaction (non-blocking, best-effort).
    pub fn log(
        &self,
        level: TxLevel,
        tx_type: TxType,
        reference: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        let entry = TxEntry {
            timestamp: shared::util::now_millis(),
            level,
            tx_type,
            reference: reference.into(),
            message: message.into(),
            payload,
        };
        if let Err(e) = self.tx.try_send(entry) {
            tracing::error!(error = %e, "Transaction log channel unavailable — entry dropped");
        }
    }

    pub fn info(
        &self,
        tx_type: TxType,
        reference: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.log(TxLevel::Info, tx_type, reference, message, payload);
    }

    pub fn error(
        &self,
        tx_type: TxType,
        reference: impl Into<String>,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.log(TxLevel::Error, tx_type, reference, message, payload);
    }

    /// Query the log (admin surface).
    pub async fn query(&self, q: &TxQuery) -> Result<TxListResponse, AppError> {
        self.storage
            .query(q)
            .await
            .map_err(|e| AppError::database(e.to_string()))
    }
}

/// Start the logger: returns the handle and the worker task.
pub fn spawn(db: Surreal<Db>) -> (TransactionLogger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<TxEntry>(CHANNEL_CAPACITY);
    let storage = TxLogStorage::new(db);
    let logger = TransactionLogger {
        tx,
        storage: storage.clone(),
    };

    let worker = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(e) = storage.append(entry).await {
                // best-effort: report and continue, never crash the worker
                tracing::error!(error = %e, "Failed to persist transaction log entry");
            }
        }
        tracing::debug!("Transaction log worker stopped");
    });

    (logger, worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logged_entries_become_queryable() {
        let db = crate::db::connect_memory().await.unwrap();
        let (logger, _worker) = spawn(db);

        logger.info(
            TxType::PaymentCaptured,
            "AUR-1",
            "COD payment captured on delivery",
            serde_json::json!({ "method": "cod" }),
        );

        // the worker drains asynchronously
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let page = logger
            .query(&TxQuery {
                from: None,
                to: None,
                tx_type: Some(TxType::PaymentCaptured),
                reference: None,
                offset: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].reference, "AUR-1");
    }
}
