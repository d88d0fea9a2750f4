//! Repository Module
//!
//! Data access for the two persisted aggregates. Engine-facing mutation
//! methods are conditional: each one is a single `UPDATE ... WHERE`
//! statement whose predicate re-checks the idempotency/monotonicity
//! assumption at write time and reports back whether it applied.

pub mod order;
pub mod return_request;

pub use order::{OrderRepository, ShipmentUpdate};
pub use return_request::ReturnRepository;

use surrealdb::Surreal;
use surrealdb::engine::local::Db;
use thiserror::Error;

/// Repository error types
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<surrealdb::Error> for RepoError {
    fn from(err: surrealdb::Error) -> Self {
        let msg = err.to_string();
        // unique index violations surface as generic errors; keep the
        // message so callers can report which reference collided
        if msg.contains("already contains") {
            RepoError::Duplicate(msg)
        } else {
            RepoError::Database(msg)
        }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Base repository with database reference
#[derive(Clone)]
pub struct BaseRepository {
    db: Surreal<Db>,
}

impl BaseRepository {
    pub fn new(db: Surreal<Db>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Surreal<Db> {
        &self.db
    }
}
