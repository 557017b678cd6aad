//! Best-effort mirror into the remote Postgres database.
//!
//! Every remote call here is fire-and-forget from the pipeline's point of
//! view: failures are logged and queued, never propagated into the local
//! state machines. The pool is built lazily so the appliance boots (and
//! records) with no network at all.

pub mod best_effort;
pub mod db;
pub mod repo;

pub use best_effort::BestEffortSync;
pub use db::{connect_lazy, DatabaseConfig};
pub use repo::BookingSyncRepo;

/// Errors from the remote mirror.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
