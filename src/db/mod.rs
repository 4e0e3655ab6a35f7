//! Database module: the job store, the product store and the transactional
//! session that bundles them.
//!
//! This module is split into submodules:
//! - `model`: raw rows returned by queries and their conversion into domain types.
//! - `session`: the `Session` / `SessionFactory` unit-of-work traits.
//! - `sqlite`, `postgres`: backend implementations of `Session`.
//! - `repo`: pool setup, migrations and the intake/read-side queries.
//!
//! External modules should import from `pricewatch::db`; the commonly used
//! items are re-exported here.

pub mod model;
pub mod postgres;
pub mod repo;
pub mod session;
pub mod sqlite;

use thiserror::Error;

pub use repo::Database;
pub use session::{Session, SessionFactory};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
    #[error("unknown job status '{0}'")]
    UnknownStatus(String),
}
