//! Top-level error type for the ingest pipeline.

use thiserror::Error;

/// Aggregates the per-subsystem error types into one enum so `main` has a
/// single `Result` to bubble up to an exit code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("spool error: {0}")]
    Spool(#[from] crate::spool::SpoolError),

    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),

    #[error("database error: {0}")]
    Db(#[from] crate::db::DbError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
