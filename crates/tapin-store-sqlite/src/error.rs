//! Error type for `tapin-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Domain(#[from] tapin_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("column decode error: {0}")]
  Decode(String),

  /// The bulk-logout batch rolled back. The `error` audit entry has
  /// already been written by the time this surfaces.
  #[error("bulk logout failed: {0}")]
  SweepFailed(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
