//! Error type for `roster-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] roster_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A legacy column was passed to an operation that does not apply to its
  /// shape (e.g. clearing an id-list column as if it were scalar).
  #[error("column {0} is not valid for this operation")]
  UnsupportedColumn(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
