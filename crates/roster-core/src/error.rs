//! Error types for `roster-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A legacy field that no decoding strategy could make sense of.
  #[error("malformed legacy value in {column}: {raw:?}")]
  MalformedLegacyValue { column: String, raw: String },

  #[error("ledger constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("data source unavailable: {0}")]
  SourceUnavailable(String),

  #[error("ambiguous target: {0}")]
  AmbiguousTarget(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error into [`Error::Store`].
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
