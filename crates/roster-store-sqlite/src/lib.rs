//! SQLite backend for the roster assignment reconciler.
//!
//! All access goes through one [`rusqlite::Connection`]; calls block the
//! calling thread until SQLite answers.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use schema::SCHEMA;
pub use store::SqliteStore;
