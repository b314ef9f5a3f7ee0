//! Core types and engine for the roster assignment reconciler.
//!
//! This crate has no database dependencies. Storage backends
//! implement [`store::AssignmentStore`]; the engine operations in
//! [`reconcile`], [`inspect`] and [`repair`] are written against that trait.

pub mod assignment;
pub mod error;
pub mod extract;
pub mod inspect;
pub mod legacy;
pub mod reconcile;
pub mod repair;
pub mod store;

pub use error::{Error, Result};

#[cfg(test)]
mod test_store;
