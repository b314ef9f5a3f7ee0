//! The `AssignmentStore` trait.
//!
//! Implemented by storage backends (e.g. `roster-store-sqlite`). The engine
//! operations depend on this abstraction, not on any concrete backend. Every
//! call goes to the store; implementations must not cache ledger state between
//! calls, since the dedup check relies on seeing rows inserted moments before.

use crate::{
  assignment::{AssignmentRecord, DedupKey, InsertOutcome, NewAssignment},
  legacy::{LegacyColumn, LegacyEnvironmentRow, LegacyPageRow, ScopeMembership},
};

/// Abstraction over the relational store holding both the legacy sources and
/// the canonical ledger.
///
/// All calls are synchronous and block until the store responds.
pub trait AssignmentStore {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Units of work ─────────────────────────────────────────────────────

  /// Run `f` inside one transaction, committing if it returns `Ok`.
  fn in_batch<T, F>(&self, f: F) -> Result<T, Self::Error>
  where
    F: FnOnce(&Self) -> Result<T, Self::Error>;

  // ── Scope resolution ──────────────────────────────────────────────────

  fn scope_exists(&self, scope_id: i64) -> Result<bool, Self::Error>;

  /// The scope owning `target_id`, or `None` if the target does not exist.
  fn target_scope(&self, target_id: i64) -> Result<Option<i64>, Self::Error>;

  // ── Legacy reads ──────────────────────────────────────────────────────

  /// All page rows, or only those of `scope_id`, ordered by page id.
  fn page_rows(&self, scope_id: Option<i64>) -> Result<Vec<LegacyPageRow>, Self::Error>;

  /// All environment rows, or only those whose page belongs to `scope_id`,
  /// ordered by page id then row id.
  fn environment_rows(
    &self,
    scope_id: Option<i64>,
  ) -> Result<Vec<LegacyEnvironmentRow>, Self::Error>;

  /// Team membership rows for `scope_id`, optionally for one subject.
  fn scope_memberships(
    &self,
    scope_id: i64,
    subject_id: Option<i64>,
  ) -> Result<Vec<ScopeMembership>, Self::Error>;

  // ── Legacy mutations ──────────────────────────────────────────────────

  /// Delete environment rows in `scope_id` naming `subject_id` in any tester
  /// column. Returns the number of rows deleted.
  fn delete_environment_rows(&self, scope_id: i64, subject_id: i64)
  -> Result<usize, Self::Error>;

  /// Set a scalar page column to NULL where it equals `subject_id`, within
  /// `scope_id`. Returns the number of rows updated.
  fn clear_scalar_column(
    &self,
    scope_id: i64,
    column: LegacyColumn,
    subject_id: i64,
  ) -> Result<usize, Self::Error>;

  /// Overwrite an id-list page column with `value` (NULL when `None`).
  fn write_id_list(
    &self,
    page_id: i64,
    column: LegacyColumn,
    value: Option<&str>,
  ) -> Result<usize, Self::Error>;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Id of the ledger row matching `key` under null-safe equality.
  fn find_assignment(&self, key: &DedupKey) -> Result<Option<i64>, Self::Error>;

  /// Id of any target-level row for this target/subject pair, in any role.
  fn find_target_assignment(
    &self,
    target_id: i64,
    subject_id: i64,
  ) -> Result<Option<i64>, Self::Error>;

  fn insert_assignment(&self, input: &NewAssignment) -> Result<InsertOutcome, Self::Error>;

  /// Ledger rows in `scope_id`, optionally for one subject, ordered by id.
  fn list_assignments(
    &self,
    scope_id: i64,
    subject_id: Option<i64>,
  ) -> Result<Vec<AssignmentRecord>, Self::Error>;

  /// Target-level rows for one target/subject pair, ordered by id.
  fn target_assignments(
    &self,
    target_id: i64,
    subject_id: i64,
  ) -> Result<Vec<AssignmentRecord>, Self::Error>;

  /// Delete target- and auxiliary-level rows for `subject_id` in `scope_id`.
  /// Scope-level rows are left alone.
  fn delete_scoped_assignments(&self, scope_id: i64, subject_id: i64)
  -> Result<usize, Self::Error>;

  /// Delete target-level rows for one target/subject pair.
  fn delete_target_assignments(
    &self,
    target_id: i64,
    subject_id: i64,
  ) -> Result<usize, Self::Error>;
}
