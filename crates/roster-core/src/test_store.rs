//! An in-process [`AssignmentStore`] that loses every insert race, for
//! exercising the engine's conflict paths without a database.

use std::cell::{Cell, RefCell};

use crate::{
  Error, Result,
  assignment::{AssignmentRecord, DedupKey, InsertOutcome, NewAssignment},
  legacy::{LegacyColumn, LegacyEnvironmentRow, LegacyPageRow, ScopeMembership},
  store::AssignmentStore,
};

/// Every `find_assignment` misses until an insert has been rejected; from
/// then on it returns `winner`, the row a concurrent writer got in first.
pub(crate) struct ConflictStore {
  pub winner:     Option<i64>,
  pub scope_of:   Option<i64>,
  pub conflicted: Cell<bool>,
  pub attempts:   RefCell<Vec<NewAssignment>>,
}

impl ConflictStore {
  pub fn new(winner: Option<i64>) -> Self {
    Self {
      winner,
      scope_of: Some(1),
      conflicted: Cell::new(false),
      attempts: RefCell::new(Vec::new()),
    }
  }
}

impl AssignmentStore for ConflictStore {
  type Error = Error;

  fn in_batch<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Self) -> Result<T>,
  {
    f(self)
  }

  fn scope_exists(&self, _scope_id: i64) -> Result<bool> { Ok(true) }

  fn target_scope(&self, _target_id: i64) -> Result<Option<i64>> { Ok(self.scope_of) }

  fn page_rows(&self, _scope_id: Option<i64>) -> Result<Vec<LegacyPageRow>> { Ok(Vec::new()) }

  fn environment_rows(&self, _scope_id: Option<i64>) -> Result<Vec<LegacyEnvironmentRow>> {
    Ok(Vec::new())
  }

  fn scope_memberships(
    &self,
    _scope_id: i64,
    _subject_id: Option<i64>,
  ) -> Result<Vec<ScopeMembership>> {
    Ok(Vec::new())
  }

  fn delete_environment_rows(&self, _scope_id: i64, _subject_id: i64) -> Result<usize> { Ok(0) }

  fn clear_scalar_column(
    &self,
    _scope_id: i64,
    _column: LegacyColumn,
    _subject_id: i64,
  ) -> Result<usize> {
    Ok(0)
  }

  fn write_id_list(
    &self,
    _page_id: i64,
    _column: LegacyColumn,
    _value: Option<&str>,
  ) -> Result<usize> {
    Ok(0)
  }

  fn find_assignment(&self, _key: &DedupKey) -> Result<Option<i64>> {
    Ok(if self.conflicted.get() { self.winner } else { None })
  }

  fn find_target_assignment(&self, _target_id: i64, _subject_id: i64) -> Result<Option<i64>> {
    Ok(None)
  }

  fn insert_assignment(&self, input: &NewAssignment) -> Result<InsertOutcome> {
    self.attempts.borrow_mut().push(input.clone());
    self.conflicted.set(true);
    Ok(InsertOutcome::Conflict)
  }

  fn list_assignments(
    &self,
    _scope_id: i64,
    _subject_id: Option<i64>,
  ) -> Result<Vec<AssignmentRecord>> {
    Ok(Vec::new())
  }

  fn target_assignments(&self, _target_id: i64, _subject_id: i64) -> Result<Vec<AssignmentRecord>> {
    Ok(Vec::new())
  }

  fn delete_scoped_assignments(&self, _scope_id: i64, _subject_id: i64) -> Result<usize> { Ok(0) }

  fn delete_target_assignments(&self, _target_id: i64, _subject_id: i64) -> Result<usize> {
    Ok(0)
  }
}
