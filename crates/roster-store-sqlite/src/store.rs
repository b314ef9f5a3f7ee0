//! [`SqliteStore`], the SQLite implementation of [`AssignmentStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use roster_core::{
  assignment::{AssignmentKind, AssignmentRecord, DedupKey, InsertOutcome, NewAssignment},
  legacy::{ColumnShape, LegacyColumn, LegacyEnvironmentRow, LegacyPageRow, ScopeMembership},
  store::AssignmentStore,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension as _, types::Value};

use crate::{
  Error, Result,
  encode::{ASSIGNMENT_COLUMNS, RawAssignment, encode_dt, legacy_value},
  schema::{REQUIRED_TABLES, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The tracker database, legacy tables and ledger alike, behind one
/// connection.
pub struct SqliteStore {
  conn: Connection,
}

impl SqliteStore {
  /// Open an existing database at `path`.
  ///
  /// The file is never created and no schema is applied. A missing file or a
  /// database lacking the tracker tables is
  /// [`roster_core::Error::SourceUnavailable`].
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = Connection::open_with_flags(
      path,
      OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| {
      roster_core::Error::SourceUnavailable(format!("cannot open {}: {e}", path.display()))
    })?;

    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    let store = Self { conn };
    store.verify_tables()?;
    tracing::debug!(path = %path.display(), "opened tracker database");
    Ok(store)
  }

  /// Open an in-memory database with [`SCHEMA`] applied, for tests and trials.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self { conn })
  }

  fn verify_tables(&self) -> Result<()> {
    for table in REQUIRED_TABLES {
      let exists = self
        .conn
        .query_row(
          "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
          rusqlite::params![table],
          |_| Ok(()),
        )
        .optional()?
        .is_some();
      if !exists {
        return Err(
          roster_core::Error::SourceUnavailable(format!("missing table {table}")).into(),
        );
      }
    }
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn conn(&self) -> &Connection { &self.conn }

  fn query_assignments(
    &self,
    sql: &str,
    params: impl rusqlite::Params,
  ) -> Result<Vec<AssignmentRecord>> {
    let mut stmt = self.conn.prepare(sql)?;
    let raws = stmt
      .query_map(params, RawAssignment::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawAssignment::into_record).collect()
  }
}

fn require_shape(column: LegacyColumn, shape: ColumnShape) -> Result<&'static str> {
  if column.shape() == shape {
    Ok(column.as_str())
  } else {
    Err(Error::UnsupportedColumn(column.as_str()))
  }
}

// ─── AssignmentStore impl ────────────────────────────────────────────────────

impl AssignmentStore for SqliteStore {
  type Error = Error;

  // ── Units of work ─────────────────────────────────────────────────────────

  fn in_batch<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Self) -> Result<T>,
  {
    // Statements issued by `f` go through the same connection and so run
    // inside this transaction. Dropping `tx` on error rolls back.
    let tx = self.conn.unchecked_transaction()?;
    let out = f(self)?;
    tx.commit()?;
    Ok(out)
  }

  // ── Scope resolution ──────────────────────────────────────────────────────

  fn scope_exists(&self, scope_id: i64) -> Result<bool> {
    Ok(
      self
        .conn
        .query_row("SELECT 1 FROM projects WHERE id = ?1", rusqlite::params![scope_id], |_| {
          Ok(())
        })
        .optional()?
        .is_some(),
    )
  }

  fn target_scope(&self, target_id: i64) -> Result<Option<i64>> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT project_id FROM project_pages WHERE id = ?1",
          rusqlite::params![target_id],
          |r| r.get(0),
        )
        .optional()?,
    )
  }

  // ── Legacy reads ──────────────────────────────────────────────────────────

  fn page_rows(&self, scope_id: Option<i64>) -> Result<Vec<LegacyPageRow>> {
    let mut stmt = self.conn.prepare(
      "SELECT id, project_id, page_name,
              at_tester_id, ft_tester_id, at_tester_ids, ft_tester_ids
       FROM project_pages
       WHERE ?1 IS NULL OR project_id = ?1
       ORDER BY id",
    )?;

    let rows = stmt
      .query_map(rusqlite::params![scope_id], |row| {
        Ok(LegacyPageRow {
          page_id:       row.get(0)?,
          scope_id:      row.get(1)?,
          page_name:     row.get(2)?,
          at_tester_id:  legacy_value(row.get::<_, Value>(3)?),
          ft_tester_id:  legacy_value(row.get::<_, Value>(4)?),
          at_tester_ids: legacy_value(row.get::<_, Value>(5)?),
          ft_tester_ids: legacy_value(row.get::<_, Value>(6)?),
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
  }

  fn environment_rows(&self, scope_id: Option<i64>) -> Result<Vec<LegacyEnvironmentRow>> {
    let mut stmt = self.conn.prepare(
      "SELECT pe.id, pe.page_id, pp.project_id, pe.environment_id,
              pe.at_tester_id, pe.ft_tester_id
       FROM page_environments pe
       LEFT JOIN project_pages pp ON pp.id = pe.page_id
       WHERE ?1 IS NULL OR pp.project_id = ?1
       ORDER BY pe.page_id, pe.id",
    )?;

    let rows = stmt
      .query_map(rusqlite::params![scope_id], |row| {
        Ok(LegacyEnvironmentRow {
          row_id:         row.get(0)?,
          page_id:        row.get(1)?,
          scope_id:       row.get(2)?,
          environment_id: row.get(3)?,
          at_tester_id:   legacy_value(row.get::<_, Value>(4)?),
          ft_tester_id:   legacy_value(row.get::<_, Value>(5)?),
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
  }

  fn scope_memberships(
    &self,
    scope_id: i64,
    subject_id: Option<i64>,
  ) -> Result<Vec<ScopeMembership>> {
    let mut stmt = self.conn.prepare(
      "SELECT id, project_id, user_id, role, is_removed
       FROM user_assignments
       WHERE project_id = ?1 AND (?2 IS NULL OR user_id = ?2)
       ORDER BY id",
    )?;

    let rows = stmt
      .query_map(rusqlite::params![scope_id, subject_id], |row| {
        Ok(ScopeMembership {
          row_id:     row.get(0)?,
          scope_id:   row.get(1)?,
          subject_id: row.get(2)?,
          role:       row.get(3)?,
          is_removed: row.get::<_, Option<i64>>(4)?.unwrap_or(0) != 0,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
  }

  // ── Legacy mutations ──────────────────────────────────────────────────────

  fn delete_environment_rows(&self, scope_id: i64, subject_id: i64) -> Result<usize> {
    Ok(self.conn.execute(
      "DELETE FROM page_environments
       WHERE (at_tester_id = ?2 OR ft_tester_id = ?2)
         AND page_id IN (SELECT id FROM project_pages WHERE project_id = ?1)",
      rusqlite::params![scope_id, subject_id],
    )?)
  }

  fn clear_scalar_column(
    &self,
    scope_id: i64,
    column: LegacyColumn,
    subject_id: i64,
  ) -> Result<usize> {
    let col = require_shape(column, ColumnShape::Scalar)?;
    Ok(self.conn.execute(
      &format!("UPDATE project_pages SET {col} = NULL WHERE project_id = ?1 AND {col} = ?2"),
      rusqlite::params![scope_id, subject_id],
    )?)
  }

  fn write_id_list(&self, page_id: i64, column: LegacyColumn, value: Option<&str>) -> Result<usize> {
    let col = require_shape(column, ColumnShape::IdList)?;
    Ok(self.conn.execute(
      &format!("UPDATE project_pages SET {col} = ?2 WHERE id = ?1"),
      rusqlite::params![page_id, value],
    )?)
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  fn find_assignment(&self, key: &DedupKey) -> Result<Option<i64>> {
    // `IS` is SQLite's NULL-safe equality.
    Ok(
      self
        .conn
        .query_row(
          "SELECT id FROM assignments
           WHERE project_id IS ?1
             AND page_id IS ?2
             AND environment_id IS ?3
             AND assigned_user_id = ?4
             AND task_type = ?5
             AND assigned_role IS ?6
           ORDER BY id
           LIMIT 1",
          rusqlite::params![
            key.scope_id,
            key.target_id,
            key.auxiliary_id,
            key.subject_id,
            key.kind.as_str(),
            key.role.as_str(),
          ],
          |r| r.get(0),
        )
        .optional()?,
    )
  }

  fn find_target_assignment(&self, target_id: i64, subject_id: i64) -> Result<Option<i64>> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT id FROM assignments
           WHERE page_id = ?1 AND assigned_user_id = ?2 AND task_type = ?3
           ORDER BY id
           LIMIT 1",
          rusqlite::params![target_id, subject_id, AssignmentKind::Target.as_str()],
          |r| r.get(0),
        )
        .optional()?,
    )
  }

  fn insert_assignment(&self, input: &NewAssignment) -> Result<InsertOutcome> {
    let key = &input.key;
    let meta = input.metadata.as_ref().map(serde_json::to_string).transpose()?;
    let created_at = encode_dt(input.created_at.unwrap_or_else(Utc::now));

    // OR IGNORE turns a unique-index collision into zero changed rows;
    // foreign-key failures still surface as errors.
    let changed = self.conn.execute(
      "INSERT OR IGNORE INTO assignments (
         project_id, page_id, environment_id, task_type,
         assigned_user_id, assigned_role, meta, created_by, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      rusqlite::params![
        key.scope_id,
        key.target_id,
        key.auxiliary_id,
        key.kind.as_str(),
        key.subject_id,
        key.role.as_str(),
        meta,
        input.created_by,
        created_at,
      ],
    )?;

    if changed == 0 {
      Ok(InsertOutcome::Conflict)
    } else {
      Ok(InsertOutcome::Inserted(self.conn.last_insert_rowid()))
    }
  }

  fn list_assignments(
    &self,
    scope_id: i64,
    subject_id: Option<i64>,
  ) -> Result<Vec<AssignmentRecord>> {
    self.query_assignments(
      &format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
         WHERE project_id = ?1 AND (?2 IS NULL OR assigned_user_id = ?2)
         ORDER BY id"
      ),
      rusqlite::params![scope_id, subject_id],
    )
  }

  fn target_assignments(&self, target_id: i64, subject_id: i64) -> Result<Vec<AssignmentRecord>> {
    self.query_assignments(
      &format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
         WHERE page_id = ?1 AND assigned_user_id = ?2 AND task_type = ?3
         ORDER BY id"
      ),
      rusqlite::params![target_id, subject_id, AssignmentKind::Target.as_str()],
    )
  }

  fn delete_scoped_assignments(&self, scope_id: i64, subject_id: i64) -> Result<usize> {
    Ok(self.conn.execute(
      "DELETE FROM assignments
       WHERE project_id = ?1 AND assigned_user_id = ?2 AND task_type IN (?3, ?4)",
      rusqlite::params![
        scope_id,
        subject_id,
        AssignmentKind::Target.as_str(),
        AssignmentKind::Auxiliary.as_str(),
      ],
    )?)
  }

  fn delete_target_assignments(&self, target_id: i64, subject_id: i64) -> Result<usize> {
    Ok(self.conn.execute(
      "DELETE FROM assignments WHERE page_id = ?1 AND assigned_user_id = ?2 AND task_type = ?3",
      rusqlite::params![target_id, subject_id, AssignmentKind::Target.as_str()],
    )?)
  }
}
