//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are written as RFC 3339 strings. On read, the
//! `YYYY-MM-DD HH:MM:SS` form other writers use is accepted too and taken as
//! UTC. Legacy cells are read as untyped [`Value`]s so that no shape of junk
//! can fail a row read.

use chrono::{DateTime, NaiveDateTime, Utc};
use roster_core::{
  assignment::{AssignmentKind, AssignmentRecord, Role},
  legacy::LegacyValue,
};
use rusqlite::{Row, types::Value};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Legacy cells ────────────────────────────────────────────────────────────

pub fn legacy_value(v: Value) -> LegacyValue {
  match v {
    Value::Null => LegacyValue::Null,
    Value::Integer(n) => LegacyValue::Integer(n),
    Value::Text(s) => LegacyValue::Text(s),
    Value::Real(f) => LegacyValue::Other(f.to_string()),
    Value::Blob(b) => LegacyValue::Other(format!("<{} byte blob>", b.len())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawAssignment::from_row`].
pub const ASSIGNMENT_COLUMNS: &str = "id, project_id, page_id, environment_id, task_type, \
                                      assigned_user_id, assigned_role, meta, created_by, \
                                      created_at";

/// Raw values read directly from an `assignments` row.
pub struct RawAssignment {
  pub id:               i64,
  pub project_id:       Option<i64>,
  pub page_id:          Option<i64>,
  pub environment_id:   Option<i64>,
  pub task_type:        String,
  pub assigned_user_id: i64,
  pub assigned_role:    String,
  pub meta:             Option<String>,
  pub created_by:       Option<i64>,
  pub created_at:       String,
}

impl RawAssignment {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      project_id:       row.get(1)?,
      page_id:          row.get(2)?,
      environment_id:   row.get(3)?,
      task_type:        row.get(4)?,
      assigned_user_id: row.get(5)?,
      assigned_role:    row.get(6)?,
      meta:             row.get(7)?,
      created_by:       row.get(8)?,
      created_at:       row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<AssignmentRecord> {
    // Foreign rows may carry non-JSON text in `meta`; keep it as a string.
    let metadata = self.meta.map(|m| {
      serde_json::from_str(&m).unwrap_or(serde_json::Value::String(m))
    });

    Ok(AssignmentRecord {
      id: self.id,
      scope_id: self.project_id,
      target_id: self.page_id,
      auxiliary_id: self.environment_id,
      kind: AssignmentKind::parse(&self.task_type),
      subject_id: self.assigned_user_id,
      role: Role::parse(&self.assigned_role),
      metadata,
      created_by: self.created_by,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn decode_dt_accepts_both_forms() {
    let want = Utc.with_ymd_and_hms(2026, 2, 3, 14, 59, 21).unwrap();
    assert_eq!(decode_dt("2026-02-03T14:59:21+00:00").unwrap(), want);
    assert_eq!(decode_dt("2026-02-03 14:59:21").unwrap(), want);
    assert!(decode_dt("yesterday").is_err());
  }

  #[test]
  fn real_and_blob_cells_are_other() {
    assert_eq!(legacy_value(Value::Real(1.5)), LegacyValue::Other("1.5".into()));
    assert!(matches!(legacy_value(Value::Blob(vec![0, 1])), LegacyValue::Other(_)));
  }
}
