//! Canonical assignment ledger types.
//!
//! An [`AssignmentRecord`] is one row of the ledger: a subject assigned to a
//! scope, optionally narrowed to a target and an auxiliary dimension, in a
//! given role. Two records are "the same assignment" when their [`DedupKey`]s
//! are equal, with `None` comparing equal to `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::legacy::{LegacyColumn, LegacyTable, SourceEncoding};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The granularity of an assignment. Stored in the `task_type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssignmentKind {
  /// Assigned to the whole scope (project team level).
  Scope,
  /// Assigned to one target within the scope.
  Target,
  /// Assigned to one target in one auxiliary dimension (environment).
  Auxiliary,
  /// A discriminant written by some other producer; carried verbatim.
  Custom(String),
}

impl AssignmentKind {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Scope => "project_assignment",
      Self::Target => "page_assignment",
      Self::Auxiliary => "env_assignment",
      Self::Custom(s) => s,
    }
  }

  pub fn parse(s: &str) -> Self {
    match s {
      "project_assignment" => Self::Scope,
      "page_assignment" => Self::Target,
      "env_assignment" => Self::Auxiliary,
      other => Self::Custom(other.to_owned()),
    }
  }
}

impl From<String> for AssignmentKind {
  fn from(s: String) -> Self { Self::parse(&s) }
}

impl From<AssignmentKind> for String {
  fn from(k: AssignmentKind) -> Self { k.as_str().to_owned() }
}

// ─── Role ────────────────────────────────────────────────────────────────────

/// The capacity in which a subject is assigned. Stored in `assigned_role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
  AtTester,
  FtTester,
  Custom(String),
}

impl Role {
  pub fn as_str(&self) -> &str {
    match self {
      Self::AtTester => "at_tester",
      Self::FtTester => "ft_tester",
      Self::Custom(s) => s,
    }
  }

  pub fn parse(s: &str) -> Self {
    match s.trim() {
      "at_tester" => Self::AtTester,
      "ft_tester" => Self::FtTester,
      other => Self::Custom(other.to_owned()),
    }
  }
}

impl From<String> for Role {
  fn from(s: String) -> Self { Self::parse(&s) }
}

impl From<Role> for String {
  fn from(r: Role) -> Self { r.as_str().to_owned() }
}

impl std::fmt::Display for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Dedup key ───────────────────────────────────────────────────────────────

/// The tuple whose null-safe equality defines "the same assignment".
///
/// Derived `Eq`/`Hash` treat `None == None`, which is exactly the ledger's
/// uniqueness rule; backends must compare with `IS` (or equivalent), never
/// with `=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DedupKey {
  pub scope_id:     Option<i64>,
  pub target_id:    Option<i64>,
  pub auxiliary_id: Option<i64>,
  pub subject_id:   i64,
  pub kind:         AssignmentKind,
  pub role:         Role,
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Where a reconciled row came from. Serialised into the `meta` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  pub source:   LegacyColumn,
  pub table:    LegacyTable,
  pub encoding: SourceEncoding,
  /// The original field content; kept only for the delimited-string path,
  /// where the stored text cannot be rebuilt from the decoded ids.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub raw:      Option<String>,
}

impl Provenance {
  pub fn to_json(&self) -> crate::Result<serde_json::Value> {
    Ok(serde_json::to_value(self)?)
  }

  /// Interpret a `meta` payload as provenance, if it has that shape. Rows
  /// written by other producers may carry anything.
  pub fn from_json(value: &serde_json::Value) -> Option<Self> {
    serde_json::from_value(value.clone()).ok()
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A persisted ledger row.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRecord {
  pub id:           i64,
  pub scope_id:     Option<i64>,
  pub target_id:    Option<i64>,
  pub auxiliary_id: Option<i64>,
  pub kind:         AssignmentKind,
  pub subject_id:   i64,
  pub role:         Role,
  pub metadata:     Option<serde_json::Value>,
  pub created_by:   Option<i64>,
  pub created_at:   DateTime<Utc>,
}

impl AssignmentRecord {
  pub fn key(&self) -> DedupKey {
    DedupKey {
      scope_id:     self.scope_id,
      target_id:    self.target_id,
      auxiliary_id: self.auxiliary_id,
      subject_id:   self.subject_id,
      kind:         self.kind.clone(),
      role:         self.role.clone(),
    }
  }

  pub fn provenance(&self) -> Option<Provenance> {
    self.metadata.as_ref().and_then(Provenance::from_json)
  }
}

/// Input to [`crate::store::AssignmentStore::insert_assignment`].
#[derive(Debug, Clone)]
pub struct NewAssignment {
  pub key:        DedupKey,
  pub metadata:   Option<serde_json::Value>,
  pub created_by: Option<i64>,
  /// Explicit creation time; `None` lets the store stamp "now".
  pub created_at: Option<DateTime<Utc>>,
}

/// The result of attempting a ledger insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted(i64),
  /// The store rejected the row under its own uniqueness constraint.
  Conflict,
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn kind_discriminants_round_trip() {
    for k in [
      AssignmentKind::Scope,
      AssignmentKind::Target,
      AssignmentKind::Auxiliary,
      AssignmentKind::Custom("regression".into()),
    ] {
      assert_eq!(AssignmentKind::parse(k.as_str()), k);
    }
  }

  #[test]
  fn unknown_role_is_custom() {
    assert_eq!(Role::parse("reviewer"), Role::Custom("reviewer".into()));
    assert_eq!(Role::parse(" ft_tester "), Role::FtTester);
  }

  #[test]
  fn keys_with_null_auxiliary_are_equal() {
    let a = DedupKey {
      scope_id:     Some(3),
      target_id:    Some(10),
      auxiliary_id: None,
      subject_id:   7,
      kind:         AssignmentKind::Target,
      role:         Role::AtTester,
    };
    let b = a.clone();
    let mut seen = HashSet::new();
    assert!(seen.insert(a));
    assert!(!seen.insert(b));
  }

  #[test]
  fn provenance_omits_raw_for_json_source() {
    let p = Provenance {
      source:   LegacyColumn::AtTesterIds,
      table:    LegacyTable::ProjectPages,
      encoding: SourceEncoding::JsonArray,
      raw:      None,
    };
    let json = p.to_json().unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "source": "at_tester_ids",
        "table": "project_pages",
        "encoding": "json_array",
      })
    );
    assert_eq!(Provenance::from_json(&json), Some(p));
  }

  #[test]
  fn foreign_metadata_is_not_provenance() {
    let meta = serde_json::json!({ "note": "added by hand" });
    assert_eq!(Provenance::from_json(&meta), None);
  }
}
