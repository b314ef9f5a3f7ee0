//! Legacy encodings of assignment facts and the lenient decoders for them.
//!
//! Before the ledger existed, assignments lived in columns of the page and
//! page-environment tables, in one of three shapes:
//!
//! - a scalar user id (`at_tester_id`),
//! - a JSON array of user ids (`at_tester_ids = "[7, 12]"`),
//! - the same column holding a loosely delimited string (`"7, 12"`).
//!
//! Decoding happens here and nowhere else; past this boundary a fact only
//! carries its [`SourceEncoding`] as a tag.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  assignment::{AssignmentKind, Role},
};

// ─── Raw cell values ─────────────────────────────────────────────────────────

/// A legacy cell as read from the store, before any interpretation. Columns
/// carry no type guarantee: an id column may hold an integer, numeric text, or
/// junk.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyValue {
  Null,
  Integer(i64),
  Text(String),
  /// Anything else (reals, blobs), rendered for diagnostics.
  Other(String),
}

impl LegacyValue {
  /// The cell rendered as it would appear in the store, for provenance and
  /// reports. `None` for SQL NULL.
  pub fn raw(&self) -> Option<String> {
    match self {
      Self::Null => None,
      Self::Integer(n) => Some(n.to_string()),
      Self::Text(s) | Self::Other(s) => Some(s.clone()),
    }
  }
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// A legacy table holding assignment facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyTable {
  ProjectPages,
  PageEnvironments,
}

impl LegacyTable {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ProjectPages => "project_pages",
      Self::PageEnvironments => "page_environments",
    }
  }
}

/// A legacy column holding assignment facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyColumn {
  AtTesterId,
  FtTesterId,
  AtTesterIds,
  FtTesterIds,
}

impl LegacyColumn {
  pub const SCALAR: [Self; 2] = [Self::AtTesterId, Self::FtTesterId];
  pub const ID_LISTS: [Self; 2] = [Self::AtTesterIds, Self::FtTesterIds];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::AtTesterId => "at_tester_id",
      Self::FtTesterId => "ft_tester_id",
      Self::AtTesterIds => "at_tester_ids",
      Self::FtTesterIds => "ft_tester_ids",
    }
  }

  /// The role every id in this column is assigned in.
  pub fn role(self) -> Role {
    match self {
      Self::AtTesterId | Self::AtTesterIds => Role::AtTester,
      Self::FtTesterId | Self::FtTesterIds => Role::FtTester,
    }
  }

  pub fn shape(self) -> ColumnShape {
    match self {
      Self::AtTesterId | Self::FtTesterId => ColumnShape::Scalar,
      Self::AtTesterIds | Self::FtTesterIds => ColumnShape::IdList,
    }
  }
}

impl std::fmt::Display for LegacyColumn {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How a legacy field was actually decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
  Scalar,
  JsonArray,
  CsvString,
}

impl SourceEncoding {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Scalar => "scalar",
      Self::JsonArray => "json_array",
      Self::CsvString => "csv_string",
    }
  }
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// The ids recovered from one legacy field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIds {
  pub ids:      Vec<i64>,
  pub encoding: SourceEncoding,
}

/// The decoding strategy a column calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnShape {
  Scalar,
  IdList,
}

impl ColumnShape {
  /// Decode `value` into subject ids.
  ///
  /// Returns `Ok(None)` for an unset field (NULL or blank text), and
  /// [`Error::MalformedLegacyValue`] when the field has content but no
  /// strategy yields a usable id.
  pub fn decode(self, column: LegacyColumn, value: &LegacyValue) -> Result<Option<DecodedIds>> {
    let decoded = match (self, value) {
      (_, LegacyValue::Null) => return Ok(None),
      (_, LegacyValue::Text(s)) if s.trim().is_empty() => return Ok(None),
      (Self::Scalar, LegacyValue::Integer(n)) => positive(*n).map(|id| DecodedIds {
        ids:      vec![id],
        encoding: SourceEncoding::Scalar,
      }),
      (Self::Scalar, LegacyValue::Text(s)) => s
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(positive)
        .map(|id| DecodedIds { ids: vec![id], encoding: SourceEncoding::Scalar }),
      (Self::IdList, LegacyValue::Integer(n)) => positive(*n).map(|id| DecodedIds {
        ids:      vec![id],
        encoding: SourceEncoding::CsvString,
      }),
      (Self::IdList, LegacyValue::Text(s)) => decode_id_list(s),
      (_, LegacyValue::Other(_)) => None,
    };

    match decoded {
      Some(d) => Ok(Some(d)),
      None => Err(Error::MalformedLegacyValue {
        column: column.as_str().to_owned(),
        raw:    value.raw().unwrap_or_default(),
      }),
    }
  }
}

/// Decode an id-list field: a JSON array first, then a comma/whitespace
/// delimited string. `None` means neither strategy produced anything usable.
///
/// A well-formed JSON array that is empty (or whose entries are all unusable)
/// is a valid, empty list rather than a malformed value.
pub fn decode_id_list(raw: &str) -> Option<DecodedIds> {
  if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
    let ids = items.iter().filter_map(json_id).collect();
    return Some(DecodedIds { ids, encoding: SourceEncoding::JsonArray });
  }

  let ids: Vec<i64> = raw
    .split(|c: char| c == ',' || c.is_whitespace())
    .filter(|t| !t.is_empty())
    .filter_map(leading_int)
    .filter_map(positive)
    .collect();

  if ids.is_empty() {
    None
  } else {
    Some(DecodedIds { ids, encoding: SourceEncoding::CsvString })
  }
}

/// Render an id list back into a legacy column. An empty list is stored as
/// NULL, never as `[]`, so "unset" has exactly one representation.
pub fn encode_id_list(ids: &[i64]) -> Option<String> {
  if ids.is_empty() {
    None
  } else {
    serde_json::to_string(ids).ok()
  }
}

fn json_id(v: &serde_json::Value) -> Option<i64> {
  let n = match v {
    serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_id)),
    serde_json::Value::String(s) => leading_int(s),
    _ => None,
  }?;
  positive(n)
}

/// A whole-number id from a JSON float. Values outside `i64` are dropped, as
/// the delimited path drops tokens that overflow.
fn float_id(f: f64) -> Option<i64> {
  (f.is_finite() && f >= 1.0 && f < i64::MAX as f64).then(|| f.trunc() as i64)
}

/// Integer prefix of `s` after leading whitespace: `"12abc"` is 12, `"abc"`
/// and `"[5"` are nothing.
fn leading_int(s: &str) -> Option<i64> {
  let s = s.trim_start();
  let (sign, digits) = match s.strip_prefix('-') {
    Some(rest) => (-1, rest),
    None => (1, s.strip_prefix('+').unwrap_or(s)),
  };
  let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
  digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

fn positive(n: i64) -> Option<i64> { (n > 0).then_some(n) }

// ─── Legacy rows ─────────────────────────────────────────────────────────────

/// One `project_pages` row, restricted to the assignment-bearing columns.
#[derive(Debug, Clone)]
pub struct LegacyPageRow {
  pub page_id:       i64,
  pub scope_id:      i64,
  pub page_name:     Option<String>,
  pub at_tester_id:  LegacyValue,
  pub ft_tester_id:  LegacyValue,
  pub at_tester_ids: LegacyValue,
  pub ft_tester_ids: LegacyValue,
}

impl LegacyPageRow {
  pub fn column(&self, column: LegacyColumn) -> &LegacyValue {
    match column {
      LegacyColumn::AtTesterId => &self.at_tester_id,
      LegacyColumn::FtTesterId => &self.ft_tester_id,
      LegacyColumn::AtTesterIds => &self.at_tester_ids,
      LegacyColumn::FtTesterIds => &self.ft_tester_ids,
    }
  }
}

/// One `page_environments` row. `scope_id` comes from the owning page and is
/// `None` when that page no longer exists.
#[derive(Debug, Clone)]
pub struct LegacyEnvironmentRow {
  pub row_id:         i64,
  pub page_id:        i64,
  pub scope_id:       Option<i64>,
  pub environment_id: i64,
  pub at_tester_id:   LegacyValue,
  pub ft_tester_id:   LegacyValue,
}

impl LegacyEnvironmentRow {
  /// Only the scalar columns exist on this table.
  pub fn column(&self, column: LegacyColumn) -> Option<&LegacyValue> {
    match column {
      LegacyColumn::AtTesterId => Some(&self.at_tester_id),
      LegacyColumn::FtTesterId => Some(&self.ft_tester_id),
      _ => None,
    }
  }
}

/// A project team membership row (`user_assignments`). Read-only context.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeMembership {
  pub row_id:     i64,
  pub scope_id:   i64,
  pub subject_id: i64,
  pub role:       Option<String>,
  pub is_removed: bool,
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// The legacy cell a fact was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
  pub table:  LegacyTable,
  pub row_id: i64,
  pub column: LegacyColumn,
}

/// One assignment implied by a legacy field. Never persisted as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyFact {
  pub subject_id:       i64,
  pub scope_id:         Option<i64>,
  pub target_id:        Option<i64>,
  pub auxiliary_id:     Option<i64>,
  pub kind:             AssignmentKind,
  pub role:             Role,
  pub source_encoding:  SourceEncoding,
  pub raw_source_value: Option<String>,
  pub origin:           Origin,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn text(s: &str) -> LegacyValue { LegacyValue::Text(s.into()) }

  #[test]
  fn json_array_decodes() {
    let d = decode_id_list("[5, 9]").unwrap();
    assert_eq!(d.ids, vec![5, 9]);
    assert_eq!(d.encoding, SourceEncoding::JsonArray);
  }

  #[test]
  fn json_array_accepts_string_entries_and_drops_junk() {
    let d = decode_id_list(r#"["5", 0, -3, "x", null, 9.0]"#).unwrap();
    assert_eq!(d.ids, vec![5, 9]);
    assert_eq!(d.encoding, SourceEncoding::JsonArray);
  }

  #[test]
  fn delimited_string_matches_json_ids() {
    let json = decode_id_list("[5, 9]").unwrap();
    let csv = decode_id_list("5, 9").unwrap();
    assert_eq!(json.ids, csv.ids);
    assert_eq!(csv.encoding, SourceEncoding::CsvString);
  }

  #[test]
  fn delimited_string_tolerates_mixed_separators() {
    let d = decode_id_list(" 3,,4\n 12abc  0 x").unwrap();
    assert_eq!(d.ids, vec![3, 4, 12]);
  }

  #[test]
  fn broken_json_falls_back_to_tokens() {
    // "[5" has no integer prefix; "9]" does.
    let d = decode_id_list("[5, 9]]").unwrap();
    assert_eq!(d.encoding, SourceEncoding::CsvString);
    assert_eq!(d.ids, vec![9]);
  }

  #[test]
  fn json_scalar_is_not_an_array() {
    let d = decode_id_list("7").unwrap();
    assert_eq!(d.encoding, SourceEncoding::CsvString);
    assert_eq!(d.ids, vec![7]);
  }

  #[test]
  fn empty_json_array_is_valid_and_empty() {
    let d = decode_id_list("[]").unwrap();
    assert!(d.ids.is_empty());
  }

  #[test]
  fn junk_string_is_malformed() {
    let err = ColumnShape::IdList
      .decode(LegacyColumn::AtTesterIds, &text("n/a"))
      .unwrap_err();
    assert!(matches!(err, Error::MalformedLegacyValue { ref raw, .. } if raw == "n/a"));
  }

  #[test]
  fn blank_fields_are_unset() {
    for v in [LegacyValue::Null, text(""), text("   ")] {
      assert_eq!(ColumnShape::IdList.decode(LegacyColumn::FtTesterIds, &v).unwrap(), None);
      assert_eq!(ColumnShape::Scalar.decode(LegacyColumn::FtTesterId, &v).unwrap(), None);
    }
  }

  #[test]
  fn scalar_accepts_integer_and_numeric_text() {
    let a = ColumnShape::Scalar
      .decode(LegacyColumn::AtTesterId, &LegacyValue::Integer(7))
      .unwrap()
      .unwrap();
    let b = ColumnShape::Scalar
      .decode(LegacyColumn::AtTesterId, &text(" 7 "))
      .unwrap()
      .unwrap();
    assert_eq!(a, b);
    assert_eq!(a.encoding, SourceEncoding::Scalar);
  }

  #[test]
  fn scalar_rejects_non_positive_and_text() {
    for v in [LegacyValue::Integer(0), text("seven"), LegacyValue::Other("1.5".into())] {
      assert!(ColumnShape::Scalar.decode(LegacyColumn::AtTesterId, &v).is_err());
    }
  }

  #[test]
  fn oversized_numbers_are_dropped_in_both_encodings() {
    let json = decode_id_list("[99999999999999999999, 18446744073709551615, 7]").unwrap();
    let csv = decode_id_list("99999999999999999999, 18446744073709551615, 7").unwrap();
    assert_eq!(json.ids, vec![7]);
    assert_eq!(csv.ids, json.ids);
  }

  #[test]
  fn empty_list_encodes_to_null() {
    assert_eq!(encode_id_list(&[]), None);
    assert_eq!(encode_id_list(&[12]).as_deref(), Some("[12]"));
  }
}
