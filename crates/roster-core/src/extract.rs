//! Legacy fact extraction: legacy rows in, [`LegacyFact`]s out.
//!
//! A single bad field never aborts a scan. It is recorded in
//! [`Extraction::malformed`] and the remaining fields of the row are still
//! read.

use serde::Serialize;

use crate::{
  Error,
  assignment::AssignmentKind,
  legacy::{
    LegacyColumn, LegacyEnvironmentRow, LegacyFact, LegacyPageRow, LegacyTable, LegacyValue,
    Origin, SourceEncoding,
  },
};

/// A legacy field that could not be decoded.
#[derive(Debug, Clone, Serialize)]
pub struct MalformedField {
  pub origin: Origin,
  pub raw:    String,
}

/// The facts extracted from one legacy table, in row order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
  pub facts:     Vec<LegacyFact>,
  pub malformed: Vec<MalformedField>,
}

impl Extraction {
  /// Keep only facts for `subject_id`. Malformed fields are kept: they may
  /// hide the subject.
  pub fn for_subject(mut self, subject_id: i64) -> Self {
    self.facts.retain(|f| f.subject_id == subject_id);
    self
  }

  fn push_field(
    &mut self,
    origin: Origin,
    value: &LegacyValue,
    fact: impl Fn(i64, SourceEncoding, Option<String>) -> LegacyFact,
  ) {
    match origin.column.shape().decode(origin.column, value) {
      Ok(None) => {}
      Ok(Some(decoded)) => {
        let raw = value.raw();
        for id in decoded.ids {
          self.facts.push(fact(id, decoded.encoding, raw.clone()));
        }
      }
      Err(Error::MalformedLegacyValue { raw, .. }) => {
        tracing::warn!(
          table = origin.table.as_str(),
          row = origin.row_id,
          column = origin.column.as_str(),
          raw = %raw,
          "skipping malformed legacy value"
        );
        self.malformed.push(MalformedField { origin, raw });
      }
      Err(other) => {
        tracing::warn!(error = %other, "unexpected decode error");
        self.malformed.push(MalformedField { origin, raw: value.raw().unwrap_or_default() });
      }
    }
  }
}

/// Extract page-level facts from `project_pages` rows.
///
/// Scalar columns are read before id-list columns so audit output lists the
/// primary tester first.
pub fn extract_pages(rows: &[LegacyPageRow]) -> Extraction {
  let mut out = Extraction::default();
  for row in rows {
    for column in LegacyColumn::SCALAR.into_iter().chain(LegacyColumn::ID_LISTS) {
      let origin = Origin { table: LegacyTable::ProjectPages, row_id: row.page_id, column };
      out.push_field(origin, row.column(column), |subject_id, encoding, raw| LegacyFact {
        subject_id,
        scope_id: Some(row.scope_id),
        target_id: Some(row.page_id),
        auxiliary_id: None,
        kind: AssignmentKind::Target,
        role: column.role(),
        source_encoding: encoding,
        raw_source_value: raw,
        origin,
      });
    }
  }
  out
}

/// Extract environment-level facts from `page_environments` rows.
pub fn extract_environments(rows: &[LegacyEnvironmentRow]) -> Extraction {
  let mut out = Extraction::default();
  for row in rows {
    for column in LegacyColumn::SCALAR {
      let Some(value) = row.column(column) else { continue };
      let origin = Origin { table: LegacyTable::PageEnvironments, row_id: row.row_id, column };
      out.push_field(origin, value, |subject_id, encoding, raw| LegacyFact {
        subject_id,
        scope_id: row.scope_id,
        target_id: Some(row.page_id),
        auxiliary_id: Some(row.environment_id),
        kind: AssignmentKind::Auxiliary,
        role: column.role(),
        source_encoding: encoding,
        raw_source_value: raw,
        origin,
      });
    }
  }
  out
}
