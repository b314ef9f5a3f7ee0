//! Read-only inspection of every trace of an assignment within a scope.
//!
//! Nothing here writes. [`inspect`] is used on its own to audit a scope and
//! as the first phase of [`crate::repair::remove`].

use serde::Serialize;

use crate::{
  Error, Result,
  assignment::AssignmentRecord,
  extract::{self, MalformedField},
  legacy::{LegacyFact, ScopeMembership},
  reconcile::key_of,
  store::AssignmentStore,
};

/// A legacy fact found during inspection, with whether the ledger already
/// holds a matching row.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyTrace {
  pub fact:      LegacyFact,
  pub in_ledger: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectionSummary {
  pub scope_id:    i64,
  pub subject_id:  Option<i64>,
  /// Project team rows; informational only.
  pub memberships: Vec<ScopeMembership>,
  /// Facts from `project_pages`, then from `page_environments`.
  pub legacy:      Vec<LegacyTrace>,
  /// Legacy fields in scope that could not be decoded.
  pub malformed:   Vec<MalformedField>,
  pub ledger:      Vec<AssignmentRecord>,
}

impl InspectionSummary {
  /// Whether anything at all references the subject (or anyone, when no
  /// subject was given) in this scope.
  pub fn is_empty(&self) -> bool {
    self.memberships.is_empty() && self.legacy.is_empty() && self.ledger.is_empty()
  }

  pub fn unreconciled(&self) -> usize { self.legacy.iter().filter(|t| !t.in_ledger).count() }
}

/// Gather every legacy and canonical trace in `scope_id`, optionally narrowed
/// to one subject.
pub fn inspect<S: AssignmentStore>(
  store: &S,
  scope_id: i64,
  subject_id: Option<i64>,
) -> Result<InspectionSummary> {
  tracing::info!(scope = scope_id, subject = ?subject_id, "inspecting");

  let pages = store.page_rows(Some(scope_id)).map_err(Error::store)?;
  let envs = store.environment_rows(Some(scope_id)).map_err(Error::store)?;

  let mut extractions = [extract::extract_pages(&pages), extract::extract_environments(&envs)];
  if let Some(subject) = subject_id {
    extractions = extractions.map(|e| e.for_subject(subject));
  }

  let mut legacy = Vec::new();
  let mut malformed = Vec::new();
  for extraction in extractions {
    for fact in extraction.facts {
      let in_ledger = store.find_assignment(&key_of(&fact)).map_err(Error::store)?.is_some();
      legacy.push(LegacyTrace { fact, in_ledger });
    }
    malformed.extend(extraction.malformed);
  }

  Ok(InspectionSummary {
    scope_id,
    subject_id,
    memberships: store.scope_memberships(scope_id, subject_id).map_err(Error::store)?,
    legacy,
    malformed,
    ledger: store.list_assignments(scope_id, subject_id).map_err(Error::store)?,
  })
}
