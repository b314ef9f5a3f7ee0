//! The reconciler: legacy facts in, canonical ledger rows out.
//!
//! For each fact the dedup key is checked against the store and a row is
//! inserted only when none matches. Running a pass twice inserts nothing the
//! second time. A fact that fails is counted and logged; the batch goes on.

use serde::Serialize;

use crate::{
  Error, Result,
  assignment::{DedupKey, InsertOutcome, NewAssignment, Provenance, Role},
  extract::{self, Extraction},
  legacy::{LegacyFact, SourceEncoding},
  store::AssignmentStore,
};

// ─── Report ──────────────────────────────────────────────────────────────────

/// One inserted row, for operator review.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLine {
  pub id:           i64,
  pub scope_id:     Option<i64>,
  pub target_id:    Option<i64>,
  pub auxiliary_id: Option<i64>,
  pub subject_id:   i64,
  pub role:         Role,
  pub encoding:     SourceEncoding,
}

/// A fact that could not be written.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFact {
  pub fact:  LegacyFact,
  pub error: String,
}

/// The outcome of reconciling one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
  /// The legacy table this batch was extracted from.
  pub batch:             String,
  pub inspected:         usize,
  pub inserted:          usize,
  pub already_present:   usize,
  pub skipped_malformed: usize,
  pub failed:            Vec<FailedFact>,
  pub audit:             Vec<AuditLine>,
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// Settings shared by every write the engine performs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Actor {
  /// Recorded as `created_by` on inserted rows. `None` stores NULL.
  pub id: Option<i64>,
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Reconcile one batch of extracted facts inside a single transaction.
///
/// Only a failure to open or commit the transaction is returned as an error.
pub fn reconcile<S: AssignmentStore>(
  store: &S,
  batch: &str,
  extraction: &Extraction,
  actor: Actor,
) -> Result<ReconcileReport> {
  tracing::info!(batch, facts = extraction.facts.len(), "reconciling batch");

  let report = store
    .in_batch(|store| {
      let mut report = ReconcileReport {
        batch: batch.to_owned(),
        skipped_malformed: extraction.malformed.len(),
        ..Default::default()
      };
      for fact in &extraction.facts {
        report.inspected += 1;
        match reconcile_fact(store, fact, actor) {
          Ok(FactOutcome::Inserted(line)) => {
            tracing::debug!(id = line.id, subject = line.subject_id, "inserted assignment");
            report.inserted += 1;
            report.audit.push(line);
          }
          Ok(FactOutcome::AlreadyPresent) => report.already_present += 1,
          Err(e) => {
            tracing::warn!(
              batch,
              subject = fact.subject_id,
              target = ?fact.target_id,
              error = %e,
              "skipping fact"
            );
            report.failed.push(FailedFact { fact: fact.clone(), error: e.to_string() });
          }
        }
      }
      Ok(report)
    })
    .map_err(Error::store)?;

  tracing::info!(
    batch,
    inserted = report.inserted,
    already_present = report.already_present,
    skipped = report.skipped_malformed,
    failed = report.failed.len(),
    "batch complete"
  );
  Ok(report)
}

/// Extract and reconcile every legacy table, one batch per table.
pub fn reconcile_all<S: AssignmentStore>(
  store: &S,
  scope_id: Option<i64>,
  actor: Actor,
) -> Result<Vec<ReconcileReport>> {
  let pages = store.page_rows(scope_id).map_err(Error::store)?;
  let pages = reconcile(store, "project_pages", &extract::extract_pages(&pages), actor)?;

  let envs = store.environment_rows(scope_id).map_err(Error::store)?;
  let envs =
    reconcile(store, "page_environments", &extract::extract_environments(&envs), actor)?;

  Ok(vec![pages, envs])
}

// ─── Internals ───────────────────────────────────────────────────────────────

enum FactOutcome {
  Inserted(AuditLine),
  AlreadyPresent,
}

pub(crate) fn key_of(fact: &LegacyFact) -> DedupKey {
  DedupKey {
    scope_id:     fact.scope_id,
    target_id:    fact.target_id,
    auxiliary_id: fact.auxiliary_id,
    subject_id:   fact.subject_id,
    kind:         fact.kind.clone(),
    role:         fact.role.clone(),
  }
}

fn provenance_of(fact: &LegacyFact) -> Provenance {
  Provenance {
    source:   fact.origin.column,
    table:    fact.origin.table,
    encoding: fact.source_encoding,
    raw:      match fact.source_encoding {
      SourceEncoding::CsvString => fact.raw_source_value.clone(),
      SourceEncoding::Scalar | SourceEncoding::JsonArray => None,
    },
  }
}

fn reconcile_fact<S: AssignmentStore>(
  store: &S,
  fact: &LegacyFact,
  actor: Actor,
) -> Result<FactOutcome> {
  let key = key_of(fact);
  if store.find_assignment(&key).map_err(Error::store)?.is_some() {
    return Ok(FactOutcome::AlreadyPresent);
  }

  let input = NewAssignment {
    key,
    metadata: Some(provenance_of(fact).to_json()?),
    created_by: actor.id,
    created_at: None,
  };

  match store.insert_assignment(&input).map_err(Error::store)? {
    InsertOutcome::Inserted(id) => Ok(FactOutcome::Inserted(AuditLine {
      id,
      scope_id: fact.scope_id,
      target_id: fact.target_id,
      auxiliary_id: fact.auxiliary_id,
      subject_id: fact.subject_id,
      role: fact.role.clone(),
      encoding: fact.source_encoding,
    })),
    InsertOutcome::Conflict => Ok(FactOutcome::AlreadyPresent),
  }
}
