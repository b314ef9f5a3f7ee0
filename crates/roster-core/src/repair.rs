//! Compensating operations: targeted removal and restore.
//!
//! Removal always inspects first. Only [`RemovalMode::Apply`] mutates, and it
//! does so in independent sub-steps with no rollback between them. Every
//! sub-step is idempotent, so re-running a partially failed apply is safe.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
  Error, Result,
  assignment::{AssignmentKind, AssignmentRecord, DedupKey, InsertOutcome, NewAssignment, Role},
  inspect::{self, InspectionSummary},
  legacy::{self, LegacyColumn},
  reconcile::Actor,
  store::AssignmentStore,
};

// ─── Removal ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMode {
  #[default]
  DryRun,
  Apply,
}

/// The apply-phase sub-steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "column", rename_all = "snake_case")]
pub enum RemovalStep {
  EnvironmentRows,
  ClearScalar(LegacyColumn),
  RewriteIdLists,
  LedgerRows,
}

impl RemovalStep {
  pub const ALL: [Self; 5] = [
    Self::EnvironmentRows,
    Self::ClearScalar(LegacyColumn::AtTesterId),
    Self::ClearScalar(LegacyColumn::FtTesterId),
    Self::RewriteIdLists,
    Self::LedgerRows,
  ];
}

impl std::fmt::Display for RemovalStep {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::EnvironmentRows => f.write_str("delete page_environments rows"),
      Self::ClearScalar(c) => write!(f, "clear project_pages.{c}"),
      Self::RewriteIdLists => f.write_str("rewrite id lists"),
      Self::LedgerRows => f.write_str("delete page/env ledger rows"),
    }
  }
}

/// What one sub-step did. `affected` counts rows touched before any error.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
  pub step:     RemovalStep,
  pub affected: usize,
  pub error:    Option<String>,
}

/// Where a removal ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOutcome {
  /// Inspection only; nothing was mutated.
  Inspected,
  Completed,
  /// At least one sub-step failed. The operator decides whether to retry.
  PartiallyFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
  pub scope_id:   i64,
  pub subject_id: i64,
  pub mode:       RemovalMode,
  pub inspection: InspectionSummary,
  pub steps:      Vec<StepReport>,
  pub outcome:    RemovalOutcome,
}

/// Remove every legacy and canonical trace of `subject_id` within `scope_id`.
pub fn remove<S: AssignmentStore>(
  store: &S,
  scope_id: i64,
  subject_id: i64,
  mode: RemovalMode,
) -> Result<RemovalReport> {
  if !store.scope_exists(scope_id).map_err(Error::store)? {
    return Err(Error::AmbiguousTarget(format!("project {scope_id} does not exist")));
  }

  let inspection = inspect::inspect(store, scope_id, Some(subject_id))?;

  if mode == RemovalMode::DryRun {
    return Ok(RemovalReport {
      scope_id,
      subject_id,
      mode,
      inspection,
      steps: Vec::new(),
      outcome: RemovalOutcome::Inspected,
    });
  }

  tracing::info!(scope = scope_id, subject = subject_id, "applying removal");

  let steps: Vec<StepReport> = RemovalStep::ALL
    .into_iter()
    .map(|step| {
      let report = run_step(store, step, scope_id, subject_id);
      match &report.error {
        Some(e) => tracing::warn!(%step, error = %e, "removal step failed"),
        None => tracing::info!(%step, affected = report.affected, "removal step done"),
      }
      report
    })
    .collect();

  let outcome = if steps.iter().any(|s| s.error.is_some()) {
    RemovalOutcome::PartiallyFailed
  } else {
    RemovalOutcome::Completed
  };

  Ok(RemovalReport { scope_id, subject_id, mode, inspection, steps, outcome })
}

fn run_step<S: AssignmentStore>(
  store: &S,
  step: RemovalStep,
  scope_id: i64,
  subject_id: i64,
) -> StepReport {
  let single = |r: std::result::Result<usize, S::Error>| match r {
    Ok(affected) => (affected, None),
    Err(e) => (0, Some(e.to_string())),
  };

  let (affected, error) = match step {
    RemovalStep::EnvironmentRows => single(store.delete_environment_rows(scope_id, subject_id)),
    RemovalStep::ClearScalar(column) => {
      single(store.clear_scalar_column(scope_id, column, subject_id))
    }
    RemovalStep::RewriteIdLists => rewrite_id_lists(store, scope_id, subject_id),
    RemovalStep::LedgerRows => single(store.delete_scoped_assignments(scope_id, subject_id)),
  };

  StepReport { step, affected, error }
}

/// Drop `subject_id` from every id-list column in the scope. Fields that do
/// not mention the subject are left byte-for-byte untouched; rewritten fields
/// are stored as JSON arrays, or NULL once empty.
fn rewrite_id_lists<S: AssignmentStore>(
  store: &S,
  scope_id: i64,
  subject_id: i64,
) -> (usize, Option<String>) {
  let pages = match store.page_rows(Some(scope_id)) {
    Ok(p) => p,
    Err(e) => return (0, Some(e.to_string())),
  };

  let mut affected = 0;
  let mut errors = Vec::new();
  for page in &pages {
    for column in LegacyColumn::ID_LISTS {
      let Ok(Some(decoded)) = column.shape().decode(column, page.column(column)) else {
        continue;
      };
      if !decoded.ids.contains(&subject_id) {
        continue;
      }
      let remaining: Vec<i64> = decoded.ids.into_iter().filter(|id| *id != subject_id).collect();
      let value = legacy::encode_id_list(&remaining);
      match store.write_id_list(page.page_id, column, value.as_deref()) {
        Ok(n) => affected += n,
        Err(e) => errors.push(format!("page {} {column}: {e}", page.page_id)),
      }
    }
  }

  let error = (!errors.is_empty()).then(|| errors.join("; "));
  (affected, error)
}

// ─── Restore ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RestoreRequest {
  pub target_id:  i64,
  pub subject_id: i64,
  pub role:       Role,
  /// If given, must agree with the scope the target belongs to.
  pub scope_id:   Option<i64>,
  /// The timestamp the restored row is backdated to.
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "id", rename_all = "snake_case")]
pub enum RestoreOutcome {
  Inserted(i64),
  AlreadyExists(i64),
}

/// Re-insert a single target-level row. Idempotent: if any target-level row
/// already exists for the pair, its id is returned and nothing is written.
pub fn restore<S: AssignmentStore>(
  store: &S,
  request: &RestoreRequest,
  actor: Actor,
) -> Result<RestoreOutcome> {
  let RestoreRequest { target_id, subject_id, .. } = *request;

  let scope_id = match store.target_scope(target_id).map_err(Error::store)? {
    None => return Err(Error::AmbiguousTarget(format!("page {target_id} does not exist"))),
    Some(owner) => match request.scope_id {
      Some(given) if given != owner => {
        return Err(Error::AmbiguousTarget(format!(
          "page {target_id} belongs to project {owner}, not project {given}"
        )));
      }
      _ => owner,
    },
  };

  if let Some(id) = store.find_target_assignment(target_id, subject_id).map_err(Error::store)? {
    tracing::info!(id, target = target_id, subject = subject_id, "assignment already present");
    return Ok(RestoreOutcome::AlreadyExists(id));
  }

  let key = DedupKey {
    scope_id: Some(scope_id),
    target_id: Some(target_id),
    auxiliary_id: None,
    subject_id,
    kind: AssignmentKind::Target,
    role: request.role.clone(),
  };
  let input = NewAssignment {
    key:        key.clone(),
    metadata:   None,
    created_by: actor.id,
    created_at: Some(request.created_at),
  };

  match store.insert_assignment(&input).map_err(Error::store)? {
    InsertOutcome::Inserted(id) => {
      tracing::info!(id, target = target_id, subject = subject_id, "restored assignment");
      Ok(RestoreOutcome::Inserted(id))
    }
    InsertOutcome::Conflict => store
      .find_assignment(&key)
      .map_err(Error::store)?
      .map(RestoreOutcome::AlreadyExists)
      .ok_or_else(|| {
        Error::ConstraintViolation(format!(
          "insert for page {target_id} user {subject_id} rejected but no matching row found"
        ))
      }),
  }
}

// ─── Unassign ────────────────────────────────────────────────────────────────

/// Ledger rows for one target/subject pair, and how many were deleted.
#[derive(Debug, Clone, Serialize)]
pub struct UnassignReport {
  pub target_id:  i64,
  pub subject_id: i64,
  pub mode:       RemovalMode,
  pub rows:       Vec<AssignmentRecord>,
  pub deleted:    usize,
}

/// Delete the target-level ledger rows for one pair; the inverse of
/// [`restore`]. Legacy columns are not touched.
pub fn unassign_target<S: AssignmentStore>(
  store: &S,
  target_id: i64,
  subject_id: i64,
  mode: RemovalMode,
) -> Result<UnassignReport> {
  let rows = store.target_assignments(target_id, subject_id).map_err(Error::store)?;
  let deleted = match mode {
    RemovalMode::DryRun => 0,
    RemovalMode::Apply => {
      store.delete_target_assignments(target_id, subject_id).map_err(Error::store)?
    }
  };
  Ok(UnassignReport { target_id, subject_id, mode, rows, deleted })
}
