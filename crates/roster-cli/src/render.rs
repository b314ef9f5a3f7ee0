//! Plain-text rendering of engine reports for the terminal.

use std::io::{self, Write};

use roster_core::{
  assignment::{AssignmentKind, AssignmentRecord},
  inspect::InspectionSummary,
  legacy::LegacyFact,
  reconcile::ReconcileReport,
  repair::{RemovalMode, RemovalOutcome, RemovalReport, RestoreOutcome, UnassignReport},
};

fn opt(v: Option<i64>) -> String { v.map_or_else(|| "-".to_owned(), |v| v.to_string()) }

fn record_line(w: &mut impl Write, r: &AssignmentRecord) -> io::Result<()> {
  writeln!(
    w,
    "  #{:<6} {:<18} project={} page={} env={} user={} role={} created={}",
    r.id,
    r.kind.as_str(),
    opt(r.scope_id),
    opt(r.target_id),
    opt(r.auxiliary_id),
    r.subject_id,
    r.role,
    r.created_at.format("%Y-%m-%d %H:%M:%S"),
  )
}

fn fact_line(w: &mut impl Write, f: &LegacyFact, suffix: &str) -> io::Result<()> {
  writeln!(
    w,
    "  {}#{}.{:<14} user={} role={} page={} env={} [{}]{}",
    f.origin.table.as_str(),
    f.origin.row_id,
    f.origin.column.as_str(),
    f.subject_id,
    f.role,
    opt(f.target_id),
    opt(f.auxiliary_id),
    f.source_encoding.as_str(),
    suffix,
  )
}

// ─── Reconcile ───────────────────────────────────────────────────────────────

pub fn reconcile(w: &mut impl Write, reports: &[ReconcileReport]) -> io::Result<()> {
  for report in reports {
    writeln!(w, "== {} ==", report.batch)?;
    for line in &report.audit {
      writeln!(
        w,
        "  + #{:<6} project={} page={} env={} user={} role={} [{}]",
        line.id,
        opt(line.scope_id),
        opt(line.target_id),
        opt(line.auxiliary_id),
        line.subject_id,
        line.role,
        line.encoding.as_str(),
      )?;
    }
    for failed in &report.failed {
      fact_line(w, &failed.fact, &format!(" FAILED: {}", failed.error))?;
    }
    writeln!(
      w,
      "  inspected={} inserted={} already_present={} skipped_malformed={} failed={}",
      report.inspected,
      report.inserted,
      report.already_present,
      report.skipped_malformed,
      report.failed.len(),
    )?;
  }

  let total = |f: fn(&ReconcileReport) -> usize| reports.iter().map(f).sum::<usize>();
  writeln!(
    w,
    "TOTAL inspected={} inserted={} already_present={} skipped_malformed={} failed={}",
    total(|r| r.inspected),
    total(|r| r.inserted),
    total(|r| r.already_present),
    total(|r| r.skipped_malformed),
    total(|r| r.failed.len()),
  )
}

// ─── Inspect / remove ────────────────────────────────────────────────────────

pub fn inspection(w: &mut impl Write, s: &InspectionSummary) -> io::Result<()> {
  match s.subject_id {
    Some(subject) => writeln!(w, "project {} / user {}", s.scope_id, subject)?,
    None => writeln!(w, "project {}", s.scope_id)?,
  }

  writeln!(w, "team memberships ({}):", s.memberships.len())?;
  for m in &s.memberships {
    writeln!(
      w,
      "  user_assignments#{} user={} role={}{}",
      m.row_id,
      m.subject_id,
      m.role.as_deref().unwrap_or("-"),
      if m.is_removed { " (removed)" } else { "" },
    )?;
  }

  writeln!(w, "legacy traces ({}, {} not in ledger):", s.legacy.len(), s.unreconciled())?;
  for trace in &s.legacy {
    let raw = trace.fact.raw_source_value.as_deref().unwrap_or("");
    let suffix = format!(" raw={raw:?}{}", if trace.in_ledger { "" } else { " *unreconciled*" });
    fact_line(w, &trace.fact, &suffix)?;
  }

  if !s.malformed.is_empty() {
    writeln!(w, "malformed legacy fields ({}):", s.malformed.len())?;
    for m in &s.malformed {
      writeln!(
        w,
        "  {}#{}.{} raw={:?}",
        m.origin.table.as_str(),
        m.origin.row_id,
        m.origin.column.as_str(),
        m.raw,
      )?;
    }
  }

  writeln!(w, "ledger rows ({}):", s.ledger.len())?;
  for r in &s.ledger {
    record_line(w, r)?;
  }
  Ok(())
}

pub fn removal(w: &mut impl Write, report: &RemovalReport) -> io::Result<()> {
  inspection(w, &report.inspection)?;

  if report.outcome == RemovalOutcome::Inspected {
    return writeln!(w, "dry run: nothing changed (pass --apply to remove)");
  }

  writeln!(w, "apply:")?;
  for step in &report.steps {
    match &step.error {
      None => writeln!(w, "  ok     {:<36} affected={}", step.step.to_string(), step.affected)?,
      Some(e) => writeln!(w, "  FAILED {:<36} {e}", step.step.to_string())?,
    }
  }
  let kept =
    report.inspection.ledger.iter().filter(|r| r.kind == AssignmentKind::Scope).count();
  if kept > 0 {
    writeln!(w, "kept {kept} project-level ledger rows (project_assignment); not removed")?;
  }
  match report.outcome {
    RemovalOutcome::Completed => writeln!(w, "completed"),
    _ => writeln!(w, "partially failed; every step is safe to re-run"),
  }
}

// ─── Restore / unassign ──────────────────────────────────────────────────────

pub fn restore(w: &mut impl Write, outcome: RestoreOutcome) -> io::Result<()> {
  match outcome {
    RestoreOutcome::Inserted(id) => writeln!(w, "inserted assignment #{id}"),
    RestoreOutcome::AlreadyExists(id) => writeln!(w, "already exists as assignment #{id}"),
  }
}

pub fn unassign(w: &mut impl Write, report: &UnassignReport) -> io::Result<()> {
  writeln!(
    w,
    "page {} / user {} ({} rows):",
    report.target_id,
    report.subject_id,
    report.rows.len()
  )?;
  for r in &report.rows {
    record_line(w, r)?;
  }
  if report.rows.is_empty() {
    Ok(())
  } else if report.mode == RemovalMode::DryRun {
    writeln!(w, "dry run: nothing changed (pass --apply to delete)")
  } else {
    writeln!(w, "deleted {} rows", report.deleted)
  }
}
