//! `roster`: reconcile legacy tester assignments into the assignments
//! ledger, and repair individual assignments by hand.
//!
//! Reads `roster.toml` (or the path given with `--config`) and `ROSTER_*`
//! environment variables, opens the tracker's SQLite database, runs one
//! operation and prints its report to stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```
//! roster reconcile
//! roster inspect --scope 3 --subject 7
//! roster remove --scope 3 --subject 7 --apply
//! roster restore --target 41 --subject 7 --role ft_tester --created-at "2026-02-03 14:59:21"
//! roster unassign --target 41 --subject 7
//! ```

mod render;

use std::{
  io::{self, Write as _},
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use roster_core::{
  assignment::Role,
  inspect,
  reconcile::{self, Actor},
  repair::{self, RemovalMode, RestoreRequest},
};
use roster_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Legacy assignment reconciler for the QA tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "roster.toml")]
  config: PathBuf,

  /// Tracker database; overrides `database_path` from the config.
  #[arg(long, value_name = "FILE")]
  database: Option<PathBuf>,

  /// User id recorded as `created_by`; overrides `default_actor_id`.
  #[arg(long, value_name = "USER_ID")]
  actor: Option<i64>,

  /// Print reports as JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Copy every legacy assignment into the ledger. Safe to re-run.
  Reconcile {
    /// Only reconcile pages of this project.
    #[arg(long, value_name = "PROJECT_ID")]
    scope: Option<i64>,
  },

  /// Show every legacy and ledger trace within a project. Never writes.
  Inspect {
    #[arg(long, value_name = "PROJECT_ID")]
    scope:   i64,
    #[arg(long, value_name = "USER_ID")]
    subject: Option<i64>,
  },

  /// Remove a user from every assignment in a project. Dry run unless
  /// `--apply` is given.
  Remove {
    #[arg(long, value_name = "PROJECT_ID")]
    scope:   i64,
    #[arg(long, value_name = "USER_ID")]
    subject: i64,
    #[arg(long)]
    apply:   bool,
  },

  /// Re-insert one page-level assignment.
  Restore {
    #[arg(long, value_name = "PAGE_ID")]
    target:     i64,
    #[arg(long, value_name = "USER_ID")]
    subject:    i64,
    /// e.g. `at_tester` or `ft_tester`.
    #[arg(long, value_parser = parse_role)]
    role:       Role,
    /// Must match the project the page belongs to, if given.
    #[arg(long, value_name = "PROJECT_ID")]
    scope:      Option<i64>,
    /// RFC 3339, or `YYYY-MM-DD HH:MM:SS` in UTC. Defaults to now.
    #[arg(long, value_name = "TIMESTAMP", value_parser = parse_created_at)]
    created_at: Option<DateTime<Utc>>,
  },

  /// Delete the page-level ledger rows for one page and user. Dry run
  /// unless `--apply` is given.
  Unassign {
    #[arg(long, value_name = "PAGE_ID")]
    target:  i64,
    #[arg(long, value_name = "USER_ID")]
    subject: i64,
    #[arg(long)]
    apply:   bool,
  },
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Settings read from `roster.toml` and `ROSTER_*` variables.
#[derive(Deserialize)]
struct Settings {
  database_path:    Option<PathBuf>,
  default_actor_id: Option<i64>,
}

fn load_settings(path: &Path) -> anyhow::Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("ROSTER"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")
}

// ─── Entry point ─────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = load_settings(&cli.config)?;

  let db_path = cli
    .database
    .or(settings.database_path)
    .context("no database configured; set database_path or pass --database")?;
  let db_path = expand_tilde(&db_path);

  let store = SqliteStore::open(&db_path)
    .with_context(|| format!("failed to open tracker database at {db_path:?}"))?;

  let actor = Actor { id: cli.actor.or(settings.default_actor_id) };
  if actor.id.is_none() {
    tracing::info!("no actor configured; created_by will be NULL");
  }
  let json = cli.json;
  let mut out = io::stdout().lock();

  match cli.command {
    Command::Reconcile { scope } => {
      let reports = reconcile::reconcile_all(&store, scope, actor).context("reconcile failed")?;
      emit(&mut out, json, &reports[..], render::reconcile)?;
    }
    Command::Inspect { scope, subject } => {
      let summary = inspect::inspect(&store, scope, subject).context("inspect failed")?;
      emit(&mut out, json, &summary, render::inspection)?;
    }
    Command::Remove { scope, subject, apply } => {
      let report =
        repair::remove(&store, scope, subject, mode(apply)).context("remove failed")?;
      emit(&mut out, json, &report, render::removal)?;
    }
    Command::Restore { target, subject, role, scope, created_at } => {
      let request = RestoreRequest {
        target_id: target,
        subject_id: subject,
        role,
        scope_id: scope,
        created_at: created_at.unwrap_or_else(Utc::now),
      };
      let outcome = repair::restore(&store, &request, actor).context("restore failed")?;
      emit(&mut out, json, &outcome, |w, o| render::restore(w, *o))?;
    }
    Command::Unassign { target, subject, apply } => {
      let report = repair::unassign_target(&store, target, subject, mode(apply))
        .context("unassign failed")?;
      emit(&mut out, json, &report, render::unassign)?;
    }
  }

  out.flush().context("failed to write report")
}

fn mode(apply: bool) -> RemovalMode {
  if apply { RemovalMode::Apply } else { RemovalMode::DryRun }
}

/// Write `value` as pretty JSON, or through its text renderer.
fn emit<W, T, F>(out: &mut W, json: bool, value: &T, text: F) -> anyhow::Result<()>
where
  W: io::Write,
  T: Serialize + ?Sized,
  F: FnOnce(&mut W, &T) -> io::Result<()>,
{
  if json {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialise report")?;
    writeln!(out)?;
  } else {
    text(out, value).context("failed to write report")?;
  }
  Ok(())
}

/// Parse a `--role` value. Any non-blank name is accepted; unknown names are
/// stored verbatim.
fn parse_role(s: &str) -> Result<Role, String> {
  if s.trim().is_empty() {
    return Err("role must not be empty".to_owned());
  }
  Ok(Role::parse(s))
}

/// Parse a `--created-at` value: RFC 3339, or a plain `YYYY-MM-DD HH:MM:SS`
/// taken as UTC.
fn parse_created_at(s: &str) -> Result<DateTime<Utc>, String> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD HH:MM:SS, got {s:?}"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_definition_is_valid() { Cli::command().debug_assert(); }

  #[test]
  fn created_at_accepts_both_forms() {
    let want = Utc.with_ymd_and_hms(2026, 2, 3, 14, 59, 21).unwrap();
    assert_eq!(parse_created_at("2026-02-03 14:59:21").unwrap(), want);
    assert_eq!(parse_created_at("2026-02-03T15:59:21+01:00").unwrap(), want);
    assert!(parse_created_at("03/02/2026").is_err());
  }

  #[test]
  fn restore_requires_role() {
    let parsed = Cli::try_parse_from(["roster", "restore", "--target", "41", "--subject", "7"]);
    assert!(parsed.is_err());

    let parsed = Cli::try_parse_from([
      "roster", "restore", "--target", "41", "--subject", "7", "--role", "ft_tester",
    ])
    .unwrap();
    assert!(matches!(parsed.command, Command::Restore { target: 41, subject: 7, .. }));
  }

  #[test]
  fn restore_rejects_blank_role() {
    for role in ["", "   "] {
      let parsed = Cli::try_parse_from([
        "roster", "restore", "--target", "41", "--subject", "7", "--role", role,
      ]);
      assert!(parsed.is_err(), "accepted role {role:?}");
    }

    let parsed = Cli::try_parse_from([
      "roster", "restore", "--target", "41", "--subject", "7", "--role", " at_tester ",
    ])
    .unwrap();
    let Command::Restore { role, .. } = parsed.command else { panic!("expected restore") };
    assert_eq!(role, Role::AtTester);
  }

  #[test]
  fn remove_defaults_to_dry_run() {
    let parsed =
      Cli::try_parse_from(["roster", "remove", "--scope", "3", "--subject", "7"]).unwrap();
    let Command::Remove { apply, .. } = parsed.command else { panic!("expected remove") };
    assert_eq!(mode(apply), RemovalMode::DryRun);
  }

  #[test]
  fn missing_config_file_is_not_an_error() {
    assert!(load_settings(Path::new("/nonexistent/roster.toml")).is_ok());
  }

  #[test]
  fn expand_tilde_leaves_plain_paths() {
    assert_eq!(expand_tilde(Path::new("/var/db/tracker.db")), PathBuf::from("/var/db/tracker.db"));
  }
}
