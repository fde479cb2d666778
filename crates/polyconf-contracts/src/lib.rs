//! Shared, version-pinned report contracts.
//!
//! These constants and types are the single source of truth for the
//! machine-readable output of the conformance harness. Anything that parses a
//! harness report programs against this crate, not against ad hoc JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const POLYCONF_REPORT_SCHEMA_VERSION: &str = "polyconf.report@0.1.0";
pub const POLYCONF_SKIP_AUDIT_SCHEMA_VERSION: &str = "polyconf.skip-audit@0.1.0";

/// Terminal outcome of one (language, fixture, option set) triple.
///
/// Every kind is surfaced distinctly; `Mismatch` is the only kind that
/// represents a behavioral regression in generated code. Everything else is
/// an infrastructure or capability signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Equal,
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },
    /// Permanently excluded by a skip list or a missing capability.
    Excluded { reason: String },
    /// Short-circuited because a prerequisite for the whole language failed.
    Skipped { reason: String },
    SetupFailed { detail: String },
    GenerationFailed { detail: String },
    CompileFailed { detail: String },
    TimedOut { limit_ms: u64 },
    SpawnError { detail: String },
}

impl Outcome {
    /// True for outcomes that make the harness exit nonzero.
    ///
    /// `Excluded` and `Skipped` never fail the session on their own; a
    /// `Skipped` run always has a sibling `SetupFailed` record that does.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Outcome::Mismatch { .. }
                | Outcome::SetupFailed { .. }
                | Outcome::GenerationFailed { .. }
                | Outcome::CompileFailed { .. }
                | Outcome::TimedOut { .. }
                | Outcome::SpawnError { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Equal => "equal",
            Outcome::Mismatch { .. } => "mismatch",
            Outcome::Excluded { .. } => "excluded",
            Outcome::Skipped { .. } => "skipped",
            Outcome::SetupFailed { .. } => "setup_failed",
            Outcome::GenerationFailed { .. } => "generation_failed",
            Outcome::CompileFailed { .. } => "compile_failed",
            Outcome::TimedOut { .. } => "timed_out",
            Outcome::SpawnError { .. } => "spawn_error",
        }
    }
}

/// One record per executed (or excluded) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub language: String,
    pub fixture: String,
    /// `"default"` for the base renderer options, otherwise the overlay label.
    pub options: String,
    pub outcome: Outcome,
    pub wall_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub total: u64,
    pub equal: u64,
    pub mismatched: u64,
    pub excluded: u64,
    pub skipped: u64,
    pub setup_failed: u64,
    pub generation_failed: u64,
    pub compile_failed: u64,
    pub timed_out: u64,
    pub spawn_errors: u64,
}

impl Summary {
    pub fn tally(records: &[RunRecord]) -> Self {
        let mut s = Summary::default();
        for r in records {
            s.total += 1;
            match &r.outcome {
                Outcome::Equal => s.equal += 1,
                Outcome::Mismatch { .. } => s.mismatched += 1,
                Outcome::Excluded { .. } => s.excluded += 1,
                Outcome::Skipped { .. } => s.skipped += 1,
                Outcome::SetupFailed { .. } => s.setup_failed += 1,
                Outcome::GenerationFailed { .. } => s.generation_failed += 1,
                Outcome::CompileFailed { .. } => s.compile_failed += 1,
                Outcome::TimedOut { .. } => s.timed_out += 1,
                Outcome::SpawnError { .. } => s.spawn_errors += 1,
            }
        }
        s
    }

    /// Zero exit status iff every non-excluded triple is `Equal`.
    pub fn is_success(&self) -> bool {
        self.mismatched == 0
            && self.setup_failed == 0
            && self.generation_failed == 0
            && self.compile_failed == 0
            && self.timed_out == 0
            && self.spawn_errors == 0
    }
}

/// Top-level harness report.
///
/// Serialization is deterministic as long as `results` is sorted and map
/// fields use `BTreeMap`; the session sorts records before building this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub summary: Summary,
    pub results: Vec<RunRecord>,
}

impl Report {
    pub fn new(records: Vec<RunRecord>) -> Self {
        let summary = Summary::tally(&records);
        Report {
            schema_version: POLYCONF_REPORT_SCHEMA_VERSION.to_string(),
            summary,
            results: records,
        }
    }
}

/// Report emitted by the skip-list audit (`validate_skips`).
///
/// A dangling entry names a fixture that no longer exists in the corpus; it
/// is a latent bug in the descriptor table, not a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipAuditReport {
    pub schema_version: String,
    /// language name -> dangling skip entries for that language.
    pub dangling: BTreeMap<String, Vec<String>>,
}

impl SkipAuditReport {
    pub fn new(dangling: BTreeMap<String, Vec<String>>) -> Self {
        SkipAuditReport {
            schema_version: POLYCONF_SKIP_AUDIT_SCHEMA_VERSION.to_string(),
            dangling,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty()
    }
}
