//! Target-language descriptor registry.
//!
//! This crate exists so both:
//! - the runner (subprocess orchestration, diffing)
//! - CLI tooling (filtering, skip-list audits)
//!
//! can share one authoritative, read-only table of target languages: their
//! toolchain commands, diff mode, tolerances, and per-fixture-kind skip lists.
//!
//! Generated-program convention: for every language, the emitted source is a
//! standalone program that reads a JSON file path from argv[1], deserializes
//! it into the top-level type, and re-serializes the value to stdout. The
//! descriptors below only describe how to build and invoke that program; the
//! harness never inspects its internals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod registry;
pub mod select;

pub use select::{select, ExcludeReason, Selection};

/// A structured command: program, argv, optional working dir, environment
/// overrides. Never shell-interpolated text, so there is nothing to quote or
/// inject across platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// How pass/fail is judged for a language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[cfg_attr(feature = "clap", clap(rename_all = "kebab_case"))]
pub enum DiffMode {
    /// Program stdout is compared structurally against the canonical JSON.
    #[default]
    Direct,
    /// Two generator passes (sample, then derived schema) are compared for
    /// self-consistency instead, for languages that cannot round-trip
    /// arbitrary JSON faithfully.
    ViaSchema,
}

impl DiffMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffMode::Direct => "direct",
            DiffMode::ViaSchema => "via-schema",
        }
    }
}

/// Kind of a corpus entry. Skip lists apply per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureKind {
    Json,
    Schema,
}

/// One generator input plus everything the selector needs to stay pure.
///
/// `derived_schema` is resolved at corpus-scan time (a sibling
/// `<stem>.schema.json`, if present), so selection is a function of
/// descriptor + fixture only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub name: String,
    pub path: PathBuf,
    pub kind: FixtureKind,
    pub derived_schema: Option<PathBuf>,
}

impl Fixture {
    /// The schema to regenerate from in via-schema mode, if any.
    pub fn schema_source(&self) -> Option<&Path> {
        match self.kind {
            FixtureKind::Schema => Some(&self.path),
            FixtureKind::Json => self.derived_schema.as_deref(),
        }
    }
}

/// A named renderer-option overlay: a total key -> value mapping composed
/// over the base options, overlay winning on collision.
#[derive(Debug, Clone, Copy)]
pub struct OptionOverlay {
    pub label: &'static str,
    pub overrides: &'static [(&'static str, &'static str)],
}

impl OptionOverlay {
    pub fn compose(&self, base: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut out = base.clone();
        for (k, v) in self.overrides {
            out.insert((*k).to_string(), (*v).to_string());
        }
        out
    }
}

/// Immutable description of one target language's toolchain and known
/// limitations. Defined once, process-wide; never mutated at runtime.
#[derive(Debug, Clone, Copy)]
pub struct LanguageDescriptor {
    /// Unique across the registry.
    pub name: &'static str,
    /// Per-language scratch subdirectory name.
    pub fixtures_root: &'static str,
    /// One-time preparation per session (dependency restore and the like).
    pub setup: Option<fn() -> CommandSpec>,
    /// Build step; run per fixture, serialized per language.
    pub compile: Option<fn() -> CommandSpec>,
    /// Pure function of the sample path; no hidden session state.
    pub run_step: fn(&Path) -> CommandSpec,
    pub diff_mode: DiffMode,
    /// Tolerate absent fields where canonical JSON has explicit `null`.
    pub allow_missing_null: bool,
    /// Single generated file the compile/run steps assume exists.
    pub output_artifact: &'static str,
    pub top_level_type: &'static str,
    pub skip_json: &'static [&'static str],
    pub skip_schema: &'static [&'static str],
    /// Base options, used for the full fixture corpus.
    pub renderer_options: &'static [(&'static str, &'static str)],
    /// Named overlays exercised only against the smoke subset.
    pub quick_test_options: &'static [OptionOverlay],
}

impl LanguageDescriptor {
    /// The one typed exclusion query; skip-list membership is never checked
    /// anywhere else.
    pub fn excludes(&self, kind: FixtureKind, fixture_name: &str) -> bool {
        let list = match kind {
            FixtureKind::Json => self.skip_json,
            FixtureKind::Schema => self.skip_schema,
        };
        list.contains(&fixture_name)
    }

    pub fn base_options(&self) -> BTreeMap<String, String> {
        self.renderer_options
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }
}

/// The process-wide registry. Read-only for the duration of a session.
pub fn registry() -> &'static [LanguageDescriptor] {
    registry::REGISTRY
}

pub fn find(name: &str) -> Option<&'static LanguageDescriptor> {
    registry().iter().find(|l| l.name == name)
}

/// Audit every skip entry against the set of fixture names actually present
/// in the corpus. Returns language -> dangling entries; an empty map means
/// every skip entry still references a real fixture.
pub fn dangling_skips<'a, I>(corpus_names: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: std::collections::BTreeSet<&str> = corpus_names.into_iter().collect();
    let mut dangling = BTreeMap::new();
    for lang in registry() {
        let mut missing: Vec<String> = lang
            .skip_json
            .iter()
            .chain(lang.skip_schema.iter())
            .filter(|name| !present.contains(**name))
            .map(|name| (*name).to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            dangling.insert(lang.name.to_string(), missing);
        }
    }
    dangling
}
