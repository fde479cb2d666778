//! Fixture corpus discovery.
//!
//! The corpus is a directory tree of JSON samples and JSON-Schema files.
//! `<name>.schema.json` is a schema fixture; any other `.json` file is a
//! sample, and a sibling `<stem>.schema.json` (when present) becomes its
//! derived schema so via-schema languages can regenerate from it.

use std::path::Path;

use anyhow::{Context, Result};
use polyconf_langs::{Fixture, FixtureKind};
use walkdir::WalkDir;

pub const SCHEMA_SUFFIX: &str = ".schema.json";

/// Preferred smoke-subset members for quick-test option overlays.
pub const SMOKE_FIXTURES: &[&str] = &[
    "simple-object.json",
    "list.json",
    "nested.json",
    "union.json",
];

const SMOKE_FALLBACK_LEN: usize = 4;

pub fn scan(root: &Path) -> Result<Vec<Fixture>> {
    let mut fixtures = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk corpus: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".json") {
            continue;
        }

        let path = std::fs::canonicalize(entry.path())
            .with_context(|| format!("canonicalize fixture: {}", entry.path().display()))?;

        let kind = if name.ends_with(SCHEMA_SUFFIX) {
            FixtureKind::Schema
        } else {
            FixtureKind::Json
        };

        let derived_schema = match kind {
            FixtureKind::Schema => None,
            FixtureKind::Json => {
                let stem = name.trim_end_matches(".json");
                let sibling = path.with_file_name(format!("{stem}{SCHEMA_SUFFIX}"));
                sibling.is_file().then_some(sibling)
            }
        };

        fixtures.push(Fixture {
            name,
            path,
            kind,
            derived_schema,
        });
    }

    fixtures.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    Ok(fixtures)
}

/// The fixed smoke subset: preferred names when present, otherwise the first
/// few fixtures in sorted order so overlays always exercise something.
pub fn smoke_subset(corpus: &[Fixture]) -> Vec<Fixture> {
    let preferred: Vec<Fixture> = corpus
        .iter()
        .filter(|f| SMOKE_FIXTURES.contains(&f.name.as_str()))
        .cloned()
        .collect();
    if !preferred.is_empty() {
        return preferred;
    }
    corpus.iter().take(SMOKE_FALLBACK_LEN).cloned().collect()
}
