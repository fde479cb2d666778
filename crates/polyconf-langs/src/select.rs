//! Fixture selection: decide run / exclude per (language, fixture).
//!
//! Pure and deterministic given descriptor + fixture; no I/O happens here.

use crate::{DiffMode, Fixture, LanguageDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    /// The fixture is on the language's skip list for its kind.
    SkipListed,
    /// Via-schema diffing was requested but no schema is derivable from the
    /// fixture. Excluding beats silently downgrading to a weaker check.
    NoDerivableSchema,
}

impl ExcludeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExcludeReason::SkipListed => "skip list",
            ExcludeReason::NoDerivableSchema => "no derivable schema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Run(DiffMode),
    Exclude(ExcludeReason),
}

/// Skip lists apply independently per fixture kind, regardless of the
/// language's diff mode: a schema-skip holds even when diffing is direct.
pub fn select(lang: &LanguageDescriptor, fixture: &Fixture) -> Selection {
    if lang.excludes(fixture.kind, &fixture.name) {
        return Selection::Exclude(ExcludeReason::SkipListed);
    }

    match lang.diff_mode {
        DiffMode::Direct => Selection::Run(DiffMode::Direct),
        DiffMode::ViaSchema => {
            if fixture.schema_source().is_some() {
                Selection::Run(DiffMode::ViaSchema)
            } else {
                Selection::Exclude(ExcludeReason::NoDerivableSchema)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{find, FixtureKind};
    use std::path::PathBuf;

    fn json_fixture(name: &str, derived_schema: Option<&str>) -> Fixture {
        Fixture {
            name: name.to_string(),
            path: PathBuf::from("inputs").join(name),
            kind: FixtureKind::Json,
            derived_schema: derived_schema.map(PathBuf::from),
        }
    }

    fn schema_fixture(name: &str) -> Fixture {
        Fixture {
            name: name.to_string(),
            path: PathBuf::from("schemas").join(name),
            kind: FixtureKind::Schema,
            derived_schema: None,
        }
    }

    #[test]
    fn golang_skips_identifiers_json() {
        let golang = find("golang").unwrap();
        let sel = select(golang, &json_fixture("identifiers.json", None));
        assert_eq!(sel, Selection::Exclude(ExcludeReason::SkipListed));
    }

    #[test]
    fn golang_runs_list_json_via_schema() {
        let golang = find("golang").unwrap();
        let sel = select(
            golang,
            &json_fixture("list.json", Some("inputs/list.schema.json")),
        );
        assert_eq!(sel, Selection::Run(DiffMode::ViaSchema));
    }

    #[test]
    fn via_schema_without_derivable_schema_excludes() {
        let golang = find("golang").unwrap();
        let sel = select(golang, &json_fixture("list.json", None));
        assert_eq!(sel, Selection::Exclude(ExcludeReason::NoDerivableSchema));
    }

    #[test]
    fn schema_fixtures_are_their_own_schema_source() {
        let golang = find("golang").unwrap();
        let sel = select(golang, &schema_fixture("list.schema.json"));
        assert_eq!(sel, Selection::Run(DiffMode::ViaSchema));
    }

    #[test]
    fn schema_skip_applies_even_for_direct_languages() {
        // A fixture name listed in skip_schema must be excluded for its kind
        // no matter how the language diffs.
        let golang = find("golang").unwrap();
        let sel = select(golang, &schema_fixture("union-constraints.schema.json"));
        assert_eq!(sel, Selection::Exclude(ExcludeReason::SkipListed));

        // The same name as a JSON fixture is not excluded: lists are per kind.
        let sel = select(
            golang,
            &json_fixture("union-constraints.schema.json", Some("s.json")),
        );
        assert_eq!(sel, Selection::Run(DiffMode::ViaSchema));
    }

    #[test]
    fn direct_language_runs_plain_json() {
        let csharp = find("csharp").unwrap();
        let sel = select(csharp, &json_fixture("list.json", None));
        assert_eq!(sel, Selection::Run(DiffMode::Direct));
    }

    #[test]
    fn selection_is_deterministic() {
        let golang = find("golang").unwrap();
        let fixture = json_fixture("list.json", Some("inputs/list.schema.json"));
        assert_eq!(select(golang, &fixture), select(golang, &fixture));
    }
}
