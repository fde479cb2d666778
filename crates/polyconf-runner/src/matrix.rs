//! Renderer-option matrix expansion.
//!
//! The full corpus runs once with a language's base options; each named
//! quick-test overlay runs against the smoke subset only, bounding the
//! options x fixtures x languages cost while still catching option-specific
//! regressions. The sequence is lazy so fail-fast consumers can stop early.

use std::collections::BTreeMap;

use polyconf_langs::{Fixture, LanguageDescriptor};

use crate::corpus::smoke_subset;

pub const DEFAULT_OPTIONS_LABEL: &str = "default";

#[derive(Debug, Clone)]
pub struct OptionJob {
    pub label: String,
    pub options: BTreeMap<String, String>,
    pub fixtures: Vec<Fixture>,
}

pub fn enumerate<'a>(
    lang: &'a LanguageDescriptor,
    corpus: &'a [Fixture],
) -> impl Iterator<Item = OptionJob> + 'a {
    let base = std::iter::once_with(move || OptionJob {
        label: DEFAULT_OPTIONS_LABEL.to_string(),
        options: lang.base_options(),
        fixtures: corpus.to_vec(),
    });

    let quick = lang.quick_test_options.iter().map(move |overlay| OptionJob {
        label: overlay.label.to_string(),
        options: overlay.compose(&lang.base_options()),
        fixtures: smoke_subset(corpus),
    });

    base.chain(quick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyconf_langs::{find, FixtureKind};
    use std::path::PathBuf;

    fn fixture(name: &str) -> Fixture {
        Fixture {
            name: name.to_string(),
            path: PathBuf::from(name),
            kind: FixtureKind::Json,
            derived_schema: None,
        }
    }

    fn corpus() -> Vec<Fixture> {
        vec![
            fixture("a.json"),
            fixture("b.json"),
            fixture("c.json"),
            fixture("d.json"),
            fixture("e.json"),
            fixture("list.json"),
        ]
    }

    #[test]
    fn base_job_covers_the_full_corpus() {
        let csharp = find("csharp").unwrap();
        let corpus = corpus();
        let jobs: Vec<OptionJob> = enumerate(csharp, &corpus).collect();

        assert_eq!(jobs[0].label, DEFAULT_OPTIONS_LABEL);
        assert_eq!(jobs[0].fixtures.len(), corpus.len());
        assert_eq!(jobs[0].options["array-type"], "array");
    }

    #[test]
    fn quick_test_overlays_run_the_smoke_subset_only() {
        let csharp = find("csharp").unwrap();
        let corpus = corpus();
        let jobs: Vec<OptionJob> = enumerate(csharp, &corpus).collect();

        // csharp carries the array-type=list quick test from its descriptor.
        let list_job = jobs
            .iter()
            .find(|j| j.label == "array-type=list")
            .expect("quick-test overlay present");
        assert_eq!(list_job.options["array-type"], "list");
        assert!(list_job.fixtures.len() < corpus.len());
        assert!(list_job.fixtures.iter().any(|f| f.name == "list.json"));
    }

    #[test]
    fn overlay_jobs_are_reported_under_their_own_label() {
        let csharp = find("csharp").unwrap();
        let corpus = corpus();
        let labels: Vec<String> = enumerate(csharp, &corpus).map(|j| j.label).collect();
        assert_eq!(labels.len(), 1 + csharp.quick_test_options.len());
        assert_eq!(labels[0], DEFAULT_OPTIONS_LABEL);
        assert!(labels.contains(&"array-type=list".to_string()));
    }

    #[test]
    fn languages_without_quick_tests_yield_one_job() {
        let elm = find("elm").unwrap();
        let corpus = corpus();
        assert_eq!(enumerate(elm, &corpus).count(), 1);
    }
}
