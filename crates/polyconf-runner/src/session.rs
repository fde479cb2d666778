//! Session scheduling: one terminal outcome per (language, fixture, option
//! set) triple.
//!
//! Triples run in parallel on a bounded worker pool; each run is isolated to
//! its own scratch directory and subprocess tree. The only shared mutable
//! state is per-language: a one-time setup cell and the compile critical
//! section (at most one in-flight compile per language). Within a language,
//! setup strictly precedes compiles, which strictly precede runs; across
//! languages nothing is ordered.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use polyconf_contracts::{Outcome, Report, RunRecord};
use polyconf_langs::{select, DiffMode, Fixture, LanguageDescriptor, Selection};
use serde_json::Value;

use crate::diff::{diff_source_texts, diff_values, DiffTolerance};
use crate::generator::{generate_deterministic, GenerateRequest, Generation, Generator};
use crate::matrix;
use crate::process::{run_command, Exec, ProcessLimits, RunDir, ScratchRoot};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub limits: ProcessLimits,
    pub jobs: usize,
    pub fail_fast: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            limits: ProcessLimits::default(),
            jobs: 1,
            fail_fast: false,
        }
    }
}

pub struct Session<'g> {
    generator: &'g dyn Generator,
    scratch: ScratchRoot,
    config: SessionConfig,
}

struct LangState {
    scratch_dir: std::path::PathBuf,
    setup: OnceCell<SetupState>,
    compile_lock: Mutex<()>,
}

struct SetupState {
    error: Option<String>,
    wall_ms: u64,
}

struct Triple {
    lang_idx: usize,
    label: Arc<str>,
    options: Arc<BTreeMap<String, String>>,
    fixture: Fixture,
}

impl<'g> Session<'g> {
    pub fn new(generator: &'g dyn Generator, scratch: ScratchRoot, config: SessionConfig) -> Self {
        Session {
            generator,
            scratch,
            config,
        }
    }

    /// Run every enumerated triple and return the aggregated report.
    ///
    /// Per-run failures are outcome values; an `Err` here means the harness
    /// itself could not operate (scratch tree unusable, corpus unreadable).
    pub fn run(
        &self,
        languages: &[&LanguageDescriptor],
        corpus: &[Fixture],
    ) -> Result<Report> {
        let states: Vec<LangState> = languages
            .iter()
            .map(|lang| {
                Ok(LangState {
                    scratch_dir: self.scratch.language_dir(lang.fixtures_root)?,
                    setup: OnceCell::new(),
                    compile_lock: Mutex::new(()),
                })
            })
            .collect::<Result<_>>()?;

        let cancel = AtomicBool::new(false);
        let records: Mutex<Vec<RunRecord>> = Mutex::new(Vec::new());

        let triples = languages.iter().copied().enumerate().flat_map(|(li, lang)| {
            matrix::enumerate(lang, corpus).flat_map(move |job| {
                let matrix::OptionJob {
                    label,
                    options,
                    fixtures,
                } = job;
                let label: Arc<str> = Arc::from(label.as_str());
                let options = Arc::new(options);
                fixtures.into_iter().map(move |fixture| Triple {
                    lang_idx: li,
                    label: Arc::clone(&label),
                    options: Arc::clone(&options),
                    fixture,
                })
            })
        });
        let queue = Mutex::new(triples);

        let workers = self.config.jobs.max(1);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let triple = match queue.lock().unwrap().next() {
                        Some(triple) => triple,
                        None => break,
                    };
                    let lang = languages[triple.lang_idx];
                    let state = &states[triple.lang_idx];

                    let started = Instant::now();
                    let outcome = self
                        .run_triple(lang, state, &triple, &cancel)
                        .unwrap_or_else(|err| Outcome::SpawnError {
                            detail: format!("harness error: {err:#}"),
                        });
                    let record = RunRecord {
                        language: lang.name.to_string(),
                        fixture: triple.fixture.name.clone(),
                        options: triple.label.to_string(),
                        outcome,
                        wall_ms: started.elapsed().as_millis() as u64,
                    };

                    if self.config.fail_fast && record.outcome.is_failure() {
                        cancel.store(true, Ordering::Relaxed);
                    }
                    records.lock().unwrap().push(record);
                });
            }
        });

        let mut records = records.into_inner().unwrap();

        // One SetupFailed record per language whose setup ever ran and failed;
        // its dependent triples were recorded as Skipped above.
        for (lang, state) in languages.iter().zip(&states) {
            if let Some(setup) = state.setup.get() {
                if let Some(detail) = &setup.error {
                    records.push(RunRecord {
                        language: lang.name.to_string(),
                        fixture: "(setup)".to_string(),
                        options: "-".to_string(),
                        outcome: Outcome::SetupFailed {
                            detail: detail.clone(),
                        },
                        wall_ms: setup.wall_ms,
                    });
                }
            }
        }

        records.sort_by(|a, b| {
            (&a.language, &a.options, &a.fixture).cmp(&(&b.language, &b.options, &b.fixture))
        });
        Ok(Report::new(records))
    }

    fn run_triple(
        &self,
        lang: &LanguageDescriptor,
        state: &LangState,
        triple: &Triple,
        cancel: &AtomicBool,
    ) -> Result<Outcome> {
        let mode = match select(lang, &triple.fixture) {
            Selection::Exclude(reason) => {
                return Ok(Outcome::Excluded {
                    reason: reason.as_str().to_string(),
                })
            }
            Selection::Run(mode) => mode,
        };

        let setup = state.setup.get_or_init(|| self.run_setup(lang, state));
        if setup.error.is_some() {
            return Ok(Outcome::Skipped {
                reason: "setup failed".to_string(),
            });
        }

        let run_dir = RunDir::create(
            &state.scratch_dir,
            &format!("{}-{}", triple.label, triple.fixture.name),
        )?;

        let req = GenerateRequest {
            fixture_path: &triple.fixture.path,
            language: lang.name,
            options: &triple.options,
            output_artifact: lang.output_artifact,
            top_level_type: lang.top_level_type,
        };
        let source = match generate_deterministic(self.generator, &req)? {
            Generation::Failed { detail } => return Ok(Outcome::GenerationFailed { detail }),
            Generation::Source(text) => text,
        };
        let artifact_path = run_dir.path().join(lang.output_artifact);
        std::fs::write(&artifact_path, &source)
            .with_context(|| format!("write generated source: {}", artifact_path.display()))?;

        if let Some(compile) = lang.compile {
            let _compile_guard = state.compile_lock.lock().unwrap();
            match run_command(&compile(), run_dir.path(), &self.config.limits, Some(cancel))? {
                Exec::SpawnFailed { program, detail } => {
                    return Ok(Outcome::SpawnError {
                        detail: format!("{program}: {detail}"),
                    })
                }
                Exec::Completed(out) if out.cancelled => {
                    return Ok(Outcome::Skipped {
                        reason: "session cancelled".to_string(),
                    })
                }
                Exec::Completed(out) if out.timed_out => {
                    return Ok(Outcome::CompileFailed {
                        detail: format!(
                            "compile timed out after {}ms",
                            self.config.limits.wall_timeout.as_millis()
                        ),
                    })
                }
                Exec::Completed(out) if !out.ok() => {
                    return Ok(Outcome::CompileFailed {
                        detail: format!(
                            "compile exited {}: {}",
                            out.exit_status,
                            out.stderr_tail(2000)
                        ),
                    })
                }
                Exec::Completed(_) => {}
            }
        }

        let run_spec = (lang.run_step)(&triple.fixture.path);
        let out = match run_command(&run_spec, run_dir.path(), &self.config.limits, Some(cancel))? {
            Exec::SpawnFailed { program, detail } => {
                return Ok(Outcome::SpawnError {
                    detail: format!("{program}: {detail}"),
                })
            }
            Exec::Completed(out) => out,
        };
        if out.cancelled {
            return Ok(Outcome::Skipped {
                reason: "session cancelled".to_string(),
            });
        }
        if out.timed_out {
            return Ok(Outcome::TimedOut {
                limit_ms: self.config.limits.wall_timeout.as_millis() as u64,
            });
        }
        if out.stdout_truncated || out.stderr_truncated {
            return Ok(Outcome::Mismatch {
                path: "(stdout)".to_string(),
                expected: format!(
                    "output within {} bytes",
                    self.config.limits.max_output_bytes
                ),
                actual: "output exceeded cap".to_string(),
            });
        }
        if out.exit_status != 0 {
            // A crash of the generated program is a behavioral regression,
            // not a toolchain failure.
            return Ok(Outcome::Mismatch {
                path: "(process)".to_string(),
                expected: "exit status 0".to_string(),
                actual: format!("exit status {}: {}", out.exit_status, out.stderr_tail(800)),
            });
        }

        match mode {
            DiffMode::Direct => {
                let canonical_bytes = std::fs::read(&triple.fixture.path).with_context(|| {
                    format!("read canonical fixture: {}", triple.fixture.path.display())
                })?;
                let canonical: Value =
                    serde_json::from_slice(&canonical_bytes).with_context(|| {
                        format!("parse canonical fixture: {}", triple.fixture.path.display())
                    })?;
                let actual: Value = match serde_json::from_slice(&out.stdout) {
                    Ok(value) => value,
                    Err(err) => {
                        return Ok(Outcome::Mismatch {
                            path: "(stdout)".to_string(),
                            expected: "valid JSON".to_string(),
                            actual: err.to_string(),
                        })
                    }
                };
                Ok(diff_values(&canonical, &actual, &DiffTolerance::for_language(lang))
                    .into_outcome())
            }
            DiffMode::ViaSchema => {
                let schema = triple
                    .fixture
                    .schema_source()
                    .context("via-schema selection without a schema source")?;
                let schema_req = GenerateRequest {
                    fixture_path: schema,
                    ..req
                };
                let second = match generate_deterministic(self.generator, &schema_req)? {
                    Generation::Failed { detail } => {
                        return Ok(Outcome::GenerationFailed {
                            detail: format!("schema pass: {detail}"),
                        })
                    }
                    Generation::Source(text) => text,
                };
                Ok(diff_source_texts(&source, &second).into_outcome())
            }
        }
    }

    fn run_setup(&self, lang: &LanguageDescriptor, state: &LangState) -> SetupState {
        let Some(setup) = lang.setup else {
            return SetupState {
                error: None,
                wall_ms: 0,
            };
        };

        let started = Instant::now();
        let error = match run_command(&setup(), &state.scratch_dir, &self.config.limits, None) {
            Err(err) => Some(format!("{err:#}")),
            Ok(Exec::SpawnFailed { program, detail }) => Some(format!("{program}: {detail}")),
            Ok(Exec::Completed(out)) if !out.ok() => Some(format!(
                "setup exited {}: {}",
                out.exit_status,
                out.stderr_tail(2000)
            )),
            Ok(Exec::Completed(_)) => None,
        };
        SetupState {
            error,
            wall_ms: started.elapsed().as_millis() as u64,
        }
    }
}
