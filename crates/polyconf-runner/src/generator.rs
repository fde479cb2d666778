//! The generator collaborator boundary.
//!
//! The harness never inspects generator internals: it hands over a fixture,
//! a language name, renderer options, and the artifact/type names, and gets
//! back source text or a typed failure. Determinism is verified at this
//! boundary by hashing two generation passes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use polyconf_langs::CommandSpec;
use sha2::{Digest, Sha256};

use crate::process::{run_command, Exec, ProcessLimits};

#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub fixture_path: &'a Path,
    pub language: &'a str,
    pub options: &'a BTreeMap<String, String>,
    pub output_artifact: &'a str,
    pub top_level_type: &'a str,
}

/// Generator failure is a value: it ends the run as `GenerationFailed` and
/// is never conflated with a toolchain failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Source(String),
    Failed { detail: String },
}

pub trait Generator: Sync {
    fn generate(&self, req: &GenerateRequest<'_>) -> Result<Generation>;
}

/// Subprocess-backed generator: one structured invocation per pass, source
/// text on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    pub program: PathBuf,
    pub extra_args: Vec<String>,
    pub workdir: PathBuf,
    pub limits: ProcessLimits,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandGenerator {
            program: program.into(),
            extra_args: Vec::new(),
            workdir: PathBuf::from("."),
            limits: ProcessLimits::default(),
        }
    }

    fn command(&self, req: &GenerateRequest<'_>) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program.display().to_string())
            .args(["--lang", req.language])
            .args(["--top-level", req.top_level_type])
            .args(["--out-name", req.output_artifact])
            .arg("--src")
            .arg(req.fixture_path.display().to_string());
        for (key, value) in req.options {
            spec = spec.arg(format!("--{key}")).arg(value.clone());
        }
        for extra in &self.extra_args {
            spec = spec.arg(extra.clone());
        }
        spec
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, req: &GenerateRequest<'_>) -> Result<Generation> {
        let spec = self.command(req);
        match run_command(&spec, &self.workdir, &self.limits, None)? {
            Exec::SpawnFailed { program, detail } => Ok(Generation::Failed {
                detail: format!("failed to spawn generator {program}: {detail}"),
            }),
            Exec::Completed(out) if out.ok() => {
                Ok(Generation::Source(String::from_utf8_lossy(&out.stdout).into_owned()))
            }
            Exec::Completed(out) => Ok(Generation::Failed {
                detail: format!(
                    "generator exited {}: {}",
                    out.exit_status,
                    out.stderr_tail(2000)
                ),
            }),
        }
    }
}

/// Generate twice and require byte-identical output. A generator that is not
/// a pure function of its inputs cannot anchor a conformance verdict.
pub fn generate_deterministic(gen: &dyn Generator, req: &GenerateRequest<'_>) -> Result<Generation> {
    let first = match gen.generate(req)? {
        Generation::Source(text) => text,
        failed => return Ok(failed),
    };
    let second = match gen.generate(req)? {
        Generation::Source(text) => text,
        failed => return Ok(failed),
    };

    let h1 = digest_hex(&first);
    let h2 = digest_hex(&second);
    if h1 != h2 {
        return Ok(Generation::Failed {
            detail: format!("nondeterministic generator output: sha256 {h1} != {h2}"),
        });
    }
    Ok(Generation::Source(first))
}

fn digest_hex(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlipFlop {
        calls: AtomicUsize,
    }

    impl Generator for FlipFlop {
        fn generate(&self, _req: &GenerateRequest<'_>) -> Result<Generation> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(Generation::Source(format!("pass {n}")))
        }
    }

    struct Fixed(&'static str);

    impl Generator for Fixed {
        fn generate(&self, _req: &GenerateRequest<'_>) -> Result<Generation> {
            Ok(Generation::Source(self.0.to_string()))
        }
    }

    fn req<'a>(options: &'a BTreeMap<String, String>) -> GenerateRequest<'a> {
        GenerateRequest {
            fixture_path: Path::new("inputs/list.json"),
            language: "golang",
            options,
            output_artifact: "top_level.go",
            top_level_type: "TopLevel",
        }
    }

    #[test]
    fn deterministic_generator_passes_the_double_check() {
        let options = BTreeMap::new();
        let out = generate_deterministic(&Fixed("package main\n"), &req(&options)).unwrap();
        assert_eq!(out, Generation::Source("package main\n".to_string()));
    }

    #[test]
    fn nondeterministic_generator_is_a_generation_failure() {
        let options = BTreeMap::new();
        let gen = FlipFlop {
            calls: AtomicUsize::new(0),
        };
        match generate_deterministic(&gen, &req(&options)).unwrap() {
            Generation::Failed { detail } => {
                assert!(detail.contains("nondeterministic"), "{detail}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn command_line_includes_options_in_sorted_order() {
        let mut options = BTreeMap::new();
        options.insert("density".to_string(), "dense".to_string());
        options.insert("array-type".to_string(), "list".to_string());

        let gen = CommandGenerator::new("polygen");
        let spec = gen.command(&req(&options));
        assert_eq!(spec.program, "polygen");

        let args = spec.args.join(" ");
        assert!(args.contains("--lang golang"), "{args}");
        assert!(args.contains("--array-type list"), "{args}");
        assert!(args.contains("--density dense"), "{args}");
        let a = args.find("--array-type").unwrap();
        let d = args.find("--density").unwrap();
        assert!(a < d, "options must be emitted in stable order: {args}");
    }
}
