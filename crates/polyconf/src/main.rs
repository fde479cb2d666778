use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use polyconf_contracts::{Outcome, Report, SkipAuditReport};
use polyconf_langs::{dangling_skips, registry, DiffMode, LanguageDescriptor};
use polyconf_runner::{corpus, CommandGenerator, ProcessLimits, ScratchRoot, Session, SessionConfig};

#[derive(Parser)]
#[command(name = "polyconf")]
#[command(about = "Cross-language conformance harness for a code generator.", long_about = None)]
struct Cli {
    /// Directory holding the canonical JSON samples and schema fixtures.
    #[arg(long)]
    fixtures: PathBuf,

    /// Generator binary. Each pass runs it twice (determinism check), and
    /// via-schema triples add a second pass from the derived schema.
    #[arg(long)]
    generator: Option<PathBuf>,

    /// Extra argument appended to every generator invocation.
    #[arg(long)]
    generator_arg: Vec<String>,

    /// Restrict the run to the named languages. Repeatable.
    #[arg(long)]
    language: Vec<String>,

    /// Restrict the run to languages using this diff mode.
    #[arg(long, value_enum)]
    diff_mode: Option<DiffMode>,

    /// Scratch directory to reuse instead of a throwaway temp dir.
    #[arg(long)]
    scratch: Option<PathBuf>,

    #[arg(long, default_value_t = 60)]
    timeout_seconds: u64,

    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    max_output_bytes: usize,

    #[arg(long, default_value_t = 60)]
    cpu_time_limit_seconds: u64,

    #[arg(long, default_value_t = 4)]
    jobs: usize,

    /// Stop enumerating new triples after the first failing outcome.
    #[arg(long)]
    fail_fast: bool,

    /// Write the JSON report here instead of stdout; stderr carries the
    /// summary either way.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the language registry and exit.
    #[arg(long)]
    list_languages: bool,

    /// Check every skip-list entry against the fixture corpus and exit.
    #[arg(long)]
    audit_skips: bool,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();

    if cli.list_languages {
        for lang in registry() {
            println!(
                "{}\tdiff={}\tquick-tests={}",
                lang.name,
                lang.diff_mode.as_str(),
                lang.quick_test_options.len()
            );
        }
        return Ok(std::process::ExitCode::SUCCESS);
    }

    let fixtures = corpus::scan(&cli.fixtures)
        .with_context(|| format!("scan fixtures: {}", cli.fixtures.display()))?;
    if fixtures.is_empty() {
        anyhow::bail!("no fixtures under {}", cli.fixtures.display());
    }

    if cli.audit_skips {
        let names = fixtures.iter().map(|f| f.name.as_str());
        let audit = SkipAuditReport::new(dangling_skips(names));
        println!("{}", serde_json::to_string_pretty(&audit)?);
        return Ok(if audit.is_clean() {
            std::process::ExitCode::SUCCESS
        } else {
            std::process::ExitCode::from(1)
        });
    }

    let generator_path = cli
        .generator
        .as_ref()
        .context("set --generator (or --list-languages / --audit-skips)")?;

    let languages = selected_languages(&cli)?;

    let limits = ProcessLimits {
        wall_timeout: Duration::from_secs(cli.timeout_seconds),
        max_output_bytes: cli.max_output_bytes,
        cpu_time_limit_seconds: cli.cpu_time_limit_seconds,
    };

    let mut generator = CommandGenerator::new(generator_path);
    generator.extra_args = cli.generator_arg.clone();
    generator.workdir = std::env::current_dir().context("resolve current directory")?;
    generator.limits = limits;

    let scratch = match &cli.scratch {
        Some(path) => ScratchRoot::at(path)?,
        None => ScratchRoot::temp()?,
    };

    let session = Session::new(
        &generator,
        scratch,
        SessionConfig {
            limits,
            jobs: cli.jobs,
            fail_fast: cli.fail_fast,
        },
    );
    let report = session.run(&languages, &fixtures)?;

    print_failures(&report);
    eprintln!(
        "polyconf: {} triples, {} equal, {} mismatched, {} excluded, {} skipped, \
         {} setup failures, {} generation failures, {} compile failures, {} timed out, {} spawn errors",
        report.summary.total,
        report.summary.equal,
        report.summary.mismatched,
        report.summary.excluded,
        report.summary.skipped,
        report.summary.setup_failed,
        report.summary.generation_failed,
        report.summary.compile_failed,
        report.summary.timed_out,
        report.summary.spawn_errors,
    );

    let mut body = serde_json::to_string_pretty(&report)?;
    body.push('\n');
    match &cli.report {
        Some(path) => std::fs::write(path, body)
            .with_context(|| format!("write report: {}", path.display()))?,
        None => print!("{body}"),
    }

    Ok(if report.summary.is_success() {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::from(1)
    })
}

fn selected_languages(cli: &Cli) -> Result<Vec<&'static LanguageDescriptor>> {
    let mut languages: Vec<&'static LanguageDescriptor> = registry().iter().collect();

    if !cli.language.is_empty() {
        for name in &cli.language {
            if polyconf_langs::find(name).is_none() {
                anyhow::bail!("unknown language: {name} (see --list-languages)");
            }
        }
        languages.retain(|lang| cli.language.iter().any(|n| n == lang.name));
    }
    if let Some(mode) = cli.diff_mode {
        languages.retain(|lang| lang.diff_mode == mode);
    }
    if languages.is_empty() {
        anyhow::bail!("language filters matched nothing");
    }
    Ok(languages)
}

fn print_failures(report: &Report) {
    for record in &report.results {
        if !record.outcome.is_failure() {
            continue;
        }
        let detail = match &record.outcome {
            Outcome::Mismatch {
                path,
                expected,
                actual,
            } => format!("at {path}: expected {expected}, got {actual}"),
            Outcome::SetupFailed { detail }
            | Outcome::GenerationFailed { detail }
            | Outcome::CompileFailed { detail }
            | Outcome::SpawnError { detail } => detail.clone(),
            Outcome::TimedOut { limit_ms } => format!("exceeded {limit_ms} ms"),
            Outcome::Equal | Outcome::Excluded { .. } | Outcome::Skipped { .. } => continue,
        };
        eprintln!(
            "FAIL {} {} [{}] {}: {}",
            record.language,
            record.fixture,
            record.options,
            record.outcome.label(),
            detail
        );
    }
}
