//! Conformance harness core for a polyglot code generator.
//!
//! Given a corpus of JSON samples and JSON-Schema files, the harness decides
//! per language and per fixture whether to run (fixture selector), drives the
//! generator and the language toolchain as scoped subprocesses (process
//! orchestration), and judges pass/fail under language-specific tolerances
//! (diff engine). Renderer-option quick tests expand into independent runs
//! over a fixed smoke subset.

pub mod corpus;
pub mod diff;
pub mod generator;
pub mod matrix;
pub mod process;
pub mod session;

pub use diff::{diff_source_texts, diff_values, DiffResult, DiffTolerance};
pub use generator::{
    generate_deterministic, CommandGenerator, GenerateRequest, Generation, Generator,
};
pub use process::{run_command, ChildOutput, Exec, ProcessLimits, RunDir, ScratchRoot};
pub use session::{Session, SessionConfig};
