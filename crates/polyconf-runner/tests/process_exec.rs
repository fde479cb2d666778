#![cfg(unix)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use polyconf_langs::CommandSpec;
use polyconf_runner::{run_command, Exec, ProcessLimits};

fn limits(wall_ms: u64) -> ProcessLimits {
    ProcessLimits {
        wall_timeout: Duration::from_millis(wall_ms),
        max_output_bytes: 1024 * 1024,
        cpu_time_limit_seconds: 30,
    }
}

fn completed(exec: Exec) -> polyconf_runner::ChildOutput {
    match exec {
        Exec::Completed(out) => out,
        Exec::SpawnFailed { program, detail } => {
            panic!("unexpected spawn failure for {program}: {detail}")
        }
    }
}

#[test]
fn captures_stdout_and_exit_status() {
    let spec = CommandSpec::new("sh").args(["-c", "printf hello; exit 0"]);
    let out = completed(run_command(&spec, Path::new("."), &limits(5_000), None).unwrap());
    assert!(out.ok());
    assert_eq!(out.exit_status, 0);
    assert_eq!(out.stdout, b"hello");
}

#[test]
fn nonzero_exit_is_captured_not_an_error() {
    let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
    let out = completed(run_command(&spec, Path::new("."), &limits(5_000), None).unwrap());
    assert!(!out.ok());
    assert_eq!(out.exit_status, 3);
    assert_eq!(out.stderr_tail(100), "boom");
}

#[test]
fn missing_program_is_a_spawn_failure_value() {
    let spec = CommandSpec::new("polyconf-definitely-not-installed");
    match run_command(&spec, Path::new("."), &limits(5_000), None).unwrap() {
        Exec::SpawnFailed { program, .. } => {
            assert_eq!(program, "polyconf-definitely-not-installed")
        }
        Exec::Completed(out) => panic!("expected spawn failure, got exit {}", out.exit_status),
    }
}

#[test]
fn env_overrides_reach_the_child() {
    let spec = CommandSpec::new("sh")
        .args(["-c", "printf '%s' \"$POLYCONF_PROBE\""])
        .env("POLYCONF_PROBE", "42");
    let out = completed(run_command(&spec, Path::new("."), &limits(5_000), None).unwrap());
    assert_eq!(out.stdout, b"42");
}

#[test]
fn timeout_kills_and_reaps_the_process_tree() {
    let spec = CommandSpec::new("sh").args(["-c", "sleep 30"]);
    let started = Instant::now();
    let out = completed(run_command(&spec, Path::new("."), &limits(200), None).unwrap());

    assert!(out.timed_out);
    assert!(!out.ok());
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "timeout must fire long before the child would exit"
    );

    // The child was waited on; on linux a zombie or still-running child
    // would keep a /proc stat entry parented to us.
    #[cfg(target_os = "linux")]
    {
        let stat_path = format!("/proc/{}/stat", out.pid);
        if let Ok(stat) = std::fs::read_to_string(stat_path) {
            // stat is "pid (comm) state ppid ..."; comm may contain spaces.
            let after_comm = stat.rsplit_once(')').map(|(_, rest)| rest).unwrap_or("");
            let ppid: u32 = after_comm
                .split_whitespace()
                .nth(1)
                .and_then(|f| f.parse().ok())
                .unwrap_or(0);
            assert_ne!(ppid, std::process::id(), "child pid still parented to us");
        }
    }
}

#[test]
fn timeout_kills_grandchildren_too() {
    // sh spawns a grandchild sleep; killing only the direct child would
    // leave it running past the deadline.
    let spec = CommandSpec::new("sh").args(["-c", "sleep 30 & wait"]);
    let started = Instant::now();
    let out = completed(run_command(&spec, Path::new("."), &limits(200), None).unwrap());
    assert!(out.timed_out);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn stdout_cap_marks_truncation() {
    let small = ProcessLimits {
        wall_timeout: Duration::from_secs(10),
        max_output_bytes: 64,
        cpu_time_limit_seconds: 30,
    };
    let spec = CommandSpec::new("sh").args(["-c", "yes polyconf | head -c 4096"]);
    let out = completed(run_command(&spec, Path::new("."), &small, None).unwrap());
    assert!(out.stdout_truncated);
    assert!(!out.ok());
    assert!(out.stdout.len() <= 65);
}

#[test]
fn cancellation_terminates_a_running_child() {
    let cancel = AtomicBool::new(false);
    let spec = CommandSpec::new("sh").args(["-c", "sleep 30"]);

    let started = Instant::now();
    let out = std::thread::scope(|scope| {
        let handle = scope.spawn(|| {
            run_command(&spec, Path::new("."), &limits(60_000), Some(&cancel)).unwrap()
        });
        std::thread::sleep(Duration::from_millis(100));
        cancel.store(true, Ordering::Relaxed);
        completed(handle.join().unwrap())
    });

    assert!(out.cancelled);
    assert!(!out.timed_out);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn cwd_of_the_command_wins_over_default() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker"), "here").unwrap();

    let spec = CommandSpec::new("sh")
        .args(["-c", "cat marker"])
        .cwd(dir.path());
    let out = completed(run_command(&spec, Path::new("/"), &limits(5_000), None).unwrap());
    assert_eq!(out.stdout, b"here");
}
