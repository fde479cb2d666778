//! Scoped subprocess execution.
//!
//! Every toolchain invocation goes through [`run_command`]: structured argv
//! (no shell), bounded wall clock, capped output capture on drain threads,
//! and a guarantee that the child is reaped on every exit path. On unix the
//! child gets its own process group so a timeout can take the whole tree
//! down, plus CPU/core rlimits.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use polyconf_langs::CommandSpec;

#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub wall_timeout: Duration,
    pub max_output_bytes: usize,
    pub cpu_time_limit_seconds: u64,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        ProcessLimits {
            wall_timeout: Duration::from_secs(60),
            max_output_bytes: 8 * 1024 * 1024,
            cpu_time_limit_seconds: 60,
        }
    }
}

#[derive(Debug)]
pub struct ChildOutput {
    pub pid: u32,
    pub exit_status: i32,
    pub exit_signal: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ChildOutput {
    pub fn ok(&self) -> bool {
        !self.timed_out
            && !self.cancelled
            && self.exit_status == 0
            && !self.stdout_truncated
            && !self.stderr_truncated
    }

    /// Last `max_bytes` of stderr, lossily decoded, for failure records.
    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let tail = tail_truncate(&self.stderr, max_bytes);
        String::from_utf8_lossy(&tail).trim().to_string()
    }
}

/// Spawn failure is a value, not an `Err`: a missing or unexecutable
/// toolchain is a per-run outcome the session records, never a fault that
/// aborts unrelated runs.
#[derive(Debug)]
pub enum Exec {
    Completed(ChildOutput),
    SpawnFailed { program: String, detail: String },
}

pub fn run_command(
    spec: &CommandSpec,
    default_cwd: &Path,
    limits: &ProcessLimits,
    cancel: Option<&AtomicBool>,
) -> Result<Exec> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.current_dir(spec.cwd.as_deref().unwrap_or(default_cwd));
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        let cpu_limit = limits.cpu_time_limit_seconds;
        unsafe {
            cmd.pre_exec(move || {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                apply_rlimits(cpu_limit)
            });
        }
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return Ok(Exec::SpawnFailed {
                program: spec.program.clone(),
                detail: err.to_string(),
            })
        }
    };
    let pid = child.id();

    let stdout = child.stdout.take().context("take stdout")?;
    let stderr = child.stderr.take().context("take stderr")?;

    let stdout_cap = limits.max_output_bytes.saturating_add(1);
    let stdout_thread = std::thread::spawn(move || -> std::io::Result<(Vec<u8>, bool)> {
        read_to_end_capped(stdout, stdout_cap)
    });

    let stderr_cap = 256usize * 1024;
    let stderr_thread = std::thread::spawn(move || -> std::io::Result<(Vec<u8>, bool)> {
        read_to_end_capped(stderr, stderr_cap)
    });

    let wait = wait_child_with_wall_timeout(&mut child, limits.wall_timeout, cancel)?;
    let (stdout_bytes, stdout_truncated) = stdout_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))?;
    let (stderr_bytes, stderr_truncated) = stderr_thread
        .join()
        .unwrap_or_else(|_| Ok((Vec::new(), false)))?;

    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        wait.status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    let exit_status = match wait.status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    };

    Ok(Exec::Completed(ChildOutput {
        pid,
        exit_status,
        exit_signal,
        timed_out: wait.timed_out,
        cancelled: wait.cancelled,
        stdout: stdout_bytes,
        stderr: stderr_bytes,
        stdout_truncated,
        stderr_truncated,
    }))
}

struct WaitResult {
    status: std::process::ExitStatus,
    timed_out: bool,
    cancelled: bool,
}

fn wait_child_with_wall_timeout(
    child: &mut std::process::Child,
    wall_limit: Duration,
    cancel: Option<&AtomicBool>,
) -> Result<WaitResult> {
    let deadline = Instant::now().checked_add(wall_limit);

    loop {
        if let Some(status) = child.try_wait().context("try_wait child")? {
            return Ok(WaitResult {
                status,
                timed_out: false,
                cancelled: false,
            });
        }
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            let status = kill_and_reap(child)?;
            return Ok(WaitResult {
                status,
                timed_out: false,
                cancelled: true,
            });
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let status = kill_and_reap(child)?;
            return Ok(WaitResult {
                status,
                timed_out: true,
                cancelled: false,
            });
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Kill the child's whole process group (it is its own group leader on
/// unix), then the child itself, then wait so nothing is left unreaped.
fn kill_and_reap(child: &mut std::process::Child) -> Result<std::process::ExitStatus> {
    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        unsafe {
            let _ = libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    child.wait().context("wait child after kill")
}

#[cfg(unix)]
fn apply_rlimits(cpu_time_limit_seconds: u64) -> std::io::Result<()> {
    unsafe {
        let cpu = libc::rlimit {
            rlim_cur: cpu_time_limit_seconds as libc::rlim_t,
            rlim_max: cpu_time_limit_seconds as libc::rlim_t,
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &cpu) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let core = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if libc::setrlimit(libc::RLIMIT_CORE, &core) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

pub fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }

        if truncated {
            continue;
        }

        let remaining = cap.saturating_sub(buf.len());
        if n <= remaining {
            buf.extend_from_slice(&tmp[..n]);
        } else {
            buf.extend_from_slice(&tmp[..remaining]);
            truncated = true;
        }
    }

    Ok((buf, truncated))
}

pub fn tail_truncate(bytes: &[u8], max: usize) -> Vec<u8> {
    if bytes.len() <= max {
        bytes.to_vec()
    } else {
        bytes[bytes.len() - max..].to_vec()
    }
}

/// The session-wide scratch tree, partitioned per language (and per run
/// underneath). Owned temp roots are removed on drop; user-supplied roots
/// are left in place.
#[derive(Debug)]
pub struct ScratchRoot {
    path: PathBuf,
    owned: bool,
}

impl ScratchRoot {
    pub fn temp() -> Result<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let base = std::env::temp_dir();
        let pid = std::process::id();

        for _ in 0..10_000 {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!("polyconf_{pid}_{n}"));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(ScratchRoot { path, owned: true }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create scratch dir: {}", path.display()))
                }
            }
        }
        anyhow::bail!("failed to create unique scratch dir under {}", base.display())
    }

    pub fn at(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("create scratch dir: {}", path.display()))?;
        Ok(ScratchRoot {
            path: path.to_path_buf(),
            owned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language_dir(&self, fixtures_root: &str) -> Result<PathBuf> {
        let dir = self.path.join(fixtures_root);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create language scratch dir: {}", dir.display()))?;
        Ok(dir)
    }
}

impl Drop for ScratchRoot {
    fn drop(&mut self) {
        if self.owned {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Per-run build directory, removed on every exit path.
#[derive(Debug)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    pub fn create(language_dir: &Path, name: &str) -> Result<Self> {
        let path = language_dir.join(sanitize_dir_name(name));
        if path.exists() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("clear stale run dir: {}", path.display()))?;
        }
        std::fs::create_dir_all(&path)
            .with_context(|| format!("create run dir: {}", path.display()))?;
        Ok(RunDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            c
        } else {
            '_'
        })
        .collect()
}
