//! External process execution
//!
//! Runs build-tool collaborators with piped output. Lines are streamed to
//! `tracing` (and an optional sink) as they arrive, while only a bounded
//! tail of each stream is kept for error reports. A timeout or cancellation
//! kills the child and reaps it before returning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::defaults::MAX_CAPTURED_OUTPUT;

/// How long to keep draining pipes after the child is gone
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Longer lines are split into chunks of this size
const MAX_LINE_BYTES: u64 = 8 * 1024;

/// Receives every output line as it is read
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program name or path
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl ProcessSpec {
    /// Create a spec for `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Add an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir`
    #[must_use]
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own
    Exited,
    /// Killed after exceeding its timeout
    TimedOut,
    /// Killed on cancellation
    Cancelled,
}

/// Exit status and captured output tails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// How the process ended
    pub termination: Termination,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Tail of standard output
    pub stdout: String,
    /// Tail of standard error
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == Some(0)
    }
}

/// Keeps the last `limit` bytes of a stream, cut at a line or char boundary
#[derive(Debug)]
struct TailBuffer {
    buf: String,
    limit: usize,
}

impl TailBuffer {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
        }
    }

    fn push_line(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
        if self.buf.len() > self.limit {
            let mut cut = self.buf.len() - self.limit;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }
}

type SharedTail = Arc<Mutex<TailBuffer>>;

fn take_tail(tail: &SharedTail) -> String {
    std::mem::take(&mut tail.lock().unwrap_or_else(PoisonError::into_inner).buf)
}

fn spawn_reader<R>(reader: Option<R>, label: String, sink: Option<LineSink>) -> (SharedTail, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let tail: SharedTail = Arc::new(Mutex::new(TailBuffer::new(MAX_CAPTURED_OUTPUT)));
    let shared = Arc::clone(&tail);

    let handle = tokio::spawn(async move {
        let Some(reader) = reader else { return };
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut raw).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\n', '\r']);
            tracing::debug!(target: "kiln::process", "[{label}] {line}");
            if let Some(sink) = &sink {
                sink(line);
            }
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_line(line);
        }
    });

    (tail, handle)
}

async fn drain(mut handle: JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await.is_err() {
        // A grandchild still holds the pipe open
        handle.abort();
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Run `spec` to completion, timeout, or cancellation
///
/// Only a failure to spawn is an `Err`; a non-zero exit, a timeout and a
/// cancellation are reported through [`ProcessOutput::termination`].
pub async fn run(
    spec: &ProcessSpec,
    label: &str,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    sink: Option<LineSink>,
) -> std::io::Result<ProcessOutput> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    tracing::info!("[{label}] {}", spec.display());
    let mut child = cmd.spawn()?;

    let (stdout_tail, stdout_task) =
        spawn_reader(child.stdout.take(), format!("{label}:out"), sink.clone());
    let (stderr_tail, stderr_task) =
        spawn_reader(child.stderr.take(), format!("{label}:err"), sink);

    let (termination, exit_code) = tokio::select! {
        status = child.wait() => (Termination::Exited, status?.code()),
        () = deadline(timeout) => (Termination::TimedOut, None),
        () = cancel.cancelled() => (Termination::Cancelled, None),
    };

    if termination != Termination::Exited {
        tracing::warn!("[{label}] {termination:?}, killing child process");
        if let Err(e) = child.kill().await {
            tracing::warn!("[{label}] Failed to kill child process: {e}");
        }
    }

    drain(stdout_task).await;
    drain(stderr_task).await;

    Ok(ProcessOutput {
        termination,
        exit_code,
        stdout: take_tail(&stdout_tail),
        stderr: take_tail(&stderr_tail),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_tail_buffer_keeps_end() {
        let mut tail = TailBuffer::new(10);
        tail.push_line("first line");
        tail.push_line("last");
        assert_eq!(tail.buf.len(), 10);
        assert!(tail.buf.ends_with("last\n"));
    }

    #[test]
    fn test_tail_buffer_respects_char_boundaries() {
        let mut tail = TailBuffer::new(4);
        tail.push_line("ééé");
        assert!(tail.buf.len() <= 4);
        assert!(tail.buf.ends_with('\n'));
    }

    #[test]
    fn test_spec_display() {
        let spec = ProcessSpec::new("cmake").args(["--build", "build"]);
        assert_eq!(spec.display(), "cmake --build build");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let out = run(
            &sh("echo hello; echo oops >&2; exit 3"),
            "test",
            None,
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(out.termination, Termination::Exited);
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unterminated_output_is_chunked() {
        let longest = Arc::new(Mutex::new(0usize));
        let seen = Arc::clone(&longest);
        let sink: LineSink = Arc::new(move |line: &str| {
            let mut max = seen.lock().unwrap();
            *max = (*max).max(line.len());
        });

        let out = run(
            &sh("head -c 200000 /dev/zero | tr '\\0' a"),
            "test",
            None,
            &CancellationToken::new(),
            Some(sink),
        )
        .await
        .unwrap();

        assert!(out.success());
        assert_eq!(*longest.lock().unwrap(), MAX_LINE_BYTES as usize);
        assert!(out.stdout.len() <= MAX_CAPTURED_OUTPUT);
        assert!(out.stdout.ends_with("a\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_directory_with_env() {
        let temp = tempfile::TempDir::new().unwrap();
        let spec = sh("pwd; echo $KILN_TEST_VALUE")
            .current_dir(temp.path())
            .env("KILN_TEST_VALUE", "42");

        let out = run(&spec, "test", None, &CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.ends_with("42\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sink_receives_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&lines);
        let sink: LineSink = Arc::new(move |line: &str| {
            collected.lock().unwrap().push(line.to_string());
        });

        run(&sh("echo a; echo b"), "test", None, &CancellationToken::new(), Some(sink))
            .await
            .unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let out = run(
            &sh("echo started; exec sleep 30"),
            "test",
            Some(Duration::from_millis(200)),
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(out.termination, Termination::TimedOut);
        assert_eq!(out.exit_code, None);
        assert_eq!(out.stdout, "started\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let out = run(&sh("exec sleep 30"), "test", None, &cancel, None)
            .await
            .unwrap();
        assert_eq!(out.termination, Termination::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run(
            &ProcessSpec::new("kiln-definitely-not-a-program"),
            "test",
            None,
            &CancellationToken::new(),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
