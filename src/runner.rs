//! Sandboxed runner: executes one code payload in a child interpreter process.
//!
//! Each invocation materializes the payload into its own temporary file,
//! launches the interpreter on it with stdout and stderr piped, and waits for
//! the process (bounded by an optional wall-clock timeout). Whatever happens,
//! the caller gets text back and the temporary file is removed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::{Builder, TempPath};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on how long we wait for the output pipes to reach EOF once the
/// child itself has exited. Background grandchildren can keep them open.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const MAX_ARTIFACT_STEM: usize = 64;

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Interpreter invoked with the artifact path as its only argument.
    pub interpreter: PathBuf,
    /// Directory temporary artifacts are written to.
    pub work_dir: PathBuf,
    /// File suffix of the artifact, so the interpreter recognises it.
    pub artifact_suffix: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            work_dir: std::env::temp_dir(),
            artifact_suffix: ".py".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

#[derive(Debug, thiserror::Error)]
enum RunnerError {
    #[error("failed to write temporary file: {0}")]
    Artifact(#[source] std::io::Error),
    #[error("failed to launch {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("child {0} pipe missing")]
    MissingPipe(&'static str),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Captured result of one child process.
#[derive(Debug)]
struct ProcessOutput {
    stdout: String,
    stderr: String,
    /// `None` when the process was killed for exceeding the timeout.
    status: Option<ExitStatus>,
}

#[derive(Clone, Debug, Default)]
pub struct SandboxRunner {
    config: RunnerConfig,
}

impl SandboxRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run `code` and return its textual outcome. Never fails: launch and
    /// wait errors are rendered into the returned text.
    pub async fn execute(
        &self,
        code: &str,
        execution_id: &str,
        timeout: Option<Duration>,
    ) -> String {
        let artifact = match self.write_artifact(code, execution_id).await {
            Ok(path) => path,
            Err(err) => {
                warn!(execution_id, error = %err, "could not materialize execution");
                return format!("Error executing code: {err}");
            }
        };

        info!(
            execution_id,
            path = %artifact.display(),
            "executing code in temporary file"
        );

        let outcome = self.run_artifact(&artifact, timeout).await;
        remove_artifact(artifact);

        match outcome {
            Ok(output) => render_output(output, timeout),
            Err(err) => {
                warn!(execution_id, error = %err, "execution failed to run");
                format!("Error executing code: {err}")
            }
        }
    }

    async fn write_artifact(
        &self,
        code: &str,
        execution_id: &str,
    ) -> Result<TempPath, RunnerError> {
        let prefix = format!("exec_{}_", artifact_stem(execution_id));
        let suffix = self.config.artifact_suffix.clone();
        let work_dir = self.config.work_dir.clone();
        let code = code.to_string();

        tokio::task::spawn_blocking(move || {
            let mut file = Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&work_dir)?;
            file.write_all(code.as_bytes())?;
            file.flush()?;
            Ok::<_, std::io::Error>(file.into_temp_path())
        })
        .await?
        .map_err(RunnerError::Artifact)
    }

    async fn run_artifact(
        &self,
        artifact: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, RunnerError> {
        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            interpreter: self.config.interpreter.display().to_string(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or(RunnerError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(RunnerError::MissingPipe("stderr"))?;
        debug!(pid = child.id(), "spawned interpreter");

        let stdout_capture = PipeCapture::start(stdout);
        let stderr_capture = PipeCapture::start(stderr);

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status.map_err(RunnerError::Wait)?),
                Err(_) => {
                    warn!(
                        pid = child.id(),
                        timeout_secs = limit.as_secs_f64(),
                        "execution timed out, killing process"
                    );
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "failed to kill timed out process");
                    }
                    None
                }
            },
            None => Some(child.wait().await.map_err(RunnerError::Wait)?),
        };

        Ok(ProcessOutput {
            stdout: stdout_capture.finish().await,
            stderr: stderr_capture.finish().await,
            status,
        })
    }
}

/// Reads one child pipe to EOF in the background. The buffer is shared so
/// whatever arrived is still available if the pipe never closes.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl PipeCapture {
    fn start<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let handle = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(read) => sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .extend_from_slice(&chunk[..read]),
                    Err(err) => {
                        debug!(error = %err, "pipe read failed");
                        break;
                    }
                }
            }
        });
        Self { buffer, handle }
    }

    async fn finish(self) -> String {
        let Self { buffer, mut handle } = self;
        if tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut handle)
            .await
            .is_err()
        {
            debug!("output pipe still open after exit, using captured bytes");
            handle.abort();
        }
        let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(|p| p.into_inner()));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn remove_artifact(artifact: TempPath) {
    let path = artifact.to_path_buf();
    if let Err(err) = artifact.close() {
        warn!(path = %path.display(), error = %err, "error deleting temporary file");
    }
}

/// Filename-safe stem derived from the execution id.
fn artifact_stem(execution_id: &str) -> String {
    let stem: String = execution_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(MAX_ARTIFACT_STEM)
        .collect();
    if stem.is_empty() {
        "anon".to_string()
    } else {
        stem
    }
}

/// Stdout, then an `Errors:` section for stderr.
fn compose_streams(stdout: &str, stderr: &str) -> String {
    let mut output = stdout.to_string();
    if !stderr.is_empty() {
        if !output.is_empty() {
            output.push_str("\n\n");
        }
        output.push_str("Errors:\n");
        output.push_str(stderr);
    }
    output
}

fn exit_note(status: &ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("Process exited with code {code}"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("Process terminated by signal {signal}"));
        }
    }
    Some(format!("Process exited abnormally ({status})"))
}

fn render_output(output: ProcessOutput, timeout: Option<Duration>) -> String {
    let streams = compose_streams(&output.stdout, &output.stderr);
    match output.status {
        Some(status) => {
            let mut text = streams;
            if let Some(note) = exit_note(&status) {
                text.push_str("\n\n");
                text.push_str(&note);
            }
            text
        }
        None => {
            let secs = timeout.map(|limit| limit.as_secs_f64()).unwrap_or_default();
            let mut text = format!("Execution timed out after {secs} seconds.");
            if !streams.is_empty() {
                text.push_str("\n\nPartial output:\n");
                text.push_str(&streams);
            }
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn runner_in(dir: &Path) -> SandboxRunner {
        SandboxRunner::new(RunnerConfig::default().with_work_dir(dir))
    }

    fn artifacts_left(dir: &Path) -> usize {
        std::fs::read_dir(dir).expect("read work dir").count()
    }

    #[test]
    fn test_compose_streams() {
        assert_eq!(compose_streams("", ""), "");
        assert_eq!(compose_streams("out\n", ""), "out\n");
        assert_eq!(compose_streams("", "err\n"), "Errors:\nerr\n");
        assert_eq!(compose_streams("out\n", "err\n"), "out\n\n\nErrors:\nerr\n");
    }

    #[test]
    fn test_artifact_stem_sanitizes_ids() {
        assert_eq!(artifact_stem("abc123"), "abc123");
        assert_eq!(artifact_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(artifact_stem(""), "anon");
        assert_eq!(artifact_stem(&"x".repeat(200)).len(), MAX_ARTIFACT_STEM);
    }

    #[tokio::test]
    async fn test_successful_run_returns_stdout() {
        if !python_available() {
            eprintln!("skipping test: python3 not available");
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner_in(dir.path());

        let output = runner.execute("print(\"hello\")\n", "exec1", None).await;

        assert_eq!(output, "hello\n");
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_stderr_and_exit_code_are_reported() {
        if !python_available() {
            eprintln!("skipping test: python3 not available");
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner_in(dir.path());
        let code =
            "import sys\nprint(\"partial\")\nprint(\"boom\", file=sys.stderr)\nsys.exit(1)\n";

        let output = runner.execute(code, "exec2", None).await;

        assert!(output.starts_with("partial\n"), "got {output:?}");
        assert!(output.contains("Errors:\nboom\n"), "got {output:?}");
        assert!(
            output.ends_with("Process exited with code 1"),
            "got {output:?}"
        );
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_process_and_keeps_partial_output() {
        if !python_available() {
            eprintln!("skipping test: python3 not available");
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner_in(dir.path());
        let code = "import os, sys, time\nprint(os.getpid())\nsys.stdout.flush()\ntime.sleep(10)\n";

        let started = Instant::now();
        let output = runner
            .execute(code, "exec3", Some(Duration::from_secs(1)))
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(
            output.starts_with("Execution timed out after 1 seconds."),
            "got {output:?}"
        );
        assert!(output.contains("Partial output:\n"), "got {output:?}");
        assert_eq!(artifacts_left(dir.path()), 0);

        #[cfg(target_os = "linux")]
        {
            let pid = output
                .lines()
                .last()
                .and_then(|line| line.trim().parse::<u32>().ok())
                .expect("pid in partial output");
            assert!(
                !Path::new(&format!("/proc/{pid}")).exists(),
                "child {pid} still alive"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_reported_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = SandboxRunner::new(
            RunnerConfig::default()
                .with_work_dir(dir.path())
                .with_interpreter("/nonexistent/interpreter"),
        );

        let output = runner.execute("print(1)", "exec4", None).await;

        assert!(output.starts_with("Error executing code:"), "got {output:?}");
        assert_eq!(artifacts_left(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_work_dir_is_reported_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner_in(&dir.path().join("does-not-exist"));

        let output = runner.execute("print(1)", "exec5", None).await;

        assert!(
            output.starts_with("Error executing code: failed to write temporary file"),
            "got {output:?}"
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_use_separate_artifacts() {
        if !python_available() {
            eprintln!("skipping test: python3 not available");
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner_in(dir.path());

        let (first, second) = tokio::join!(
            runner.execute("print('a')", "same-id", None),
            runner.execute("print('b')", "same-id", None),
        );

        assert_eq!(first, "a\n");
        assert_eq!(second, "b\n");
        assert_eq!(artifacts_left(dir.path()), 0);
    }
}
