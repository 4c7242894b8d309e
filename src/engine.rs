//! External WDL engine invocation.
//!
//! The engine under test is an opaque executable: given a WDL source path
//! and an optional inputs payload, it writes a JSON output payload to
//! stdout and exits. `EngineAdapter` is the seam the scheduler works
//! against; `SubprocessEngine` is the real implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::watch;

use crate::discovery::TestCase;
use crate::error::HarnessError;

/// How an engine invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Process ran to completion with an exit code.
    Completed { exit_code: i32 },
    /// Per-case deadline elapsed; the child was terminated.
    /// Always a failure, never a skip.
    Timeout,
    /// Engine crash (signal-terminated) or non-decodable output payload.
    MalformedOutput,
    /// The process failed to start.
    SpawnFailed,
    /// Run-level cancellation observed while the case was in flight.
    Cancelled,
}

/// Captured result of one engine invocation. Owned exclusively by the run
/// that produced it; dropped once the outcome is recorded.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Output values decoded from stdout (present only on a clean exit).
    pub outputs: Option<serde_json::Value>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Human-readable context: spawn error, decode error, signal info.
    pub message: Option<String>,
}

impl ExecutionResult {
    fn tagged(status: ExecutionStatus, elapsed: Duration, message: Option<String>) -> Self {
        Self {
            status,
            outputs: None,
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
            message,
        }
    }
}

/// Seam between the scheduler and the engine under test.
///
/// Implementations must be independent per call: no shared mutable state,
/// so invocations may run concurrently across test cases.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Execute the engine against one test case, bounded by `timeout` and
    /// interruptible through `cancel`.
    async fn execute(
        &self,
        case: &TestCase,
        timeout: Duration,
        cancel: watch::Receiver<bool>,
    ) -> ExecutionResult;
}

/// Resolves once the cancellation flag flips to true. Pends forever if the
/// sender side is dropped without cancelling, which keeps `select!` callers
/// on their other branches.
pub(crate) async fn cancel_signalled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await;
}

/// Invokes the engine as `<engine> run <wdl> [-i <inputs.json>]` in a
/// scratch working directory, one isolated child process per test case.
#[derive(Debug)]
pub struct SubprocessEngine {
    engine_path: PathBuf,
    extra_args: Vec<String>,
}

impl SubprocessEngine {
    /// Create a runner for the given engine executable.
    /// Fails early if the path does not point at a file.
    pub fn new<P: AsRef<Path>>(engine_path: P) -> Result<Self, HarnessError> {
        let engine_path = engine_path.as_ref().to_path_buf();
        if !engine_path.is_file() {
            return Err(HarnessError::engine_invocation(format!(
                "engine executable not found at {}",
                engine_path.display()
            )));
        }
        Ok(Self {
            engine_path,
            extra_args: Vec::new(),
        })
    }

    /// Additional arguments appended to every engine invocation.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn decode(output: std::process::Output, elapsed: Duration) -> ExecutionResult {
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let Some(exit_code) = output.status.code() else {
            // Killed by signal: engine crash.
            return ExecutionResult {
                status: ExecutionStatus::MalformedOutput,
                outputs: None,
                stdout,
                stderr,
                elapsed,
                message: Some(format!("engine terminated by signal ({})", output.status)),
            };
        };

        if exit_code != 0 {
            return ExecutionResult {
                status: ExecutionStatus::Completed { exit_code },
                outputs: None,
                stdout,
                stderr,
                elapsed,
                message: None,
            };
        }

        match serde_json::from_str::<serde_json::Value>(&stdout) {
            Ok(outputs) => ExecutionResult {
                status: ExecutionStatus::Completed { exit_code },
                outputs: Some(outputs),
                stdout,
                stderr,
                elapsed,
                message: None,
            },
            Err(e) => ExecutionResult {
                status: ExecutionStatus::MalformedOutput,
                outputs: None,
                stdout,
                stderr,
                elapsed,
                message: Some(format!("output payload is not valid JSON: {}", e)),
            },
        }
    }
}

#[async_trait]
impl EngineAdapter for SubprocessEngine {
    async fn execute(
        &self,
        case: &TestCase,
        timeout: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionResult {
        let start = Instant::now();

        // Scratch working directory so engine side effects stay isolated.
        let scratch = match tempfile::Builder::new().prefix("wdl-conformance-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionResult::tagged(
                    ExecutionStatus::SpawnFailed,
                    start.elapsed(),
                    Some(format!("failed to create scratch directory: {}", e)),
                );
            }
        };

        let mut cmd = Command::new(&self.engine_path);
        cmd.arg("run").arg(&case.wdl_path);
        if let Some(inputs) = &case.inputs_path {
            cmd.arg("-i").arg(inputs);
        }
        cmd.args(&self.extra_args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::tagged(
                    ExecutionStatus::SpawnFailed,
                    start.elapsed(),
                    Some(format!(
                        "failed to start engine '{}': {}",
                        self.engine_path.display(),
                        e
                    )),
                );
            }
        };

        let wait = child.wait_with_output();
        tokio::pin!(wait);

        // Dropping the pinned wait future drops the child, which kills the
        // process (kill_on_drop) on both the timeout and cancel branches.
        let waited = tokio::select! {
            result = &mut wait => Some(result),
            _ = tokio::time::sleep(timeout) => None,
            _ = cancel_signalled(&mut cancel) => {
                return ExecutionResult::tagged(
                    ExecutionStatus::Cancelled,
                    start.elapsed(),
                    Some("run cancelled while in flight".to_string()),
                );
            }
        };

        let elapsed = start.elapsed();
        match waited {
            Some(Ok(output)) => Self::decode(output, elapsed),
            Some(Err(e)) => ExecutionResult::tagged(
                ExecutionStatus::SpawnFailed,
                elapsed,
                Some(format!("failed waiting for engine: {}", e)),
            ),
            None => ExecutionResult::tagged(
                ExecutionStatus::Timeout,
                elapsed,
                Some(format!("timed out after {:?}", timeout)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ExpectedResult;
    use std::fs;
    use tempfile::TempDir;

    fn stub_case(dir: &TempDir) -> TestCase {
        let wdl_path = dir.path().join("hello.wdl");
        fs::write(&wdl_path, "version 1.1\n").unwrap();
        TestCase {
            spec_version: "wdl-1.1".to_string(),
            name: "hello.wdl".to_string(),
            wdl_path,
            inputs_path: None,
            expected: ExpectedResult::default(),
        }
    }

    fn stub_engine(dir: &TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("engine.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // cancel_signalled never resolves once the sender is dropped.
    fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_clean_exit_decodes_outputs() {
        let dir = TempDir::new().unwrap();
        let engine =
            SubprocessEngine::new(stub_engine(&dir, r#"echo '{"hello.out": 42}'"#)).unwrap();
        let case = stub_case(&dir);

        let result = engine
            .execute(&case, Duration::from_secs(5), no_cancel())
            .await;

        assert_eq!(result.status, ExecutionStatus::Completed { exit_code: 0 });
        assert_eq!(result.outputs, Some(serde_json::json!({"hello.out": 42})));
    }

    #[tokio::test]
    async fn test_nonzero_exit_has_no_outputs() {
        let dir = TempDir::new().unwrap();
        let engine = SubprocessEngine::new(stub_engine(&dir, "echo 'boom' >&2\nexit 3")).unwrap();
        let case = stub_case(&dir);

        let result = engine
            .execute(&case, Duration::from_secs(5), no_cancel())
            .await;

        assert_eq!(result.status, ExecutionStatus::Completed { exit_code: 3 });
        assert!(result.outputs.is_none());
        assert!(result.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_non_json_stdout_is_malformed() {
        let dir = TempDir::new().unwrap();
        let engine = SubprocessEngine::new(stub_engine(&dir, "echo 'not json'")).unwrap();
        let case = stub_case(&dir);

        let result = engine
            .execute(&case, Duration::from_secs(5), no_cancel())
            .await;

        assert_eq!(result.status, ExecutionStatus::MalformedOutput);
        assert!(result.message.is_some());
    }

    #[tokio::test]
    async fn test_timeout_terminates_child() {
        let dir = TempDir::new().unwrap();
        let engine = SubprocessEngine::new(stub_engine(&dir, "sleep 60")).unwrap();
        let case = stub_case(&dir);

        let result = engine
            .execute(&case, Duration::from_millis(100), no_cancel())
            .await;

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(result.elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_in_flight_case() {
        let dir = TempDir::new().unwrap();
        let engine = SubprocessEngine::new(stub_engine(&dir, "sleep 60")).unwrap();
        let case = stub_case(&dir);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
            tx
        });

        let result = engine
            .execute(&case, Duration::from_secs(60), rx)
            .await;

        assert_eq!(result.status, ExecutionStatus::Cancelled);
        drop(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_extra_args_appended_to_invocation() {
        let dir = TempDir::new().unwrap();
        // Engine echoes its third argument (the first extra arg) back.
        let engine = SubprocessEngine::new(stub_engine(&dir, r#"printf '{"arg": "%s"}' "$3""#))
            .unwrap()
            .with_extra_args(vec!["--no-container".to_string()]);
        let case = stub_case(&dir);

        let result = engine
            .execute(&case, Duration::from_secs(5), no_cancel())
            .await;

        assert_eq!(result.status, ExecutionStatus::Completed { exit_code: 0 });
        assert_eq!(
            result.outputs,
            Some(serde_json::json!({"arg": "--no-container"}))
        );
    }

    #[tokio::test]
    async fn test_missing_engine_is_rejected_upfront() {
        let err = SubprocessEngine::new("/no/such/engine").unwrap_err();
        assert!(matches!(err, HarnessError::EngineInvocation { .. }));
    }
}
