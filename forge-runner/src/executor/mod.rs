//! Job executors
//!
//! An executor runs a generated script, feeds its output incrementally to
//! the job's trace sink, and reports a terminal success/failure. Executors
//! must honor the cancellation token promptly: it fires when the
//! coordinator aborts the job.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use forge_client::TraceSink;

/// Runs one generated script to completion or cancellation
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes the script, streaming output into `sink`
    ///
    /// Returns `Ok(true)` when the script exited successfully, `Ok(false)`
    /// when it failed or was cancelled, and `Err` only for failures to run
    /// it at all.
    async fn execute(
        &self,
        script: &str,
        sink: TraceSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<bool>;
}

/// Executes scripts as local child processes
pub struct ProcessExecutor {
    shell: String,
}

impl ProcessExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(
        &self,
        script: &str,
        sink: TraceSink,
        cancel: CancellationToken,
    ) -> anyhow::Result<bool> {
        let mut child = Command::new(&self.shell)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let out_reader = tokio::spawn(pump_output(stdout, sink.clone()));
        let err_reader = tokio::spawn(pump_output(stderr, sink.clone()));

        // feed the script on stdin (no temp file left behind) from its own
        // task: the child may fill its output pipes while it is still
        // reading the script, so the writer must not wait on the pumps
        let stdin = child.stdin.take();
        let script = script.to_string();
        let feeder = tokio::spawn(async move {
            if let Some(mut stdin) = stdin {
                if let Err(err) = stdin.write_all(script.as_bytes()).await {
                    warn!(error = %err, "failed to feed script to child stdin");
                }
                let _ = stdin.shutdown().await;
            }
        });

        let success = tokio::select! {
            status = child.wait() => {
                let status = status?;
                debug!(code = status.code(), "script finished");
                status.success()
            }
            _ = cancel.cancelled() => {
                warn!("job cancelled; killing child process");
                if let Err(err) = child.kill().await {
                    warn!(error = %err, "failed to kill child process");
                }
                sink.append("Job was cancelled by the coordinator\n");
                false
            }
        };

        let _ = feeder.await;
        let _ = out_reader.await;
        let _ = err_reader.await;

        Ok(success)
    }
}

/// Streams child output into the trace line by line
///
/// Reads raw bytes: job output is not guaranteed to be UTF-8, and a stray
/// binary byte must not close the pipe on a still-running child.
async fn pump_output<R>(reader: R, sink: TraceSink)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => sink.append(&String::from_utf8_lossy(&buf)),
            Err(err) => {
                warn!(error = %err, "error reading job output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_client::JobTraceReporter;
    use forge_core::domain::runner::RunnerIdentity;
    use forge_core::domain::version::VersionDescriptor;
    use std::sync::Arc;
    use std::time::Duration;

    fn sink_for_test() -> (JobTraceReporter, TraceSink) {
        // reporter pointed at an unroutable endpoint with a long interval:
        // it never manages a network call during these tests
        let reporter = JobTraceReporter::start(
            Arc::new(forge_client::CoordinatorClient::new()),
            RunnerIdentity::new("http://127.0.0.1:1", "token"),
            VersionDescriptor::default(),
            1,
            Duration::from_secs(3600),
        );
        let sink = reporter.sink();
        (reporter, sink)
    }

    #[tokio::test]
    async fn test_successful_script_streams_output() {
        let (_reporter, sink) = sink_for_test();
        let executor = ProcessExecutor::default();

        let success = executor
            .execute(
                "echo hello from the job",
                sink.clone(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(success);
        assert!(sink.len() >= "hello from the job\n".len());
    }

    #[tokio::test]
    async fn test_large_script_with_early_output_streams_through() {
        let (_reporter, sink) = sink_for_test();
        let executor = ProcessExecutor::default();

        // the first command floods stdout while the rest of the script is
        // still being fed through stdin
        let mut script = String::from("head -c 200000 /dev/zero | tr '\\0' x\necho\n");
        while script.len() < 300_000 {
            script.push_str("true\n");
        }
        script.push_str("echo done\n");

        let success = tokio::time::timeout(
            Duration::from_secs(30),
            executor.execute(&script, sink.clone(), CancellationToken::new()),
        )
        .await
        .expect("script feed and output pump stalled each other")
        .unwrap();

        assert!(success);
        assert!(sink.len() >= 200_000);
        assert!(sink.snapshot().contains("done"));
    }

    #[tokio::test]
    async fn test_non_utf8_output_keeps_streaming() {
        let (_reporter, sink) = sink_for_test();
        let executor = ProcessExecutor::default();

        let success = executor
            .execute(
                "echo before\nprintf '\\377\\376\\n'\necho after",
                sink.clone(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(success);
        let trace = sink.snapshot();
        assert!(trace.contains("before"));
        assert!(trace.contains("after"));
    }

    #[tokio::test]
    async fn test_failing_script_reports_failure() {
        let (_reporter, sink) = sink_for_test();
        let executor = ProcessExecutor::default();

        let success = executor
            .execute("exit 3", sink, CancellationToken::new())
            .await
            .unwrap();

        assert!(!success);
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_script() {
        let (_reporter, sink) = sink_for_test();
        let executor = ProcessExecutor::default();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let success = executor
            .execute("sleep 30", sink, cancel)
            .await
            .unwrap();

        assert!(!success);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
