//! Job trace reporter
//!
//! A per-job state machine that owns the growing trace text, periodically
//! flushes it to the coordinator, and finalizes the job with a terminal
//! state. Updates for one job are serialized: the single background task is
//! the only sender while the job runs, so a second update is never issued
//! while one is outstanding.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use forge_core::domain::job::JobState;
use forge_core::domain::runner::RunnerIdentity;
use forge_core::domain::version::VersionDescriptor;

use crate::CoordinatorClient;
use crate::outcome::UpdateState;

/// Reporter lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    /// Accumulating trace text and sending periodic updates
    Running,

    /// Sending the one final update
    Finalizing,

    /// Final update delivered (or delivery abandoned as best-effort)
    Done,

    /// Coordinator aborted the job; no further network activity
    Aborted,
}

struct TraceShared {
    buffer: Mutex<String>,
    /// Fired when the coordinator aborts the job; the sole cancellation
    /// signal propagated to the executing job
    aborted: CancellationToken,
}

/// Cloneable append handle handed to the executor
#[derive(Clone)]
pub struct TraceSink {
    shared: Arc<TraceShared>,
}

impl TraceSink {
    /// Appends text to the job trace
    ///
    /// The trace grows monotonically; every update carries the full text
    /// accumulated so far.
    pub fn append(&self, text: &str) {
        self.shared.buffer.lock().unwrap().push_str(text);
    }

    /// Copy of the trace accumulated so far
    pub fn snapshot(&self) -> String {
        self.shared.buffer.lock().unwrap().clone()
    }

    /// Current length of the buffered trace
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-job trace reporter
///
/// Created when a job starts executing; dropped after [`finish`] returns.
///
/// [`finish`]: JobTraceReporter::finish
pub struct JobTraceReporter {
    client: Arc<CoordinatorClient>,
    identity: RunnerIdentity,
    version: VersionDescriptor,
    job_id: i64,
    shared: Arc<TraceShared>,
    updater: tokio::task::JoinHandle<()>,
}

impl JobTraceReporter {
    /// Starts reporting for one job
    ///
    /// Spawns the background task that flushes the trace on a fixed
    /// interval, independent of log volume.
    pub fn start(
        client: Arc<CoordinatorClient>,
        identity: RunnerIdentity,
        version: VersionDescriptor,
        job_id: i64,
        interval: Duration,
    ) -> Self {
        let shared = Arc::new(TraceShared {
            buffer: Mutex::new(String::new()),
            aborted: CancellationToken::new(),
        });

        let updater = tokio::spawn(update_loop(
            Arc::clone(&client),
            identity.clone(),
            version.clone(),
            job_id,
            Arc::clone(&shared),
            interval,
        ));

        Self {
            client,
            identity,
            version,
            job_id,
            shared,
            updater,
        }
    }

    /// Append handle for the executor's output
    pub fn sink(&self) -> TraceSink {
        TraceSink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Token fired when the coordinator aborts the job
    ///
    /// Must be propagated to the executing job promptly so local execution
    /// stops instead of running to completion uselessly.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.aborted.clone()
    }

    /// Whether the coordinator has aborted this job
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.is_cancelled()
    }

    /// Finalizes the job with its terminal state
    ///
    /// Stops the periodic task, then sends one last update carrying the
    /// complete trace. Delivery is best-effort: a failed final report does
    /// not reverse the job's local outcome, but it is surfaced as a
    /// warning.
    pub async fn finish(self, state: JobState) -> ReporterState {
        self.updater.abort();
        let _ = self.updater.await;

        if self.shared.aborted.is_cancelled() {
            return ReporterState::Aborted;
        }

        debug!(job_id = self.job_id, state = %state, "finalizing job trace");
        let trace = self.shared.buffer.lock().unwrap().clone();
        match self
            .client
            .update_job_state(&self.identity, &self.version, self.job_id, state, &trace)
            .await
        {
            UpdateState::Succeeded => ReporterState::Done,
            UpdateState::Abort => {
                self.shared.aborted.cancel();
                warn!(job_id = self.job_id, "final trace update rejected; job was aborted server-side");
                ReporterState::Aborted
            }
            UpdateState::Failed => {
                warn!(job_id = self.job_id, "final trace update failed; keeping local job result");
                ReporterState::Done
            }
        }
    }
}

async fn update_loop(
    client: Arc<CoordinatorClient>,
    identity: RunnerIdentity,
    version: VersionDescriptor,
    job_id: i64,
    shared: Arc<TraceShared>,
    period: Duration,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // the first tick completes immediately; consume it so the first update
    // waits a full period
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shared.aborted.cancelled() => break,
            _ = interval.tick() => {}
        }

        let trace = shared.buffer.lock().unwrap().clone();
        match client
            .update_job_state(&identity, &version, job_id, JobState::Running, &trace)
            .await
        {
            UpdateState::Succeeded => {}
            UpdateState::Abort => {
                warn!(job_id, "job aborted by coordinator; stopping trace updates");
                shared.aborted.cancel();
                break;
            }
            UpdateState::Failed => {
                // transient; back off before the next attempt
                time::sleep(period).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reporter_for(server: &MockServer, interval_ms: u64) -> JobTraceReporter {
        JobTraceReporter::start(
            Arc::new(CoordinatorClient::new()),
            RunnerIdentity::new(server.uri(), "runner-token"),
            VersionDescriptor::default(),
            7,
            Duration::from_millis(interval_ms),
        )
    }

    #[tokio::test]
    async fn test_periodic_updates_carry_full_trace() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/7"))
            .and(body_partial_json(serde_json::json!({
                "state": "running",
                "trace": "one\ntwo\n"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1..)
            .mount(&server)
            .await;
        // the finalization update carries a terminal state
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/7"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let reporter = reporter_for(&server, 50);
        let sink = reporter.sink();
        sink.append("one\n");
        sink.append("two\n");

        time::sleep(Duration::from_millis(120)).await;
        assert!(!reporter.is_aborted());

        let final_state = reporter.finish(JobState::Success).await;
        assert_eq!(final_state, ReporterState::Done);
    }

    #[tokio::test]
    async fn test_abort_stops_further_updates() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/7"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = reporter_for(&server, 30);
        let cancelled = reporter.cancellation();

        // wait for the abort to propagate, then give the loop time to prove
        // it sends nothing further
        cancelled.cancelled().await;
        time::sleep(Duration::from_millis(120)).await;

        assert!(reporter.is_aborted());
        let final_state = reporter.finish(JobState::Failed).await;
        assert_eq!(final_state, ReporterState::Aborted);

        server.verify().await;
    }

    #[tokio::test]
    async fn test_finalization_sends_terminal_state() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/7"))
            .and(body_partial_json(serde_json::json!({
                "state": "success",
                "trace": "done\n"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        // long interval: the periodic task never fires, only finalization
        let reporter = reporter_for(&server, 60_000);
        reporter.sink().append("done\n");

        let final_state = reporter.finish(JobState::Success).await;
        assert_eq!(final_state, ReporterState::Done);

        server.verify().await;
    }

    #[tokio::test]
    async fn test_failed_final_update_keeps_local_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/7"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let reporter = reporter_for(&server, 60_000);
        let final_state = reporter.finish(JobState::Failed).await;

        // best-effort delivery: the local result stands
        assert_eq!(final_state, ReporterState::Done);
    }
}
