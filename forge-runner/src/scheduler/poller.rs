//! Job poller
//!
//! Polls the coordinator for jobs and executes them. Each job runs in its
//! own task with its own trace reporter; the number of concurrent jobs is
//! bounded by a semaphore. Retry cadence lives here, not in the client:
//! the client classifies one call at a time.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, error, info, warn};

use forge_client::{AcquireOutcome, CoordinatorClient, JobTraceReporter, ReporterState};
use forge_core::domain::job::{JobDescriptor, JobState};
use forge_core::domain::runner::{JobCredentials, RunnerIdentity};
use forge_core::domain::version::VersionDescriptor;

use crate::config::Config;
use crate::executor::Executor;
use crate::shell::{ScriptContext, ScriptGenerator, ShellCapabilities};

/// Job poller that continuously polls for and executes jobs
pub struct JobPoller {
    config: Config,
    client: Arc<CoordinatorClient>,
    identity: RunnerIdentity,
    capabilities: ShellCapabilities,
    generator: Arc<dyn ScriptGenerator>,
    executor: Arc<dyn Executor>,
    semaphore: Arc<Semaphore>,
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(
        config: Config,
        client: Arc<CoordinatorClient>,
        identity: RunnerIdentity,
        capabilities: ShellCapabilities,
        generator: Arc<dyn ScriptGenerator>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            client,
            identity,
            capabilities,
            generator,
            executor,
            semaphore,
        }
    }

    /// Runner self-description, recomputed per call because capability
    /// flags follow the active executor/shell
    fn version_descriptor(&self) -> VersionDescriptor {
        VersionDescriptor {
            name: "forge-runner".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            revision: option_env!("FORGE_REVISION").unwrap_or("").to_string(),
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            executor: Some("process".to_string()),
            shell: Some(self.generator.shell().to_string()),
            features: self.capabilities.feature_flags(),
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(interval = ?self.config.poll_interval, "Starting job poller");

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            // don't ask for work we cannot start
            if self.semaphore.available_permits() == 0 {
                debug!("All job slots busy, skipping poll");
                continue;
            }

            match self
                .client
                .acquire_job(&self.identity, &self.version_descriptor())
                .await
            {
                AcquireOutcome::Acquired(job) => {
                    if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
                        self.spawn_job_task(*job, permit);
                    } else {
                        // slot was taken between the check and the acquire;
                        // the job will be finalized as failed so the
                        // coordinator can reschedule it
                        warn!(job_id = job.id, "No free job slot, abandoning acquired job");
                        let reporter = self.start_reporter(job.id);
                        reporter.sink().append("No executor slot available on this runner\n");
                        let _ = reporter.finish(JobState::Failed).await;
                    }
                }
                AcquireOutcome::NoJobAvailable => {
                    debug!("No jobs available");
                }
                AcquireOutcome::Forbidden => {
                    error!("Coordinator refused the poll; check the runner token");
                }
                AcquireOutcome::TransportError(err) => {
                    error!(error = %err, "Coordinator unreachable");
                }
                AcquireOutcome::UnknownFailure { status } => {
                    warn!(status, "Unexpected poll response, will retry");
                }
            }
        }
    }

    fn start_reporter(&self, job_id: i64) -> JobTraceReporter {
        JobTraceReporter::start(
            Arc::clone(&self.client),
            self.identity.clone(),
            self.version_descriptor(),
            job_id,
            self.config.trace_update_interval,
        )
    }

    /// Spawns a task to execute a single job
    fn spawn_job_task(&self, job: JobDescriptor, permit: tokio::sync::OwnedSemaphorePermit) {
        let reporter = self.start_reporter(job.id);
        let config = self.config.clone();
        let identity = self.identity.clone();
        let capabilities = self.capabilities.clone();
        let generator = Arc::clone(&self.generator);
        let executor = Arc::clone(&self.executor);

        tokio::spawn(async move {
            let _permit = permit;
            Self::execute_job(job, reporter, config, identity, capabilities, generator, executor)
                .await;
        });
    }

    /// Executes a single job with trace streaming
    async fn execute_job(
        job: JobDescriptor,
        reporter: JobTraceReporter,
        config: Config,
        identity: RunnerIdentity,
        capabilities: ShellCapabilities,
        generator: Arc<dyn ScriptGenerator>,
        executor: Arc<dyn Executor>,
    ) {
        info!(job_id = job.id, name = %job.name, "Starting job");

        let credentials = JobCredentials {
            url: identity.url.clone(),
            token: job.token.clone(),
            tls_ca_file: identity.tls_ca_file.clone(),
            job_id: job.id,
        };

        let sink = reporter.sink();
        sink.append(&format!(
            "Running job {} ({}) on {}\n",
            job.id,
            job.name,
            std::env::consts::OS
        ));

        if let Err(err) = tokio::fs::create_dir_all(&config.builds_dir).await {
            error!(job_id = job.id, error = %err, "Failed to prepare builds directory");
            sink.append(&format!("Failed to prepare builds directory: {err}\n"));
            let state = reporter.finish(JobState::Failed).await;
            debug!(job_id = job.id, ?state, "Job finalized");
            return;
        }

        let ctx = ScriptContext {
            job: &job,
            credentials: &credentials,
            builds_dir: &config.builds_dir,
            cache_dir: config.cache_dir.as_deref(),
            capabilities: &capabilities,
        };
        let script = match generator.generate(&ctx) {
            Ok(script) => script,
            Err(err) => {
                error!(job_id = job.id, error = %err, "Failed to generate job script");
                sink.append(&format!("Failed to generate job script: {err}\n"));
                let state = reporter.finish(JobState::Failed).await;
                debug!(job_id = job.id, ?state, "Job finalized");
                return;
            }
        };

        let success = match executor
            .execute(&script, sink.clone(), reporter.cancellation())
            .await
        {
            Ok(success) => success,
            Err(err) => {
                error!(job_id = job.id, error = %err, "Executor failed to run the job");
                sink.append(&format!("Executor error: {err}\n"));
                false
            }
        };

        let terminal = if success {
            JobState::Success
        } else {
            JobState::Failed
        };
        match reporter.finish(terminal).await {
            ReporterState::Done => {
                info!(job_id = job.id, state = %terminal, "Job finished");
            }
            ReporterState::Aborted => {
                warn!(job_id = job.id, "Job was aborted by the coordinator");
            }
            other => {
                warn!(job_id = job.id, ?other, "Unexpected reporter state after finalization");
            }
        }
    }
}
