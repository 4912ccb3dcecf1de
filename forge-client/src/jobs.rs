//! Job acquisition and state reporting

use reqwest::{Method, StatusCode};
use tracing::{debug, error, info, warn};

use forge_core::domain::job::{JobDescriptor, JobState};
use forge_core::domain::runner::RunnerIdentity;
use forge_core::domain::version::VersionDescriptor;
use forge_core::dto::job::{AcquireJobRequest, UpdateJobRequest};

use crate::CoordinatorClient;
use crate::outcome::{AcquireOutcome, UpdateState, classify_update};
use crate::transport::Exchange;

impl CoordinatorClient {
    /// Requests the next available job from the coordinator
    ///
    /// A single blocking poll: 201 hands out a job (with the trust-chain
    /// side value attached to the descriptor), 204/404 mean nothing to do,
    /// 403 means this runner is not allowed to ask. Everything else is
    /// classified conservatively so the caller can keep polling.
    pub async fn acquire_job(
        &self,
        identity: &RunnerIdentity,
        version: &VersionDescriptor,
    ) -> AcquireOutcome {
        let request = AcquireJobRequest {
            info: version.clone(),
            token: identity.token.clone(),
        };

        let exchange: Exchange<JobDescriptor> = self
            .json_exchange(
                identity,
                Method::POST,
                "jobs/request",
                StatusCode::CREATED,
                &request,
            )
            .await;

        match exchange {
            Exchange::Http {
                status: 201,
                body: Some(mut job),
                trust_chain,
                ..
            } => {
                job.tls_ca_chain = trust_chain;
                info!(job_id = job.id, "Checking for jobs... received");
                AcquireOutcome::Acquired(Box::new(job))
            }
            Exchange::Http { status: 403, .. } => {
                error!("Checking for jobs... forbidden");
                AcquireOutcome::Forbidden
            }
            Exchange::Http {
                status: 204 | 404, ..
            } => {
                debug!("Checking for jobs... nothing");
                AcquireOutcome::NoJobAvailable
            }
            Exchange::Transport(err) => {
                error!(error = %err, "Checking for jobs... error");
                AcquireOutcome::TransportError(err)
            }
            Exchange::Http {
                status,
                status_text,
                ..
            } => {
                warn!(status = %status_text, "Checking for jobs... failed");
                AcquireOutcome::UnknownFailure { status }
            }
        }
    }

    /// Reports the current state and full trace of one job
    ///
    /// `Abort` tells the caller to stop reporting and cancel the job; it is
    /// returned for 403/404 and for transport errors (an unreachable
    /// coordinator should not keep a possibly-stale job burning resources).
    /// Unanticipated statuses stay retryable.
    pub async fn update_job_state(
        &self,
        identity: &RunnerIdentity,
        version: &VersionDescriptor,
        job_id: i64,
        state: JobState,
        trace: &str,
    ) -> UpdateState {
        let request = UpdateJobRequest {
            info: version.clone(),
            token: identity.token.clone(),
            state,
            trace: trace.to_string(),
        };

        let exchange = self
            .json_exchange_empty(identity, Method::PUT, &format!("jobs/{job_id}"), &request)
            .await;

        match exchange {
            Exchange::Transport(err) => {
                error!(job_id, error = %err, "Submitting job to coordinator... error");
                UpdateState::Abort
            }
            Exchange::Http {
                status,
                status_text,
                ..
            } => {
                let outcome = classify_update(status);
                match outcome {
                    UpdateState::Succeeded => {
                        debug!(job_id, "Submitting job to coordinator... ok");
                    }
                    UpdateState::Abort => {
                        warn!(job_id, status = %status_text, "Submitting job to coordinator... aborted");
                    }
                    UpdateState::Failed => {
                        warn!(job_id, status = %status_text, "Submitting job to coordinator... failed");
                    }
                }
                outcome
            }
        }
    }
}
