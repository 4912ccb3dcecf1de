//! Runner registration and lifecycle

use reqwest::{Method, StatusCode};
use tracing::{error, info, warn};

use forge_core::domain::runner::RunnerIdentity;
use forge_core::domain::version::VersionDescriptor;
use forge_core::dto::runner::{
    RegisterRunnerRequest, RegisterRunnerResponse, UnregisterRunnerRequest, VerifyRunnerRequest,
};

use crate::CoordinatorClient;
use crate::outcome::{
    RegistrationOutcome, UnregisterOutcome, VerifyOutcome, VerifyState, classify_verify,
};
use crate::transport::Exchange;

/// Fabricated job id used by the verification probe
///
/// The id never exists, so a healthy registration answers 404 while revoked
/// credentials answer 403. A genuine, side-effect-free way to tell the two
/// apart.
const VERIFY_PROBE_JOB_ID: i64 = -1;

impl CoordinatorClient {
    /// Registers this runner with the coordinator
    ///
    /// On success the coordinator issues a per-runner token, returned in
    /// the outcome.
    pub async fn register_runner(
        &self,
        identity: &RunnerIdentity,
        version: &VersionDescriptor,
        description: &str,
        tags: &[String],
    ) -> RegistrationOutcome {
        let request = RegisterRunnerRequest {
            info: version.clone(),
            token: identity.token.clone(),
            description: description.to_string(),
            tags: tags.to_vec(),
        };

        let exchange: Exchange<RegisterRunnerResponse> = self
            .json_exchange(
                identity,
                Method::POST,
                "runners",
                StatusCode::CREATED,
                &request,
            )
            .await;

        match exchange {
            Exchange::Http {
                status: 201,
                body: Some(response),
                ..
            } => {
                info!("Registering runner... succeeded");
                RegistrationOutcome::Registered(response)
            }
            Exchange::Http { status: 403, .. } => {
                error!("Registering runner... forbidden (check registration token)");
                RegistrationOutcome::Forbidden
            }
            Exchange::Transport(err) => {
                error!(error = %err, "Registering runner... error");
                RegistrationOutcome::TransportError(err)
            }
            Exchange::Http {
                status,
                status_text,
                ..
            } => {
                error!(status = %status_text, "Registering runner... failed");
                RegistrationOutcome::Failed { status }
            }
        }
    }

    /// Removes this runner's registration from the coordinator
    pub async fn unregister_runner(&self, identity: &RunnerIdentity) -> UnregisterOutcome {
        let request = UnregisterRunnerRequest {
            token: identity.token.clone(),
        };

        let exchange = self
            .json_exchange_empty(identity, Method::DELETE, "runners", &request)
            .await;

        match exchange {
            Exchange::Http { status: 200, .. } => {
                info!("Unregistering runner... succeeded");
                UnregisterOutcome::Unregistered
            }
            Exchange::Http { status: 403, .. } => {
                error!("Unregistering runner... forbidden");
                UnregisterOutcome::Forbidden
            }
            Exchange::Transport(err) => {
                error!(error = %err, "Unregistering runner... error");
                UnregisterOutcome::TransportError(err)
            }
            Exchange::Http {
                status,
                status_text,
                ..
            } => {
                error!(status = %status_text, "Unregistering runner... failed");
                UnregisterOutcome::Failed { status }
            }
        }
    }

    /// Probes whether this runner's registration is still valid
    ///
    /// Issues an update against a fabricated job id. 404 is the expected
    /// healthy answer; anything indeterminate also counts as alive so a
    /// flaky coordinator never deregisters a live runner.
    pub async fn verify_runner(&self, identity: &RunnerIdentity) -> VerifyOutcome {
        let request = VerifyRunnerRequest {
            token: identity.token.clone(),
        };

        let exchange = self
            .json_exchange_empty(
                identity,
                Method::PUT,
                &format!("jobs/{VERIFY_PROBE_JOB_ID}"),
                &request,
            )
            .await;

        match exchange {
            Exchange::Transport(err) => {
                error!(error = %err, "Verifying runner... error");
                VerifyOutcome::TransportError(err)
            }
            Exchange::Http {
                status,
                status_text,
                ..
            } => match classify_verify(status) {
                VerifyState::Alive => {
                    if status == 404 {
                        info!("Verifying runner... is alive");
                    } else {
                        warn!(status = %status_text, "Verifying runner... indeterminate, assuming alive");
                    }
                    VerifyOutcome::Alive
                }
                VerifyState::Removed => {
                    error!("Verifying runner... is removed");
                    VerifyOutcome::Removed
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity(server: &MockServer) -> RunnerIdentity {
        RunnerIdentity::new(server.uri(), "registration-token")
    }

    #[tokio::test]
    async fn test_register_runner_returns_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/runners"))
            .and(body_partial_json(serde_json::json!({
                "token": "registration-token",
                "description": "build host"
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({ "token": "per-runner-token" })),
            )
            .mount(&server)
            .await;

        let client = CoordinatorClient::new();
        let outcome = client
            .register_runner(
                &identity(&server),
                &VersionDescriptor::default(),
                "build host",
                &["linux".to_string()],
            )
            .await;

        assert_eq!(
            outcome,
            RegistrationOutcome::Registered(RegisterRunnerResponse {
                token: "per-runner-token".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_register_runner_bad_token_is_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/runners"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = CoordinatorClient::new();
        let outcome = client
            .register_runner(&identity(&server), &VersionDescriptor::default(), "", &[])
            .await;

        assert_eq!(outcome, RegistrationOutcome::Forbidden);
    }

    #[tokio::test]
    async fn test_unregister_runner_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/runners"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = CoordinatorClient::new();
        let outcome = client.unregister_runner(&identity(&server)).await;
        assert_eq!(outcome, UnregisterOutcome::Unregistered);
    }

    #[tokio::test]
    async fn test_verify_runner_not_found_means_alive() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = CoordinatorClient::new();
        let outcome = client.verify_runner(&identity(&server)).await;
        assert_eq!(outcome, VerifyOutcome::Alive);
    }

    #[tokio::test]
    async fn test_verify_runner_forbidden_means_removed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/-1"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = CoordinatorClient::new();
        let outcome = client.verify_runner(&identity(&server)).await;
        assert_eq!(outcome, VerifyOutcome::Removed);
    }

    #[tokio::test]
    async fn test_verify_runner_unreachable_is_transport_error() {
        let client = CoordinatorClient::new();
        let unreachable = RunnerIdentity::new("http://127.0.0.1:1", "token");

        let outcome = client.verify_runner(&unreachable).await;
        assert!(matches!(outcome, VerifyOutcome::TransportError(_)));
    }
}
