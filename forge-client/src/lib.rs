//! Forge Coordinator Client
//!
//! The worker-side protocol client for the Forge build-execution platform.
//! It turns a stateless series of HTTP exchanges with the coordinator into
//! reliable, idempotent job acquisition, status reporting, and binary
//! artifact transfer.
//!
//! Operations never panic on network or coordinator failures: each one
//! classifies the exchange into a closed outcome enum (see [`outcome`]) so
//! the scheduler can act without re-interpreting HTTP semantics.
//!
//! # Example
//!
//! ```no_run
//! use forge_client::{AcquireOutcome, CoordinatorClient};
//! use forge_core::domain::runner::RunnerIdentity;
//! use forge_core::domain::version::VersionDescriptor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = CoordinatorClient::new();
//!     let identity = RunnerIdentity::new("https://coordinator.example.com", "runner-token");
//!     let version = VersionDescriptor::default();
//!
//!     match client.acquire_job(&identity, &version).await {
//!         AcquireOutcome::Acquired(job) => println!("got job {}", job.id),
//!         AcquireOutcome::NoJobAvailable => println!("nothing to do"),
//!         other => eprintln!("poll ended with {other:?}"),
//!     }
//! }
//! ```

pub mod error;

mod artifacts;
mod jobs;
mod outcome;
mod registry;
mod runners;
mod trace;
mod transport;

pub use error::{ClientError, Result};
pub use outcome::{
    AcquireOutcome, DownloadState, RegistrationOutcome, UnregisterOutcome, UpdateState,
    UploadState, VerifyOutcome,
};
pub use trace::{JobTraceReporter, ReporterState, TraceSink};
pub use transport::TRUST_CHAIN_HEADER;

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use forge_core::domain::runner::RunnerIdentity;

use crate::registry::ClientRegistry;
use crate::transport::{Exchange, TransportClient};

const DEFAULT_API_PREFIX: &str = "api/v1";

/// Client for all coordinator operations
///
/// Holds the process-wide transport registry; safe to share across
/// concurrent job contexts. Each operation looks up (or lazily constructs)
/// the transport for the identity it is called with, so a single client
/// serves any number of coordinator endpoints.
#[derive(Debug)]
pub struct CoordinatorClient {
    registry: ClientRegistry,
    api_prefix: String,
}

impl Default for CoordinatorClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorClient {
    /// Creates a client rooted at the default API path
    pub fn new() -> Self {
        Self::with_api_prefix(DEFAULT_API_PREFIX)
    }

    /// Creates a client rooted at a custom API path
    pub fn with_api_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            registry: ClientRegistry::new(),
            api_prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Get the configured API prefix
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub(crate) fn api_path(&self, path: &str) -> String {
        format!("{}/{}", self.api_prefix, path)
    }

    pub(crate) fn transport(&self, identity: &RunnerIdentity) -> Result<Arc<TransportClient>> {
        self.registry.obtain(identity)
    }

    /// JSON exchange through the registry; a registry construction failure
    /// is reported the same way as an unreachable coordinator
    pub(crate) async fn json_exchange<Req, Resp>(
        &self,
        identity: &RunnerIdentity,
        method: Method,
        path: &str,
        expected: StatusCode,
        request: &Req,
    ) -> Exchange<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let transport = match self.registry.obtain(identity) {
            Ok(transport) => transport,
            Err(err) => return Exchange::Transport(err.to_string()),
        };
        transport
            .json_exchange(method, &self.api_path(path), expected, request)
            .await
    }

    /// Body-less variant of [`Self::json_exchange`]
    pub(crate) async fn json_exchange_empty<Req>(
        &self,
        identity: &RunnerIdentity,
        method: Method,
        path: &str,
        request: &Req,
    ) -> Exchange<()>
    where
        Req: Serialize,
    {
        let transport = match self.registry.obtain(identity) {
            Ok(transport) => transport,
            Err(err) => return Exchange::Transport(err.to_string()),
        };
        transport
            .json_exchange_empty(method, &self.api_path(path), request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_prefix() {
        let client = CoordinatorClient::new();
        assert_eq!(client.api_prefix(), "api/v1");
        assert_eq!(client.api_path("jobs/request"), "api/v1/jobs/request");
    }

    #[test]
    fn test_custom_api_prefix_is_trimmed() {
        let client = CoordinatorClient::with_api_prefix("/ci/api/v2/");
        assert_eq!(client.api_prefix(), "ci/api/v2");
        assert_eq!(client.api_path("runners"), "ci/api/v2/runners");
    }
}
