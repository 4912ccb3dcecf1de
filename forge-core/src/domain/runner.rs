//! Runner identity and credentials
//!
//! Represents the credentials a runner uses to talk to one coordinator
//! endpoint, and the job-scoped credentials issued with each acquired job.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Credentials identifying a registered runner to one coordinator endpoint
///
/// Loaded from persisted configuration and immutable for the lifetime of
/// the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerIdentity {
    /// Coordinator base URL (e.g., "https://coordinator.example.com")
    pub url: String,

    /// Runner secret token
    pub token: String,

    /// Optional custom CA bundle used to validate the coordinator's TLS
    /// certificate
    pub tls_ca_file: Option<PathBuf>,
}

impl RunnerIdentity {
    /// Creates an identity without a custom trust bundle
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            tls_ca_file: None,
        }
    }

    /// Key identifying the transport this identity maps onto
    ///
    /// Two identities share a transport when they point at the same URL and
    /// trust bundle; the token is deliberately not part of the key.
    pub fn registry_key(&self) -> String {
        let ca = self
            .tls_ca_file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        format!("{}_{}", self.url, ca)
    }
}

/// Scoped authorization for one specific job's artifact traffic
///
/// Issued by the coordinator on job acquisition; must never be reused for
/// a different job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCredentials {
    /// Coordinator base URL
    pub url: String,

    /// Job-scoped secret token
    pub token: String,

    /// Trust bundle inherited from the runner identity
    pub tls_ca_file: Option<PathBuf>,

    /// Numeric id of the job these credentials belong to
    pub job_id: i64,
}

impl JobCredentials {
    /// Maps these credentials onto a runner identity for transport lookup
    ///
    /// Artifact exchanges reuse the same transport as runner-level calls on
    /// the same endpoint; only the authorization differs.
    pub fn as_runner_identity(&self) -> RunnerIdentity {
        RunnerIdentity {
            url: self.url.clone(),
            token: self.token.clone(),
            tls_ca_file: self.tls_ca_file.clone(),
        }
    }
}
