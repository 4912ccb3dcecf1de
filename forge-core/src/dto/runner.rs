//! Runner DTOs
//!
//! Data transfer objects for runner registration and lifecycle operations.

use serde::{Deserialize, Serialize};

use crate::domain::version::VersionDescriptor;

/// Request to register a runner with the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRunnerRequest {
    /// Runner self-description
    pub info: VersionDescriptor,

    /// Registration token authorizing the request
    pub token: String,

    /// Human-readable description of this runner
    #[serde(default)]
    pub description: String,

    /// Tags used for job matching
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Response to a successful registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRunnerResponse {
    /// Per-runner secret token issued by the coordinator
    pub token: String,
}

/// Request to remove a runner registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRunnerRequest {
    /// Runner secret token
    pub token: String,
}

/// Request probing whether this runner's registration is still valid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRunnerRequest {
    /// Runner secret token
    pub token: String,
}
