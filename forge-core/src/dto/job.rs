//! Job DTOs for coordinator communication

use serde::{Deserialize, Serialize};

use crate::domain::job::JobState;
use crate::domain::version::VersionDescriptor;

/// Request for the next available job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireJobRequest {
    /// Runner self-description, recomputed per call
    pub info: VersionDescriptor,

    /// Runner secret token
    pub token: String,
}

/// Job state update carrying the full trace accumulated so far
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateJobRequest {
    /// Runner self-description, recomputed per call
    pub info: VersionDescriptor,

    /// Runner secret token
    pub token: String,

    /// Current job state
    pub state: JobState,

    /// Complete trace text, monotonically growing between updates
    pub trace: String,
}
