//! Job domain types
//!
//! A job is one unit of work handed out by the coordinator: a sequence of
//! commands plus repository, artifact and cache directives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job handed out by the coordinator
///
/// Created by the acquisition call, consumed by the executor, and ends at
/// trace finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Numeric job id
    pub id: i64,

    /// Human-readable job name
    #[serde(default)]
    pub name: String,

    /// Newline-separated commands to execute
    pub commands: String,

    /// Repository to fetch the sources from
    #[serde(default)]
    pub repo_url: String,

    /// Ref the job was triggered for (branch or tag name)
    #[serde(default)]
    pub ref_name: String,

    /// Commit to check out
    #[serde(default)]
    pub sha: String,

    /// Previous commit on the same ref, when known
    #[serde(default)]
    pub before_sha: Option<String>,

    /// Whether an incremental fetch into an existing clone is allowed
    #[serde(default)]
    pub allow_git_fetch: bool,

    /// Job timeout in seconds, when the coordinator imposes one
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Job-scoped secret token for artifact traffic
    pub token: String,

    /// Variables exported into the job environment
    #[serde(default)]
    pub variables: Vec<JobVariable>,

    /// Jobs whose artifacts this job depends on
    #[serde(default)]
    pub depends_on: Vec<DependentJob>,

    /// Free-form artifact/cache directives as sent by the coordinator
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,

    /// TLS trust chain captured from the acquisition side channel
    ///
    /// Attached after acquisition so the job's own git/network operations
    /// can use the same trust root.
    #[serde(default)]
    pub tls_ca_chain: Option<String>,

    /// When this runner received the job
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// A single job environment variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobVariable {
    pub key: String,
    pub value: String,

    /// Whether the value may appear in logs and generated scripts
    #[serde(default)]
    pub public: bool,
}

/// Reference to a job this job depends on for artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentJob {
    pub id: i64,

    #[serde(default)]
    pub name: String,

    /// Job-scoped token authorizing the artifact download
    pub token: String,

    /// Artifact archive name, when the job produced one
    #[serde(default)]
    pub artifacts_file: Option<String>,
}

/// Job execution state as reported to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Success => write!(f, "success"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_descriptor_deserializes_minimal_payload() {
        let payload = serde_json::json!({
            "id": 17,
            "commands": "echo hello",
            "token": "job-token"
        });

        let job: JobDescriptor = serde_json::from_value(payload).unwrap();
        assert_eq!(job.id, 17);
        assert_eq!(job.commands, "echo hello");
        assert!(job.variables.is_empty());
        assert!(job.tls_ca_chain.is_none());
    }

    #[test]
    fn test_job_state_wire_format() {
        assert_eq!(
            serde_json::to_string(&JobState::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::from_str::<JobState>("\"running\"").unwrap(),
            JobState::Running
        );
    }
}
