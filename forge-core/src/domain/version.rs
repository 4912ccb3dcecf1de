//! Runner self-description
//!
//! Sent with every coordinator call so the coordinator can match jobs to
//! runner capabilities. Recomputed per call because the capability flags
//! depend on the active executor and shell.

use serde::{Deserialize, Serialize};

/// Self-description sent with every coordinator call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Runner product name
    pub name: String,

    /// Runner version string
    pub version: String,

    /// VCS revision the runner was built from
    #[serde(default)]
    pub revision: String,

    /// Operating system (e.g., "linux")
    pub platform: String,

    /// CPU architecture (e.g., "x86_64")
    pub architecture: String,

    /// Active executor name, if any
    #[serde(default)]
    pub executor: Option<String>,

    /// Active shell name, if any
    #[serde(default)]
    pub shell: Option<String>,

    /// Declared capability flags
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Capability flags declared by the active executor/shell combination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Job variables can be exported into the execution environment
    #[serde(default)]
    pub variables: bool,

    /// Artifacts can be uploaded and downloaded
    #[serde(default)]
    pub artifacts: bool,

    /// Build caches can be archived and restored
    #[serde(default)]
    pub cache: bool,

    /// Artifacts from dependent jobs can be fetched
    #[serde(default)]
    pub dependencies: bool,
}
