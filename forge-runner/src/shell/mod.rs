//! Shell script generation
//!
//! Turns a job descriptor into an executable script for a given shell
//! dialect. Generated scripts call back into the coordinator indirectly by
//! emitting helper-command invocations (artifacts uploader/downloader,
//! cache archiver/extractor) that carry the job's credentials and URLs.

mod bash;

pub use bash::BashGenerator;

use std::path::Path;

use serde::Deserialize;

use forge_core::domain::job::JobDescriptor;
use forge_core::domain::runner::JobCredentials;
use forge_core::domain::version::FeatureFlags;

/// What the active shell/executor combination can do
///
/// Reported to the coordinator inside the version descriptor and consulted
/// by the generator to decide which script sections to emit.
#[derive(Debug, Clone, Default)]
pub struct ShellCapabilities {
    pub artifacts: bool,
    pub cache: bool,
    pub dependencies: bool,

    /// Helper binary the generated script invokes for artifact and cache
    /// exchanges; those sections are skipped with a warning when unset
    pub helper_command: Option<String>,
}

impl ShellCapabilities {
    /// Capability flags as declared to the coordinator
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags {
            variables: true,
            artifacts: self.artifacts,
            cache: self.cache,
            dependencies: self.dependencies,
        }
    }
}

/// Everything a generator needs to build a script for one job
pub struct ScriptContext<'a> {
    pub job: &'a JobDescriptor,
    pub credentials: &'a JobCredentials,
    pub builds_dir: &'a Path,
    pub cache_dir: Option<&'a Path>,
    pub capabilities: &'a ShellCapabilities,
}

/// Generates an executable script for one shell dialect
pub trait ScriptGenerator: Send + Sync {
    /// Name reported in the version descriptor (e.g., "bash")
    fn shell(&self) -> &str;

    /// Builds the full job script: pre-build (sources, cache, dependency
    /// artifacts), the job's commands, and post-build (cache archiving,
    /// artifact upload)
    fn generate(&self, ctx: &ScriptContext<'_>) -> anyhow::Result<String>;
}

/// Artifact/cache directives parsed out of the job's free-form options
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ShellOptions {
    #[serde(default)]
    pub cache: Option<ArchiveOptions>,

    #[serde(default)]
    pub artifacts: Option<ArchiveOptions>,

    /// Names of dependency jobs whose artifacts to fetch; `None` means all
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
}

impl ShellOptions {
    pub fn from_job(job: &JobDescriptor) -> Self {
        serde_json::from_value(serde_json::Value::Object(job.options.clone()))
            .unwrap_or_default()
    }

    pub fn is_dependent(&self, name: &str) -> bool {
        match &self.dependencies {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

/// Directives for one archive (cache entry or artifact bundle)
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ArchiveOptions {
    /// Cache key or artifact name override
    #[serde(default, alias = "name")]
    pub key: Option<String>,

    /// Paths to include in the archive
    #[serde(default)]
    pub paths: Vec<String>,

    /// Whether to include untracked files
    #[serde(default)]
    pub untracked: bool,
}

impl ArchiveOptions {
    /// Helper-command arguments selecting what to archive
    pub fn command_arguments(&self) -> Vec<String> {
        let mut args = Vec::new();
        for path in &self.paths {
            args.push("--path".to_string());
            args.push(path.clone());
        }
        if self.untracked {
            args.push("--untracked".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_options(options: serde_json::Value) -> JobDescriptor {
        let mut job: JobDescriptor = serde_json::from_value(serde_json::json!({
            "id": 1,
            "commands": "true",
            "token": "t"
        }))
        .unwrap();
        job.options = match options {
            serde_json::Value::Object(map) => map,
            _ => panic!("options must be an object"),
        };
        job
    }

    #[test]
    fn test_options_parse_from_job() {
        let job = job_with_options(serde_json::json!({
            "cache": { "key": "deps", "paths": ["vendor/"] },
            "artifacts": { "name": "dist", "paths": ["target/release"], "untracked": true },
            "dependencies": ["compile"]
        }));

        let options = ShellOptions::from_job(&job);
        assert_eq!(options.cache.as_ref().unwrap().key.as_deref(), Some("deps"));
        assert_eq!(
            options.artifacts.as_ref().unwrap().key.as_deref(),
            Some("dist")
        );
        assert!(options.is_dependent("compile"));
        assert!(!options.is_dependent("lint"));
    }

    #[test]
    fn test_malformed_options_fall_back_to_defaults() {
        let job = job_with_options(serde_json::json!({ "cache": "not-an-object" }));
        let options = ShellOptions::from_job(&job);
        assert!(options.cache.is_none());
        assert!(options.is_dependent("anything"));
    }

    #[test]
    fn test_archive_command_arguments() {
        let options = ArchiveOptions {
            key: None,
            paths: vec!["vendor/".to_string(), "node_modules/".to_string()],
            untracked: true,
        };
        assert_eq!(
            options.command_arguments(),
            vec!["--path", "vendor/", "--path", "node_modules/", "--untracked"]
        );
    }
}
