//! Runner configuration
//!
//! Defines all configurable parameters for the runner including the
//! coordinator connection, polling cadence, trace reporting interval, and
//! workspace directories.

use std::path::PathBuf;
use std::time::Duration;

use forge_core::domain::runner::RunnerIdentity;

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning for
/// different deployment scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Coordinator base URL (e.g., "https://coordinator.example.com")
    pub coordinator_url: String,

    /// Per-runner secret token, when already registered
    pub runner_token: Option<String>,

    /// Registration token used to self-register when no runner token is set
    pub registration_token: Option<String>,

    /// Custom CA bundle validating the coordinator's TLS certificate
    pub tls_ca_file: Option<PathBuf>,

    /// Human-readable description sent on registration
    pub description: String,

    /// Tags sent on registration for job matching
    pub tags: Vec<String>,

    /// How often to poll the coordinator for new jobs
    pub poll_interval: Duration,

    /// How often each running job flushes its trace to the coordinator
    pub trace_update_interval: Duration,

    /// Max parallel jobs the runner can handle
    pub max_parallel_jobs: usize,

    /// Base directory job workspaces are created under
    pub builds_dir: PathBuf,

    /// Directory for build caches; caching is disabled when unset
    pub cache_dir: Option<PathBuf>,

    /// Helper binary invoked from generated scripts for artifact and cache
    /// exchanges; those script steps are skipped when unset
    pub helper_command: Option<String>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(coordinator_url: String) -> Self {
        Self {
            coordinator_url,
            runner_token: None,
            registration_token: None,
            tls_ca_file: None,
            description: String::new(),
            tags: Vec::new(),
            poll_interval: Duration::from_secs(5),
            trace_update_interval: Duration::from_secs(3),
            max_parallel_jobs: 2,
            builds_dir: PathBuf::from("builds"),
            cache_dir: None,
            helper_command: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - FORGE_COORDINATOR_URL (required)
    /// - FORGE_RUNNER_TOKEN or FORGE_REGISTRATION_TOKEN (one required)
    /// - FORGE_TLS_CA_FILE (optional)
    /// - FORGE_RUNNER_DESCRIPTION (optional)
    /// - FORGE_RUNNER_TAGS (optional, comma-separated)
    /// - FORGE_POLL_INTERVAL (optional, seconds, default: 5)
    /// - FORGE_TRACE_UPDATE_INTERVAL (optional, seconds, default: 3)
    /// - FORGE_MAX_PARALLEL_JOBS (optional, default: 2)
    /// - FORGE_BUILDS_DIR (optional, default: "builds")
    /// - FORGE_CACHE_DIR (optional)
    /// - FORGE_HELPER_COMMAND (optional)
    pub fn from_env() -> anyhow::Result<Self> {
        let coordinator_url = std::env::var("FORGE_COORDINATOR_URL")
            .map_err(|_| anyhow::anyhow!("FORGE_COORDINATOR_URL environment variable not set"))?;

        let mut config = Self::new(coordinator_url);

        config.runner_token = std::env::var("FORGE_RUNNER_TOKEN").ok();
        config.registration_token = std::env::var("FORGE_REGISTRATION_TOKEN").ok();
        config.tls_ca_file = std::env::var("FORGE_TLS_CA_FILE").ok().map(PathBuf::from);
        config.description = std::env::var("FORGE_RUNNER_DESCRIPTION").unwrap_or_default();
        config.tags = std::env::var("FORGE_RUNNER_TAGS")
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if let Some(seconds) = env_u64("FORGE_POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env_u64("FORGE_TRACE_UPDATE_INTERVAL") {
            config.trace_update_interval = Duration::from_secs(seconds);
        }
        if let Some(jobs) = env_u64("FORGE_MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = jobs as usize;
        }
        if let Ok(dir) = std::env::var("FORGE_BUILDS_DIR") {
            config.builds_dir = PathBuf::from(dir);
        }
        config.cache_dir = std::env::var("FORGE_CACHE_DIR").ok().map(PathBuf::from);
        config.helper_command = std::env::var("FORGE_HELPER_COMMAND").ok();

        Ok(config)
    }

    /// Identity used for runner-level coordinator calls
    ///
    /// Only valid once a runner token is present (loaded or issued by
    /// registration).
    pub fn identity(&self) -> anyhow::Result<RunnerIdentity> {
        let token = self
            .runner_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("runner token not available"))?;
        Ok(RunnerIdentity {
            url: self.coordinator_url.clone(),
            token,
            tls_ca_file: self.tls_ca_file.clone(),
        })
    }

    /// Identity used for the registration call itself
    pub fn registration_identity(&self) -> anyhow::Result<RunnerIdentity> {
        let token = self
            .registration_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("registration token not available"))?;
        Ok(RunnerIdentity {
            url: self.coordinator_url.clone(),
            token,
            tls_ca_file: self.tls_ca_file.clone(),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.coordinator_url.is_empty() {
            anyhow::bail!("coordinator_url cannot be empty");
        }

        if !self.coordinator_url.starts_with("http://")
            && !self.coordinator_url.starts_with("https://")
        {
            anyhow::bail!("coordinator_url must start with http:// or https://");
        }

        if self.runner_token.is_none() && self.registration_token.is_none() {
            anyhow::bail!("either a runner token or a registration token is required");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.trace_update_interval.as_secs() == 0 {
            anyhow::bail!("trace_update_interval must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::new("http://localhost:8080".to_string());
        config.runner_token = Some("token".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = valid_config();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.trace_update_interval, Duration::from_secs(3));
        assert_eq!(config.max_parallel_jobs, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        // Invalid URL should fail
        config.coordinator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.coordinator_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());

        // No token at all should fail
        config.runner_token = None;
        assert!(config.validate().is_err());

        // A registration token alone is enough
        config.registration_token = Some("reg".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identity_requires_runner_token() {
        let mut config = valid_config();
        assert!(config.identity().is_ok());

        config.runner_token = None;
        assert!(config.identity().is_err());
    }

    #[test]
    fn test_identity_carries_trust_bundle() {
        let mut config = valid_config();
        config.tls_ca_file = Some(PathBuf::from("/etc/forge/ca.pem"));

        let identity = config.identity().unwrap();
        assert_eq!(identity.url, "http://localhost:8080");
        assert_eq!(
            identity.tls_ca_file,
            Some(PathBuf::from("/etc/forge/ca.pem"))
        );
    }
}
