//! Forge Runner
//!
//! A worker that polls the Forge coordinator for build jobs, executes them
//! through a shell/executor pair, and reports traces and artifacts back.
//!
//! Architecture:
//! - Configuration: settings from environment variables
//! - Client: coordinator protocol client (forge-client)
//! - Shell/Executor: script generation and local process execution
//! - Scheduler: job polling and lifecycle management

mod config;
mod executor;
mod scheduler;
mod shell;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge_client::{CoordinatorClient, RegistrationOutcome, VerifyOutcome};
use forge_core::domain::version::VersionDescriptor;

use crate::config::Config;
use crate::executor::ProcessExecutor;
use crate::scheduler::JobPoller;
use crate::shell::{BashGenerator, ScriptGenerator, ShellCapabilities};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forge_runner=info,forge_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Forge Runner");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(coordinator = %config.coordinator_url, "Loaded configuration");

    let client = Arc::new(CoordinatorClient::new());

    let generator: Arc<dyn ScriptGenerator> = Arc::new(BashGenerator::new());
    let capabilities = ShellCapabilities {
        artifacts: config.helper_command.is_some(),
        cache: config.helper_command.is_some() && config.cache_dir.is_some(),
        dependencies: config.helper_command.is_some(),
        helper_command: config.helper_command.clone(),
    };
    let version = startup_version(&generator, &capabilities);

    // obtain a runner token when we only have a registration token
    if config.runner_token.is_none() {
        let registration_identity = config.registration_identity()?;
        info!("Registering runner with coordinator");
        let token =
            register_with_retry(&client, &registration_identity, &version, &config).await?;
        config.runner_token = Some(token);
        info!("Runner registered; keep the issued token to skip registration next time");
    }

    let identity = config.identity()?;

    match client.verify_runner(&identity).await {
        VerifyOutcome::Alive => info!("Runner registration verified"),
        VerifyOutcome::Removed => {
            anyhow::bail!("this runner has been removed from the coordinator")
        }
        VerifyOutcome::TransportError(err) => {
            // start anyway; the poll loop reports transport problems
            warn!(error = %err, "Could not verify registration, continuing");
        }
    }

    let executor = Arc::new(ProcessExecutor::default());
    let poller = JobPoller::new(
        config.clone(),
        Arc::clone(&client),
        identity,
        capabilities,
        generator,
        executor,
    );

    info!(
        poll_interval = ?config.poll_interval,
        trace_update_interval = ?config.trace_update_interval,
        "Runner initialized, starting poll loop"
    );

    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    Ok(())
}

fn startup_version(
    generator: &Arc<dyn ScriptGenerator>,
    capabilities: &ShellCapabilities,
) -> VersionDescriptor {
    VersionDescriptor {
        name: "forge-runner".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        revision: option_env!("FORGE_REVISION").unwrap_or("").to_string(),
        platform: std::env::consts::OS.to_string(),
        architecture: std::env::consts::ARCH.to_string(),
        executor: Some("process".to_string()),
        shell: Some(generator.shell().to_string()),
        features: capabilities.feature_flags(),
    }
}

/// Registers with the coordinator, retrying transient failures with
/// exponential backoff
///
/// Transport errors and unknown statuses are retried (the coordinator may
/// not be up yet, common in container environments); a forbidden answer is
/// final because retrying a bad registration token cannot help.
async fn register_with_retry(
    client: &Arc<CoordinatorClient>,
    identity: &forge_core::domain::runner::RunnerIdentity,
    version: &VersionDescriptor,
    config: &Config,
) -> Result<String> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client
            .register_runner(identity, version, &config.description, &config.tags)
            .await
        {
            RegistrationOutcome::Registered(response) => {
                if attempt > 1 {
                    info!(attempt, "Registered with coordinator after retrying");
                }
                return Ok(response.token);
            }
            RegistrationOutcome::Forbidden => {
                anyhow::bail!("registration rejected: check the registration token");
            }
            outcome @ (RegistrationOutcome::TransportError(_)
            | RegistrationOutcome::Failed { .. }) => {
                if attempt >= MAX_RETRIES {
                    anyhow::bail!(
                        "failed to register with coordinator after {MAX_RETRIES} attempts: {outcome:?}"
                    );
                }
                warn!(attempt, max = MAX_RETRIES, ?outcome, "Registration failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
