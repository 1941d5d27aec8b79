//! Execution Agent - Runs pushed code executions for this computer.
//!
//! This binary starts the agent:
//! - Loads configuration (the `TOKEN` credential is required)
//! - Registers the computer as idle with its current ip/mac
//! - Subscribes to the execution feed and runs each new execution
//! - Marks the computer offline and unsubscribes on shutdown, then waits for
//!   executions still running (a second signal abandons them)
//!
//! Configuration is via environment variables (see `execution_agent::config`),
//! with the flags below taking precedence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{select, signal};
use tracing::{error, info, warn};

use execution_agent::{
    Agent, AgentConfig, AgentOptions, HostIdentity, ObservabilityOptions, PocketBaseBackend,
    PocketBaseConfig, RunnerConfig, SandboxRunner, observability,
};

#[derive(Parser, Debug)]
#[command(
    name = "execution-agent",
    about = "Run code executions pushed to this computer"
)]
struct Args {
    /// Backend base URL (overrides AGENT_SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// Interpreter used to run executions (overrides AGENT_PYTHON_BINARY)
    #[arg(long)]
    python: Option<PathBuf>,

    /// Per-execution timeout in seconds (overrides AGENT_EXECUTION_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Seconds to wait for running executions on shutdown
    #[arg(long)]
    shutdown_grace_secs: Option<u64>,

    /// Write a chrome trace to this path (requires the `trace` feature)
    #[arg(long)]
    trace_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    observability::init(ObservabilityOptions {
        trace_path: args.trace_path.clone(),
    });
    info!("starting execution agent");

    let result = run(args).await;
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "execution agent stopped");
    }
    observability::flush();
    result
}

async fn run(args: Args) -> Result<()> {
    let mut config = AgentConfig::from_env()?;
    if let Some(server_url) = args.server_url {
        config.server_url = server_url;
    }
    if let Some(python) = args.python {
        config.python_binary = python;
    }
    if let Some(secs) = args.timeout_secs {
        anyhow::ensure!(secs.is_finite() && secs > 0.0, "--timeout-secs must be positive");
        config.execution_timeout = Some(Duration::from_secs_f64(secs));
    }
    if let Some(secs) = args.shutdown_grace_secs {
        config.shutdown_grace = Duration::from_secs(secs);
    }

    info!(
        server_url = %config.server_url,
        python = %config.python_binary.display(),
        timeout = ?config.execution_timeout,
        work_dir = %config.work_dir.display(),
        "loaded configuration"
    );

    let backend = PocketBaseBackend::new(PocketBaseConfig {
        request_timeout: config.http_timeout,
        ..PocketBaseConfig::new(config.server_url.clone(), config.token.clone())
    })
    .context("failed to build backend client")?;

    let runner = SandboxRunner::new(
        RunnerConfig::default()
            .with_interpreter(config.python_binary.clone())
            .with_work_dir(config.work_dir.clone()),
    );

    let agent = Agent::initialize(
        Arc::new(backend),
        runner,
        AgentOptions::from(&config),
        HostIdentity::probe(),
    )
    .await
    .context("failed to initialize agent")?;

    let outcome = agent.run(wait_for_shutdown()).await;
    if let Ok(report) = &outcome {
        info!(
            offline_written = report.offline_written,
            unsubscribed = ?report.unsubscribed,
            detached = report.detached,
            "shutdown complete"
        );
    }

    // Returning drops the runtime, which would kill running executions.
    let detached = agent.detached_count();
    if detached > 0 {
        info!(detached, "waiting for running executions, signal again to abandon them");
        select! {
            finished = agent.wait_for_detached() => {
                info!(finished, "running executions finished");
            }
            _ = wait_for_shutdown() => {
                warn!(detached, "abandoning running executions");
            }
        }
    }

    outcome?;
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        let mut terminate = match unix_signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
                info!("Ctrl+C received");
                return;
            }
        };
        select! {
            _ = signal::ctrl_c() => {
                info!("Ctrl+C received");
            }
            _ = terminate.recv() => {
                info!("SIGTERM received");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Ctrl+C received");
    }
}
