//! Configuration loading from environment variables.
//!
//! Uses the following environment variables:
//! - `TOKEN`: Agent credential issued by the backend (required)
//! - `AGENT_SERVER_URL`: Backend address (default: https://pb.control-hub.org)
//! - `AGENT_PYTHON_BINARY`: Interpreter used to run executions (default: python3)
//! - `AGENT_EXECUTION_TIMEOUT_SECS`: Wall-clock limit per execution (default: none)
//! - `AGENT_WORK_DIR`: Directory for temporary execution files (default: system temp dir)
//! - `AGENT_SHUTDOWN_GRACE_SECS`: How long shutdown waits for running executions (default: 0)
//! - `AGENT_CREATE_EVENTS_ONLY`: Only react to newly created executions (default: false)
//! - `AGENT_HTTP_TIMEOUT_SECS`: Timeout for individual backend requests (default: 30)

use std::{env, fmt, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};

/// Default backend address
pub const DEFAULT_SERVER_URL: &str = "https://pb.control-hub.org";

/// Default interpreter for execution payloads
pub const DEFAULT_PYTHON_BINARY: &str = "python3";

/// Default timeout for backend REST calls
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Agent configuration
#[derive(Clone)]
pub struct AgentConfig {
    /// Backend credential; identifies the computer record
    pub token: String,

    /// Backend base URL
    pub server_url: String,

    /// Interpreter executable
    pub python_binary: PathBuf,

    /// Optional per-execution timeout
    pub execution_timeout: Option<Duration>,

    /// Directory for temporary execution artifacts
    pub work_dir: PathBuf,

    /// Grace period for in-flight executions on shutdown
    pub shutdown_grace: Duration,

    /// Ignore update events and only dispatch on record creation
    pub create_events_only: bool,

    /// Timeout for backend REST calls
    pub http_timeout: Duration,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("token", &"<redacted>")
            .field("server_url", &self.server_url)
            .field("python_binary", &self.python_binary)
            .field("execution_timeout", &self.execution_timeout)
            .field("work_dir", &self.work_dir)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("create_events_only", &self.create_events_only)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl AgentConfig {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` file if present, then reads from environment.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists, overriding stale shell values
        dotenvy::dotenv_override().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("TOKEN")
            .filter(|value| !value.trim().is_empty())
            .context("TOKEN environment variable is not set")?;

        let server_url = lookup("AGENT_SERVER_URL")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            bail!("invalid AGENT_SERVER_URL: {server_url}");
        }

        let python_binary = lookup("AGENT_PYTHON_BINARY")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON_BINARY));

        let execution_timeout = match lookup("AGENT_EXECUTION_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                let secs: f64 = raw
                    .trim()
                    .parse()
                    .context("invalid AGENT_EXECUTION_TIMEOUT_SECS format")?;
                if !secs.is_finite() || secs <= 0.0 {
                    bail!("AGENT_EXECUTION_TIMEOUT_SECS must be positive");
                }
                Some(Duration::from_secs_f64(secs))
            }
            _ => None,
        };

        let work_dir = lookup("AGENT_WORK_DIR")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        let shutdown_grace = whole_secs(&lookup, "AGENT_SHUTDOWN_GRACE_SECS")?
            .unwrap_or(Duration::ZERO);

        let create_events_only = lookup("AGENT_CREATE_EVENTS_ONLY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let http_timeout = whole_secs(&lookup, "AGENT_HTTP_TIMEOUT_SECS")?
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        if http_timeout.is_zero() {
            bail!("AGENT_HTTP_TIMEOUT_SECS must be positive");
        }

        Ok(Self {
            token,
            server_url,
            python_binary,
            execution_timeout,
            work_dir,
            shutdown_grace,
            create_events_only,
            http_timeout,
        })
    }
}

/// Parse an unsigned whole-second duration. Unset or blank means `None`.
fn whole_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {key} format"))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        _ => Ok(None),
    }
}
