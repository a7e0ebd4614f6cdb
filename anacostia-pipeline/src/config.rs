//! Pipeline configuration
//!
//! Defines all configurable parameters for a pipeline process: bind address,
//! role, store location, run deadline, monitor cadence and connector retry
//! budget.

use std::path::PathBuf;
use std::time::Duration;

use anacostia_client::RetryPolicy;

/// Pipeline role within a federation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineRole {
    /// Owns the run lifecycle (and the dashboard)
    Root,
    /// Callee; derives run boundaries from inbound connector traffic
    Leaf,
}

/// TLS material for the HTTP listener
///
/// Carried and validated here; certificate provisioning and termination are
/// external concerns.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Pipeline configuration
///
/// All timeouts and intervals are configurable to allow tuning for different
/// deployment scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pipeline name; doubles as the pipeline id in node identities
    pub name: String,

    /// Bind host for the HTTP server
    pub host: String,

    /// Bind port for the HTTP server (0 picks an ephemeral port)
    pub port: u16,

    /// Root or leaf role
    pub role: PipelineRole,

    /// SQLite URL for the metadata store (e.g., "sqlite://anacostia.db")
    pub database_url: String,

    /// URL peers should use to reach this pipeline; defaults to
    /// `http://{host}:{port}`
    pub public_url: Option<String>,

    /// Optional TLS material for the listener
    pub tls: Option<TlsConfig>,

    /// Per-run deadline; a run whose deadline elapses is force-skipped and
    /// ended. Unbounded by default.
    pub run_deadline: Option<Duration>,

    /// Rescan cadence for resource monitors
    pub monitor_poll_interval: Duration,

    /// Retry budget for connector sends
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// Creates a new configuration with defaults
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            role: PipelineRole::Root,
            database_url: "sqlite::memory:".to_string(),
            public_url: None,
            tls: None,
            run_deadline: None,
            monitor_poll_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_role(mut self, role: PipelineRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The URL peers should use to reach this pipeline
    pub fn base_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("pipeline name cannot be empty");
        }

        if self.name.contains('/') {
            anyhow::bail!("pipeline name cannot contain '/'");
        }

        if self.host.is_empty() {
            anyhow::bail!("host cannot be empty");
        }

        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("database_url must be a sqlite: URL");
        }

        if let Some(url) = &self.public_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("public_url must start with http:// or https://");
            }
        }

        if let Some(tls) = &self.tls {
            if tls.cert.as_os_str().is_empty() || tls.key.as_os_str().is_empty() {
                anyhow::bail!("tls cert and key paths cannot be empty");
            }
        }

        if self.monitor_poll_interval.is_zero() {
            anyhow::bail!("monitor_poll_interval must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::new("root", "127.0.0.1", 8000);
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
        assert_eq!(config.role, PipelineRole::Root);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::new("root", "127.0.0.1", 8000);
        assert!(config.validate().is_ok());

        config.name = String::new();
        assert!(config.validate().is_err());

        config.name = "has/slash".to_string();
        assert!(config.validate().is_err());

        config.name = "root".to_string();
        config.database_url = "postgres://nope".to_string();
        assert!(config.validate().is_err());

        config.database_url = "sqlite::memory:".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_public_url_overrides_base_url() {
        let mut config = PipelineConfig::new("root", "0.0.0.0", 8000);
        config.public_url = Some("http://pipelines.example.com:8000".to_string());
        assert_eq!(config.base_url(), "http://pipelines.example.com:8000");
    }
}
