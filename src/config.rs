//! Layered settings: built-in defaults, an optional TOML file, then
//! `RUNFLOW_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Where the starting URL for a run comes from.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StartingUrlMode {
    /// Always use the configured demo URL; the planner's URL is ignored.
    Demo,
    /// Use the planner's URL when its host is on the allowlist.
    Plan,
    /// Accept any public http(s) URL; the SSRF guard still applies.
    AnyPublic,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind address for the HTTP API.
    pub listen_addr: String,
    /// Allowed CORS origins for the front end.
    pub cors_origins: Vec<String>,
    /// Root directory for screenshot artifacts.
    pub artifacts_dir: PathBuf,

    pub starting_url_mode: StartingUrlMode,
    pub demo_starting_url: String,
    /// Hostnames accepted in `plan` mode.
    pub allowed_starting_hosts: Vec<String>,

    pub headless: bool,
    pub dns_timeout_ms: u64,
    pub session_idle_timeout_secs: u64,
    pub session_reap_interval_secs: u64,

    pub max_plan_len: usize,
    pub embedding_dimension: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".into(),
            cors_origins: vec!["http://localhost:3000".into()],
            artifacts_dir: PathBuf::from("artifacts"),
            starting_url_mode: StartingUrlMode::Demo,
            demo_starting_url: "https://the-internet.herokuapp.com/".into(),
            allowed_starting_hosts: vec!["the-internet.herokuapp.com".into()],
            headless: true,
            dns_timeout_ms: 1500,
            session_idle_timeout_secs: 120,
            session_reap_interval_secs: 30,
            max_plan_len: 32,
            embedding_dimension: 256,
        }
    }
}

impl Settings {
    /// Load settings. The file is optional; environment variables use the
    /// `RUNFLOW_` prefix (e.g. `RUNFLOW_LISTEN_ADDR`, `RUNFLOW_HEADLESS`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("RUNFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("assembling configuration sources")?;
        let settings: Settings = cfg
            .try_deserialize()
            .context("deserializing configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dns_timeout_ms == 0 {
            anyhow::bail!("dns_timeout_ms must be > 0");
        }
        if self.max_plan_len == 0 {
            anyhow::bail!("max_plan_len must be > 0");
        }
        if self.starting_url_mode == StartingUrlMode::Plan && self.allowed_starting_hosts.is_empty()
        {
            anyhow::bail!("allowed_starting_hosts must not be empty in plan mode");
        }
        Ok(())
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn session_reap_interval(&self) -> Duration {
        Duration::from_secs(self.session_reap_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn plan_mode_requires_allowlist() {
        let settings = Settings {
            starting_url_mode: StartingUrlMode::Plan,
            allowed_starting_hosts: vec![],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
