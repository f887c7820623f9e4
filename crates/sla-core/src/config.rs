use crate::error::{Result, SlaError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Environment keys
// ---------------------------------------------------------------------------

pub const ENV_POLL_INTERVAL_MS: &str = "SLA_POLL_INTERVAL_MS";
pub const ENV_APP_URL: &str = "APP_URL";
pub const ENV_OPS_EMAIL: &str = "SLA_OPS_EMAIL";
pub const ENV_TEAMS_WEBHOOK_URL: &str = "SLA_TEAMS_WEBHOOK_URL";
pub const ENV_EMAIL_RELAY_URL: &str = "SLA_EMAIL_RELAY_URL";
pub const ENV_TEMPLATE_DIR: &str = "SLA_TEMPLATE_DIR";
pub const ENV_TICK_TIMEOUT_MS: &str = "SLA_TICK_TIMEOUT_MS";
pub const ENV_NOTIFY_RETRIES: &str = "SLA_NOTIFY_RETRIES";
pub const ENV_RETRY_BACKOFF_MS: &str = "SLA_RETRY_BACKOFF_MS";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PollerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Base URL placed into notification payloads.
    #[serde(default = "default_app_url")]
    pub app_url: String,
    /// Fixed recipient for breach alerts.
    #[serde(default = "default_ops_email")]
    pub ops_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams_webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_relay_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_timeout_ms: Option<u64>,
    /// Extra delivery attempts after the first. Zero disables retry.
    #[serde(default)]
    pub notify_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_ops_email() -> String {
    "ops@localhost".to_string()
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            app_url: default_app_url(),
            ops_email: default_ops_email(),
            teams_webhook_url: None,
            email_relay_url: None,
            template_dir: None,
            tick_timeout_ms: None,
            notify_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl PollerConfig {
    /// Load from an optional YAML file, then apply environment overrides.
    ///
    /// A `path` that doesn't exist is an error; `None` starts from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: PollerConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Override fields from `lookup` (normally `std::env::var`). Empty values
    /// are treated as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_num(ENV_POLL_INTERVAL_MS, &v)?;
        }
        if let Some(v) = get(ENV_APP_URL) {
            self.app_url = v;
        }
        if let Some(v) = get(ENV_OPS_EMAIL) {
            self.ops_email = v;
        }
        if let Some(v) = get(ENV_TEAMS_WEBHOOK_URL) {
            self.teams_webhook_url = Some(v);
        }
        if let Some(v) = get(ENV_EMAIL_RELAY_URL) {
            self.email_relay_url = Some(v);
        }
        if let Some(v) = get(ENV_TEMPLATE_DIR) {
            self.template_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_TICK_TIMEOUT_MS) {
            self.tick_timeout_ms = Some(parse_num(ENV_TICK_TIMEOUT_MS, &v)?);
        }
        if let Some(v) = get(ENV_NOTIFY_RETRIES) {
            self.notify_retries = parse_num(ENV_NOTIFY_RETRIES, &v)?;
        }
        if let Some(v) = get(ENV_RETRY_BACKOFF_MS) {
            self.retry_backoff_ms = parse_num(ENV_RETRY_BACKOFF_MS, &v)?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tick_timeout(&self) -> Option<Duration> {
        self.tick_timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.poll_interval_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "poll_interval_ms must be greater than zero".to_string(),
            });
        }

        if !is_http_url(&self.app_url) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "app_url '{}' is not an http(s) URL; ticket links will be broken",
                    self.app_url
                ),
            });
        }

        if self.ops_email.trim().is_empty() || !self.ops_email.contains('@') {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("ops_email '{}' is not an email address", self.ops_email),
            });
        }

        for (name, url) in [
            ("teams_webhook_url", &self.teams_webhook_url),
            ("email_relay_url", &self.email_relay_url),
        ] {
            if let Some(url) = url {
                if !is_http_url(url) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("{name} '{url}' is not an http(s) URL"),
                    });
                }
            }
        }

        if let Some(timeout) = self.tick_timeout_ms {
            if timeout == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "tick_timeout_ms must be greater than zero when set".to_string(),
                });
            } else if timeout > self.poll_interval_ms {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "tick_timeout_ms ({timeout}) exceeds poll_interval_ms ({}); ticks may overlap",
                        self.poll_interval_ms
                    ),
                });
            }
        }

        warnings
    }

    /// Fail on the first `Error`-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(SlaError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| SlaError::InvalidConfig(format!("{key}: expected a number, got '{raw}'")))
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
