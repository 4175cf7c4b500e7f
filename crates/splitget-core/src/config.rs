//! User configuration from `$XDG_CONFIG_HOME/splitget/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::http::ClientOptions;
use crate::retry::RetryPolicy;

/// `[retry]` table: backoff for failed range attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per range without progress, including the first.
    pub max_attempts: u32,
    /// First backoff delay in seconds (0.25 = 250ms); doubles per attempt.
    pub base_delay_secs: f64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitgetConfig {
    /// Concurrent ranges when `--workers` is not given.
    pub workers: usize,
    pub connect_timeout_secs: u64,
    /// An attempt is aborted after this many seconds below `low_speed_limit_bytes`/s.
    pub low_speed_time_secs: u64,
    pub low_speed_limit_bytes: u32,
    /// Hard cap on one ranged GET.
    pub attempt_timeout_secs: u64,
    /// Receive buffer size in bytes (None = libcurl default).
    #[serde(default)]
    pub buffer_size: Option<usize>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for SplitgetConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            connect_timeout_secs: 20,
            low_speed_time_secs: 20,
            low_speed_limit_bytes: 1024,
            attempt_timeout_secs: 3600,
            buffer_size: None,
            retry: None,
        }
    }
}

impl SplitgetConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            low_speed_limit: self.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            buffer_size: self.buffer_size,
            ..ClientOptions::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = self.retry.clone().unwrap_or_default();
        RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            base_delay: Duration::try_from_secs_f64(retry.base_delay_secs)
                .unwrap_or(RetryPolicy::default().base_delay),
            max_delay: Duration::from_secs(retry.max_delay_secs),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("splitget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load the config, writing a default file first if there is none.
pub fn load_or_init() -> Result<SplitgetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = SplitgetConfig::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(&cfg)?)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let cfg: SplitgetConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}
