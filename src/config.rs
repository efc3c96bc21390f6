use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::Backoff;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub polling: PollingConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  /// Where the local database and logs live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Portal API root, e.g. "https://portal.example.org/api"
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
  #[serde(default = "default_notifications_interval_secs")]
  pub notifications_interval_secs: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      notifications_interval_secs: default_notifications_interval_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      base_delay_ms: default_base_delay_ms(),
      max_delay_ms: default_max_delay_ms(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_notifications_interval_secs() -> u64 {
  15
}

fn default_base_delay_ms() -> u64 {
  1000
}

fn default_max_delay_ms() -> u64 {
  30_000
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./carelink.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/carelink/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/carelink/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("carelink.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("carelink").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.polling.notifications_interval_secs == 0 {
      return Err(eyre!("polling.notifications_interval_secs must be positive"));
    }
    Ok(config)
  }

  /// Get the portal API token from environment variables.
  ///
  /// Checks CARELINK_API_TOKEN first, then PORTAL_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("CARELINK_API_TOKEN")
      .or_else(|_| std::env::var("PORTAL_API_TOKEN"))
      .map_err(|_| {
        eyre!("Portal API token not found. Set CARELINK_API_TOKEN or PORTAL_API_TOKEN environment variable.")
      })
  }

  /// Directory for the local database and log files.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .map(|d| d.join("carelink"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("carelink.db"))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn notifications_interval(&self) -> Duration {
    Duration::from_secs(self.polling.notifications_interval_secs)
  }

  pub fn backoff(&self) -> Backoff {
    Backoff::new(
      Duration::from_millis(self.retry.base_delay_ms),
      Duration::from_millis(self.retry.max_delay_ms),
    )
  }
}
