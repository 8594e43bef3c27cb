//! Runtime configuration: defaults, an optional TOML file, environment
//! variables, and CLI flags, in that order of increasing precedence.
//!
//! This layering lives entirely in the binary — the core library types
//! (`IndexedStore`, `BlobStore`, `Alerter`, `RetentionSweeper`) only ever see
//! plain constructor arguments, never a `Config` or an environment variable.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::alert::{AlerterConfig, ChatConfig, SmtpConfig, DEFAULT_QUEUE_CAPACITY};

pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_SWEEP_INTERVAL_HOURS: u64 = 24;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "crashhub.db";
pub const DEFAULT_BLOB_ROOT: &str = "crashhub-blobs";

/// The subset of configuration that can be loaded from a TOML file. Every
/// field is optional so a file can override just one setting.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub blob_root: Option<PathBuf>,
    pub default_retention_days: Option<i64>,
    pub sweep_interval_hours: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub smtp: Option<SmtpFileConfig>,
    pub chat_webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SmtpFileConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Fully resolved configuration, assembled by the binary from defaults, an
/// optional file, environment variables, and CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub blob_root: PathBuf,
    pub default_retention_days: i64,
    pub sweep_interval: Duration,
    pub queue_capacity: usize,
    pub smtp: Option<SmtpConfig>,
    pub chat_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            blob_root: PathBuf::from(DEFAULT_BLOB_ROOT),
            default_retention_days: DEFAULT_RETENTION_DAYS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_HOURS * 3600),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            smtp: None,
            chat_webhook_url: None,
        }
    }
}

impl Config {
    /// Reads `path` as TOML and layers it over `self`. Missing fields in the
    /// file leave the current value untouched.
    pub fn merge_file(mut self, contents: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(contents)?;
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.blob_root {
            self.blob_root = v;
        }
        if let Some(v) = file.default_retention_days {
            self.default_retention_days = v;
        }
        if let Some(v) = file.sweep_interval_hours {
            self.sweep_interval = Duration::from_secs(v * 3600);
        }
        if let Some(v) = file.queue_capacity {
            self.queue_capacity = v;
        }
        if let Some(smtp) = file.smtp {
            self.smtp = Some(SmtpConfig {
                host: smtp.host,
                port: smtp.port,
                username: smtp.username,
                password: smtp.password,
                from: smtp.from,
            });
        }
        if let Some(v) = file.chat_webhook_url {
            self.chat_webhook_url = Some(v);
        }
        Ok(self)
    }

    pub fn alerter_config(&self) -> AlerterConfig {
        AlerterConfig {
            queue_capacity: self.queue_capacity,
            smtp: self.smtp.clone(),
            chat: self.chat_webhook_url.clone().map(|url| ChatConfig {
                default_webhook_url: Some(url),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults_selectively() {
        let toml = r#"
            port = 9090
            default_retention_days = 14
        "#;
        let config = Config::default().merge_file(toml).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.default_retention_days, 14);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn smtp_block_is_optional() {
        let config = Config::default().merge_file("port = 1234").unwrap();
        assert!(config.smtp.is_none());
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(Config::default().merge_file("not valid toml =").is_err());
    }
}
