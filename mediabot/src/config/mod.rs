//! Application configuration.
//!
//! Configuration is read from a JSON file. Every section has defaults, so
//! an empty object `{}` is a valid configuration. A few settings can be
//! overridden from the environment after the file is loaded.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{DEFAULT_MAILBOX_CAPACITY, RestartPolicy};
use crate::torrent_client::ClientKind;
use crate::{Error, Result};

pub const ENV_DATABASE_URL: &str = "MEDIABOT_DATABASE_URL";
pub const ENV_LOG_FILTER: &str = "MEDIABOT_LOG_FILTER";
pub const ENV_TORRENT_CLIENT: &str = "MEDIABOT_TORRENT_CLIENT";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingSettings,
    pub bus: BusConfig,
    pub crawler: CrawlerConfig,
    pub trackers: TrackersConfig,
    pub torrent_client: TorrentClientConfig,
    pub media_server: Option<MediaServerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://mediabot.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Directory for daily rolling log files. Console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: crate::logging::DEFAULT_LOG_FILTER.to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the shared inbound queue.
    pub inbound_capacity: usize,
    /// Capacity of each actor mailbox.
    pub mailbox_capacity: usize,
    pub supervise_interval_secs: u64,
    pub restart: RestartPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            supervise_interval_secs: 30,
            restart: RestartPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of concurrently running workers.
    pub workers: usize,
    pub tick_interval_secs: u64,
    /// Candidates offered to the user for a serial.
    pub series_candidates: usize,
    /// Audio tag preferred by the users, matched case-insensitively.
    pub preferred_audio: String,
    /// Titles older than this many years fall back to unfiltered candidates.
    pub old_title_years: i32,
    pub film_size_min_gb: f64,
    pub film_size_max_gb: f64,
    /// Films must have fewer files than this.
    pub film_max_files: u32,
    /// Interval of the broad background check, 0 disables it.
    pub periodic_check_secs: u64,
    /// User the periodic check runs on behalf of.
    pub admin_id: i64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tick_interval_secs: 1,
            series_candidates: 8,
            preferred_audio: "RUSSIAN".to_string(),
            old_title_years: 15,
            film_size_min_gb: 3.5,
            film_size_max_gb: 15.0,
            film_max_files: 4,
            periodic_check_secs: 3 * 60 * 60,
            admin_id: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackersConfig {
    pub jackett: Option<JackettConfig>,
    /// HTTP proxy used for tracker requests.
    pub proxy: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackettConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_indexer")]
    pub indexer: String,
}

fn default_indexer() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentClientConfig {
    pub kind: ClientKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Download directory for films on the daemon's side.
    pub film_dir: String,
    pub serial_dir: String,
    /// Watch directories used by the folder backend.
    pub folder_film_dir: PathBuf,
    pub folder_serial_dir: PathBuf,
    pub watch_interval_secs: u64,
    /// Wall-clock ceiling for one progress watch.
    pub watch_timeout_secs: u64,
}

impl Default for TorrentClientConfig {
    fn default() -> Self {
        Self {
            kind: ClientKind::Folder,
            host: "127.0.0.1".to_string(),
            port: 8112,
            user: String::new(),
            password: String::new(),
            film_dir: "/downloads/films".to_string(),
            serial_dir: "/downloads/serials".to_string(),
            folder_film_dir: PathBuf::from("watch/films"),
            folder_serial_dir: PathBuf::from("watch/serials"),
            watch_interval_secs: 300,
            watch_timeout_secs: 3600,
        }
    }
}

impl TorrentClientConfig {
    /// Base URL of the daemon's HTTP interface.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaServerConfig {
    pub url: String,
    pub token: String,
    /// Library section refreshed after a download completes.
    #[serde(default)]
    pub section: Option<String>,
}

impl AppConfig {
    /// Load from a JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("failed to read {}: {e}", path.display()))
                })?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database.url = url;
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER) {
            self.logging.filter = filter;
        }
        if let Some(kind) = lookup(ENV_TORRENT_CLIENT) {
            self.torrent_client.kind = ClientKind::parse(&kind).ok_or_else(|| {
                Error::config(format!("unknown torrent client `{kind}` in {ENV_TORRENT_CLIENT}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.crawler.workers == 0 {
            return Err(Error::config("crawler.workers must be at least 1"));
        }
        if self.bus.mailbox_capacity == 0 || self.bus.inbound_capacity == 0 {
            return Err(Error::config("bus queue capacities must be at least 1"));
        }
        if self.crawler.film_size_min_gb > self.crawler.film_size_max_gb {
            return Err(Error::config(
                "crawler.film_size_min_gb exceeds crawler.film_size_max_gb",
            ));
        }
        if self.crawler.tick_interval_secs == 0 || self.bus.supervise_interval_secs == 0 {
            return Err(Error::config("intervals must be at least one second"));
        }
        Ok(())
    }
}
