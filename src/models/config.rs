//! Application configuration structures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Genre, Listing, ListingSelectors};

/// Environment variable that overrides `telegram.bot_token`.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and retry behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Catalog site layout and watched sections
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Persisted state location and bounds
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Message delivery
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration, returning defaults if the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(&path) {
            Err(AppError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("No config at {:?}. Using defaults.", path.as_ref());
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
            result => result,
        }
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.telegram.bot_token = Some(token);
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.catalog.page_size == 0 {
            return Err(AppError::validation("catalog.page_size must be > 0"));
        }
        if self.catalog.genres.is_empty() {
            return Err(AppError::validation("No genres enabled"));
        }
        if self.catalog.listings.is_empty() {
            return Err(AppError::validation("No listings enabled"));
        }
        url::Url::parse(&self.catalog.base_url)?;
        url::Url::parse(&self.catalog.cdn_url)?;
        // A section lists up to two pages; evicting ids still on them
        // would announce those releases again.
        let listed = self.catalog.page_size.saturating_mul(2);
        if self.storage.max_ids_per_section < listed {
            return Err(AppError::validation(format!(
                "storage.max_ids_per_section must be >= {listed} (two pages of catalog.page_size)"
            )));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(AppError::validation(
                "scheduler.poll_interval_secs must be > 0",
            ));
        }
        if self.telegram.send_concurrency == 0 {
            return Err(AppError::validation(
                "telegram.send_concurrency must be > 0",
            ));
        }
        Ok(())
    }
}

/// HTTP client and fetch retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Cooldown before retrying a failed listing fetch
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_secs: u64,

    /// Retries after the first failed attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Delay between section fetches in milliseconds
    #[serde(default)]
    pub request_delay_ms: u64,

    /// Sections processed at once (1 = sequential)
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            retry_delay_secs: defaults::retry_delay(),
            max_retries: defaults::max_retries(),
            request_delay_ms: 0,
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Catalog site layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Host serving audio samples as `{id}.mp3`, `{id}a.mp3`, ...
    #[serde(default = "defaults::cdn_url")]
    pub cdn_url: String,

    /// Releases per listing page; a full page triggers a page-2 fetch
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Appended to a section URL to address its second page
    #[serde(default = "defaults::page_two_suffix")]
    pub page_two_suffix: String,

    #[serde(default = "defaults::genres")]
    pub genres: Vec<Genre>,

    #[serde(default = "defaults::listings")]
    pub listings: Vec<Listing>,

    #[serde(default)]
    pub selectors: ListingSelectors,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            cdn_url: defaults::cdn_url(),
            page_size: defaults::page_size(),
            page_two_suffix: defaults::page_two_suffix(),
            genres: defaults::genres(),
            listings: defaults::listings(),
            selectors: ListingSelectors::default(),
        }
    }
}

/// Persisted state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::root_dir")]
    pub root_dir: PathBuf,

    /// Known ids kept per section before the oldest are evicted
    #[serde(default = "defaults::max_ids_per_section")]
    pub max_ids_per_section: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::root_dir(),
            max_ids_per_section: defaults::max_ids_per_section(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between polling cycles
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::poll_interval(),
        }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default = "defaults::parse_mode")]
    pub parse_mode: String,

    /// Recipients messaged at once for a single release
    #[serde(default = "defaults::send_concurrency")]
    pub send_concurrency: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::api_base(),
            bot_token: None,
            parse_mode: defaults::parse_mode(),
            send_concurrency: defaults::send_concurrency(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::{Genre, Listing};

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/73.0.3683.103 Safari/537.36"
            .into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn retry_delay() -> u64 {
        300
    }
    pub fn max_retries() -> u32 {
        5
    }
    pub fn max_concurrent() -> usize {
        1
    }

    // Catalog defaults
    pub fn base_url() -> String {
        "https://www.redeyerecords.co.uk".into()
    }
    pub fn cdn_url() -> String {
        "https://redeye-391831.c.cdn77.org".into()
    }
    pub fn page_size() -> usize {
        50
    }
    pub fn page_two_suffix() -> String {
        "/page-2".into()
    }
    pub fn genres() -> Vec<Genre> {
        Genre::ALL.to_vec()
    }
    pub fn listings() -> Vec<Listing> {
        Listing::ALL.to_vec()
    }

    // Storage defaults
    pub fn root_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn max_ids_per_section() -> usize {
        1000
    }

    // Scheduler defaults
    pub fn poll_interval() -> u64 {
        600
    }

    // Telegram defaults
    pub fn api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn parse_mode() -> String {
        "Markdown".into()
    }
    pub fn send_concurrency() -> usize {
        4
    }
}
