//! Configuration management for aggre using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collectors::hackernews::HackernewsConfig;
use crate::collectors::http_client::HttpClientOptions;
use crate::collectors::huggingface::HuggingfaceConfig;
use crate::collectors::lobsters::LobstersConfig;
use crate::collectors::rate_limiter::RateLimitConfig;
use crate::collectors::reddit::RedditConfig;
use crate::collectors::rss::RssConfig;
use crate::collectors::youtube::YoutubeConfig;
use crate::repository::DbContext;
use crate::storage::BronzeStore;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "aggre.db";

/// Default bronze subdirectory name.
const BRONZE_SUBDIR: &str = "bronze";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "AGGRE_";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside `data_dir`.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Root of the bronze artifact store.
    pub bronze_dir: PathBuf,
    /// User agent override (`None` = browser default).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Proxy for every outbound request.
    pub proxy_url: Option<String>,
    /// Minimum seconds between Reddit requests.
    pub reddit_rate_limit: f64,
    /// Minimum seconds between Hacker News requests.
    pub hn_rate_limit: f64,
    /// Minimum seconds between Lobsters requests.
    pub lobsters_rate_limit: f64,
    /// Minimum seconds between Hugging Face requests.
    pub huggingface_rate_limit: f64,
    /// Whisper model name.
    pub whisper_model: String,
    /// Whisper executable.
    pub whisper_binary: String,
    /// yt-dlp executable.
    pub ytdlp_binary: String,
    /// Audio files larger than this are not transcribed.
    pub max_audio_bytes: u64,
    /// Wall-clock limit for extracting one document, in seconds.
    pub extract_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aggre");

        Self {
            bronze_dir: data_dir.join(BRONZE_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: None,
            request_timeout: 30,
            proxy_url: None,
            reddit_rate_limit: 3.0,
            hn_rate_limit: 1.0,
            lobsters_rate_limit: 2.0,
            huggingface_rate_limit: 1.0,
            whisper_model: "large-v3-turbo".to_string(),
            whisper_binary: "whisper".to_string(),
            ytdlp_binary: "yt-dlp".to_string(),
            max_audio_bytes: 500 * 1024 * 1024,
            extract_timeout: 90,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            bronze_dir: data_dir.join(BRONZE_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data and bronze directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.bronze_dir)?;
        Ok(())
    }

    /// Create a database context.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    /// Open the bronze store.
    pub fn bronze_store(&self) -> BronzeStore {
        BronzeStore::new(&self.bronze_dir)
    }

    /// Options for the shared HTTP client.
    pub fn http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout),
            proxy_url: self.proxy_url.clone(),
        }
    }

    /// Per-domain minimum delays for the API hosts each adapter talks to.
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::default()
            .with_domain_delay("reddit.com", secs(self.reddit_rate_limit))
            .with_domain_delay("hn.algolia.com", secs(self.hn_rate_limit))
            .with_domain_delay("lobste.rs", secs(self.lobsters_rate_limit))
            .with_domain_delay("huggingface.co", secs(self.huggingface_rate_limit))
    }

    /// Apply `AGGRE_*` overrides from a variable lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.is_empty())
        };

        if let Some(data_dir) = var("DATA_DIR") {
            let data_dir = PathBuf::from(shellexpand::tilde(&data_dir).as_ref());
            self.bronze_dir = data_dir.join(BRONZE_SUBDIR);
            self.data_dir = data_dir;
        }
        if let Some(url) = var("DATABASE_URL") {
            tracing::debug!("Using {}DATABASE_URL from environment", ENV_PREFIX);
            self.database_url = Some(url);
        }
        if let Some(proxy) = var("PROXY_URL") {
            self.proxy_url = Some(proxy);
        }
        if let Some(model) = var("WHISPER_MODEL") {
            self.whisper_model = model;
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// Per-source minimum delays as written in the config file (seconds).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reddit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hackernews: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobsters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huggingface: Option<f64>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Bronze store directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bronze_dir: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Per-source request pacing.
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Whisper model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_model: Option<String>,
    /// Largest audio file to transcribe, in MiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_audio_mb: Option<u64>,
    /// Extraction timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_timeout: Option<u64>,
    #[serde(default)]
    pub hackernews: HackernewsConfig,
    #[serde(default)]
    pub lobsters: LobstersConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
    #[serde(default)]
    pub huggingface: HuggingfaceConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers aggre config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("aggre").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.bronze_dir = settings.data_dir.join(BRONZE_SUBDIR);
        }
        if let Some(ref bronze_dir) = self.bronze_dir {
            settings.bronze_dir = self.resolve_path(bronze_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ref proxy) = self.proxy_url {
            settings.proxy_url = Some(proxy.clone());
        }
        if let Some(v) = self.rate_limits.reddit {
            settings.reddit_rate_limit = v;
        }
        if let Some(v) = self.rate_limits.hackernews {
            settings.hn_rate_limit = v;
        }
        if let Some(v) = self.rate_limits.lobsters {
            settings.lobsters_rate_limit = v;
        }
        if let Some(v) = self.rate_limits.huggingface {
            settings.huggingface_rate_limit = v;
        }
        if let Some(ref model) = self.whisper_model {
            settings.whisper_model = model.clone();
        }
        if let Some(mb) = self.max_audio_mb {
            settings.max_audio_bytes = mb * 1024 * 1024;
        }
        if let Some(timeout) = self.extract_timeout {
            settings.extract_timeout = timeout;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // Environment takes highest precedence.
    settings.apply_env_overrides(|name| std::env::var(name).ok());

    (settings, config)
}
