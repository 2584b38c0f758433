//! Configuration types and loading logic.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use redirect_tracing::TracingConfig;
use serde::Deserialize;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub redirect: RedirectPolicyConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Base URL used for playlist links. When unset, links are built as
    /// `https://{Host}` from the incoming request.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

/// Liveness probe settings shared by every race.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Budget for a single probe, independent of any outer request timeout.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Where channel data comes from.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_channels_file")]
    pub channels_file: String,

    /// Inline JSON channel data. Takes precedence over `channels_file`
    /// when it parses to a non-empty group list.
    #[serde(default)]
    pub channels_data: Option<String>,

    #[serde(default = "default_logo_base_url")]
    pub logo_base_url: String,
}

/// Response policy for successful resolutions.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectPolicyConfig {
    /// `max-age` / `s-maxage` on 302 responses.
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,
}

/// Playlist rendering options.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default = "default_epg_urls")]
    pub epg_urls: Vec<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0:3080".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    1200
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_channels_file() -> String {
    "public/channels.json".to_string()
}

fn default_logo_base_url() -> String {
    "https://gcore.jsdelivr.net/gh/fanmingming/live/tv/".to_string()
}

fn default_cache_max_age() -> u64 {
    60
}

fn default_epg_urls() -> Vec<String> {
    vec![
        "https://epg.freejptv.com/jp.xml".to_string(),
        "https://animenosekai.github.io/japanterebi-xmltv/guide.xml".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            public_base_url: None,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            channels_file: default_channels_file(),
            channels_data: None,
            logo_base_url: default_logo_base_url(),
        }
    }
}

impl Default for RedirectPolicyConfig {
    fn default() -> Self {
        Self {
            cache_max_age_secs: default_cache_max_age(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            epg_urls: default_epg_urls(),
        }
    }
}

impl RedirectConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (REDIRECT_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    ///
    /// `CHANNELS_DATA` is also honored as the inline channel data, so an
    /// existing deployment's environment keeps working.
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let mut config = Self::from_figment(
            Figment::new()
                .merge(Toml::file(config_path))
                .merge(Env::prefixed("REDIRECT_").split("__")),
        )?;

        if let Ok(data) = std::env::var("CHANNELS_DATA") {
            config.directory.channels_data = Some(data);
        }

        Ok(config)
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        Ok(figment.extract()?)
    }
}
