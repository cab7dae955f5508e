//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STASH_*)
//! 2. TOML config file (if STASH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STASH_*)
/// 2. TOML config file (if STASH_CONFIG_FILE set)
/// 3. Built-in defaults
///
/// List-valued fields accept figment's array syntax in the environment,
/// e.g. `STASH_TILE_PROVIDERS='["tile.openstreetmap.org"]'`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via STASH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the application is served from; relative request paths,
    /// the pre-cache manifest and the payload key resolve against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Generation tag of the current namespaces.
    ///
    /// Bumping it makes the next activation delete every older generation.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path prefix identifying API traffic.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// API path substrings whose successful responses are persisted.
    #[serde(default = "default_cacheable_api_routes")]
    pub cacheable_api_routes: Vec<String>,

    /// Hostname substrings identifying map-tile providers.
    #[serde(default = "default_tile_providers")]
    pub tile_providers: Vec<String>,

    /// File extensions treated as cacheable static assets.
    #[serde(default = "default_static_extensions")]
    pub static_extensions: Vec<String>,

    /// Paths fetched and stored unconditionally at install.
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Synthetic path under which `CACHE_PAYLOAD` messages are stored.
    #[serde(default = "default_payload_path")]
    pub payload_path: String,

    /// `error` field of the synthesized offline API response.
    #[serde(default = "default_offline_error")]
    pub offline_error: String,

    /// `message` field of the synthesized offline API response.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Entry cap for the data namespace (unbounded when unset).
    #[serde(default)]
    pub max_data_entries: Option<usize>,

    /// Entry cap for the map-tile namespace (unbounded when unset).
    #[serde(default)]
    pub max_tile_entries: Option<usize>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./stash-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_cacheable_api_routes() -> Vec<String> {
    vec!["/api/properties".into(), "/api/municipalities".into()]
}

fn default_tile_providers() -> Vec<String> {
    vec!["tile.openstreetmap.org".into(), "arcgisonline.com".into(), "basemaps.cartocdn.com".into()]
}

fn default_static_extensions() -> Vec<String> {
    [".js", ".css", ".png", ".jpg", ".jpeg", ".svg", ".woff", ".woff2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_precache_manifest() -> Vec<String> {
    vec!["/".into(), "/index.html".into(), "/manifest.json".into(), "/logo.png".into()]
}

fn default_payload_path() -> String {
    "/api/__offline__/payload".into()
}

fn default_offline_error() -> String {
    "No connection".into()
}

fn default_offline_message() -> String {
    "You are offline and this data has not been saved on this device yet. Try again once the connection is back."
        .into()
}

fn default_user_agent() -> String {
    "stash/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_version: default_cache_version(),
            api_prefix: default_api_prefix(),
            cacheable_api_routes: default_cacheable_api_routes(),
            tile_providers: default_tile_providers(),
            static_extensions: default_static_extensions(),
            precache_manifest: default_precache_manifest(),
            payload_path: default_payload_path(),
            offline_error: default_offline_error(),
            offline_message: default_offline_message(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_data_entries: None,
            max_tile_entries: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed application origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(url),
            _ => Err(ConfigError::Invalid {
                field: "origin".into(),
                reason: "must be an http(s) URL with a host".into(),
            }),
        }
    }

    /// Resolve a path against the origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin or the path is malformed.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(path)
            .map_err(|e| ConfigError::Invalid { field: "path".into(), reason: format!("{path}: {e}") })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STASH_`
    /// 2. TOML file from `STASH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STASH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STASH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
