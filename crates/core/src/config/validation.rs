//! Configuration validation rules.
//!
//! Validation runs after loading from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL
    /// - `cache_version` is empty or contains whitespace
    /// - `api_prefix` or `payload_path` doesn't start with `/`
    /// - `payload_path` is outside `api_prefix`
    /// - a static extension doesn't start with `.`
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - an entry cap is set to 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;

        if self.cache_version.is_empty() || self.cache_version.chars().any(char::is_whitespace) {
            return Err(invalid("cache_version", "must be non-empty and contain no whitespace"));
        }

        if !self.api_prefix.starts_with('/') {
            return Err(invalid("api_prefix", "must start with '/'"));
        }
        if !self.payload_path.starts_with('/') {
            return Err(invalid("payload_path", "must start with '/'"));
        }
        if !self.payload_path.starts_with(&self.api_prefix) {
            return Err(invalid("payload_path", "must live under api_prefix"));
        }
        if self.cacheable_api_routes.iter().any(|route| self.payload_path.contains(route.as_str())) {
            tracing::warn!(
                payload_path = %self.payload_path,
                "payload_path matches a cacheable API route; live responses may overwrite injected payloads"
            );
        }

        if let Some(ext) = self.static_extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(ConfigError::Invalid {
                field: "static_extensions".into(),
                reason: format!("{ext:?} must start with '.'"),
            });
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.max_data_entries == Some(0) {
            return Err(invalid("max_data_entries", "must be greater than 0 when set"));
        }
        if self.max_tile_entries == Some(0) {
            return Err(invalid("max_tile_entries", "must be greater than 0 when set"));
        }

        if self.tile_providers.iter().any(String::is_empty) {
            tracing::warn!("empty tile provider entry matches every host; classification falls back to map tiles");
        }

        Ok(())
    }
}
