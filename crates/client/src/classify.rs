//! Request classification.
//!
//! Rules, first match wins:
//! 1. Non-GET requests are not classified and pass through untouched.
//! 2. Path starts with the API prefix → [`RequestClass::Api`].
//! 3. Host contains a tile-provider substring → [`RequestClass::MapTile`].
//! 4. Path ends in a cacheable extension → [`RequestClass::Static`],
//!    anything else → [`RequestClass::Other`].

use reqwest::{Method, Url};
use serde::Serialize;
use stash_core::AppConfig;

/// Traffic class of an intercepted GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Api,
    MapTile,
    Static,
    Other,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    api_prefix: String,
    tile_providers: Vec<String>,
    static_extensions: Vec<String>,
}

impl Classifier {
    pub fn new(api_prefix: impl Into<String>, tile_providers: Vec<String>, static_extensions: Vec<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            tile_providers: tile_providers.into_iter().map(|p| p.to_ascii_lowercase()).collect(),
            static_extensions: static_extensions.into_iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.api_prefix.clone(),
            config.tile_providers.clone(),
            config.static_extensions.clone(),
        )
    }

    /// Classify a request; `None` means pass through.
    pub fn classify(&self, method: &Method, url: &Url) -> Option<RequestClass> {
        if *method != Method::GET {
            return None;
        }

        let class = if url.path().starts_with(&self.api_prefix) {
            RequestClass::Api
        } else if self.is_tile_provider(url) {
            RequestClass::MapTile
        } else if self.is_cacheable_asset(url) {
            RequestClass::Static
        } else {
            RequestClass::Other
        };

        Some(class)
    }

    /// Whether the URL path ends in one of the cacheable extensions.
    pub fn is_cacheable_asset(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        self.static_extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    fn is_tile_provider(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| self.tile_providers.iter().any(|provider| host.contains(provider.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::from_config(&AppConfig::default())
    }

    fn get(url: &str) -> Option<RequestClass> {
        classifier().classify(&Method::GET, &Url::parse(url).unwrap())
    }

    #[test]
    fn test_non_get_passes_through() {
        let url = Url::parse("https://app.example.com/api/properties").unwrap();
        assert_eq!(classifier().classify(&Method::POST, &url), None);
        assert_eq!(classifier().classify(&Method::DELETE, &url), None);
    }

    #[test]
    fn test_api_prefix() {
        assert_eq!(get("https://app.example.com/api/petitions/42"), Some(RequestClass::Api));
        assert_eq!(get("https://app.example.com/api/properties?page=1"), Some(RequestClass::Api));
    }

    #[test]
    fn test_api_prefix_is_path_prefix_only() {
        assert_eq!(get("https://app.example.com/docs/api/index.html"), Some(RequestClass::Other));
    }

    #[test]
    fn test_tile_provider_substring() {
        assert_eq!(get("https://b.tile.openstreetmap.org/5/10/12.png"), Some(RequestClass::MapTile));
        assert_eq!(
            get("https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/3/2/1"),
            Some(RequestClass::MapTile)
        );
    }

    #[test]
    fn test_api_prefix_wins_over_tile_provider() {
        assert_eq!(get("https://tile.openstreetmap.org/api/0.6/map"), Some(RequestClass::Api));
    }

    #[test]
    fn test_static_extensions() {
        for path in ["app.js", "styles.css", "logo.png", "a.jpg", "b.jpeg", "icon.svg", "f.woff", "f.woff2"] {
            assert_eq!(get(&format!("https://app.example.com/assets/{path}")), Some(RequestClass::Static), "{path}");
        }
        assert_eq!(get("https://app.example.com/LOGO.PNG"), Some(RequestClass::Static));
    }

    #[test]
    fn test_other() {
        assert_eq!(get("https://app.example.com/"), Some(RequestClass::Other));
        assert_eq!(get("https://app.example.com/manifest.json"), Some(RequestClass::Other));
        assert_eq!(get("https://app.example.com/app.js.map"), Some(RequestClass::Other));
    }

    #[test]
    fn test_query_does_not_affect_extension() {
        assert_eq!(get("https://app.example.com/app.js?v=3"), Some(RequestClass::Static));
        assert_eq!(get("https://app.example.com/download?file=x.js"), Some(RequestClass::Other));
    }
}
