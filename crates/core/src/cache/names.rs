//! Namespace naming: `<purpose>-<generation>`.
//!
//! A namespace belongs to this cache layer when its name starts with one of
//! the known purposes followed by a dash. Everything after the dash is the
//! generation tag, which may itself contain dashes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical purpose of a cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// Application shell and static assets.
    Static,
    /// API responses and injected payloads.
    Data,
    /// Map tiles from third-party providers.
    MapTiles,
}

impl Purpose {
    pub const ALL: [Purpose; 3] = [Purpose::Static, Purpose::Data, Purpose::MapTiles];

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Static => "static",
            Purpose::Data => "data",
            Purpose::MapTiles => "map-tiles",
        }
    }

    /// Name prefix shared by every generation of this purpose.
    pub fn prefix(self) -> String {
        format!("{}-", self.as_str())
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified namespace name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheName {
    pub purpose: Purpose,
    pub generation: String,
}

impl CacheName {
    pub fn new(purpose: Purpose, generation: impl Into<String>) -> Self {
        Self { purpose, generation: generation.into() }
    }

    /// Parse a stored namespace name.
    ///
    /// Returns None for names this cache layer does not own.
    pub fn parse(name: &str) -> Option<Self> {
        Purpose::ALL.iter().find_map(|purpose| {
            name.strip_prefix(purpose.as_str())
                .and_then(|rest| rest.strip_prefix('-'))
                .filter(|generation| !generation.is_empty())
                .map(|generation| Self::new(*purpose, generation))
        })
    }

    /// Whether `name` is owned but belongs to a generation other than `current`.
    pub fn is_stale(name: &str, current: &str) -> bool {
        Self::parse(name).is_some_and(|parsed| parsed.generation != current)
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.purpose, self.generation)
    }
}

/// The three current namespace names for one generation.
#[derive(Debug, Clone)]
pub struct CacheNames {
    pub static_assets: String,
    pub data: String,
    pub map_tiles: String,
}

impl CacheNames {
    pub fn for_generation(generation: &str) -> Self {
        Self {
            static_assets: CacheName::new(Purpose::Static, generation).to_string(),
            data: CacheName::new(Purpose::Data, generation).to_string(),
            map_tiles: CacheName::new(Purpose::MapTiles, generation).to_string(),
        }
    }
}
