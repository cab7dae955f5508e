//! Core types and shared functionality for stash.
//!
//! This crate provides:
//! - Cache registry with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheName, CacheNames, Namespace, Purpose, StoredResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
