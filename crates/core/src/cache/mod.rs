//! SQLite-backed cache registry.
//!
//! Persistent, named key-value namespaces of response snapshots, accessed
//! asynchronously via tokio-rusqlite. It provides:
//!
//! - Lazily created namespaces named `<purpose>-<generation>`
//! - Request keys derived from method and canonical URL
//! - Open, match, put, and delete-by-prefix operations
//! - Optional oldest-first trimming for bounded namespaces

pub mod connection;
pub mod entries;
#[cfg(any(test, feature = "testing"))]
pub mod faults;
pub mod hash;
pub mod migrations;
pub mod names;
pub mod namespaces;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{Namespace, NewEntry, StoredResponse};
pub use hash::request_key;
pub use names::{CacheName, CacheNames, Purpose};
