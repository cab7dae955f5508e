//! Client side of stash.
//!
//! This crate provides the network fetch path, request classification, and
//! the interception worker that applies per-class caching strategies on top
//! of the `stash-core` cache registry.

pub mod classify;
pub mod fetch;
pub mod worker;

pub use classify::{Classifier, RequestClass};
pub use fetch::{FetchConfig, FetchRequest, FetchResponse, Fetcher, HttpFetcher, ResponseSource};
pub use worker::{CacheWorker, ControlMessage, ControlOutcome, LifecycleState, WorkerSettings, WorkerStatus};
