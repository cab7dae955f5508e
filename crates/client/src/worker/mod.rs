//! The interception worker.
//!
//! [`CacheWorker`] is the explicitly constructed service object standing in
//! for a browser background script: it owns handles to the three current
//! namespaces, a [`Fetcher`] for the real network, and the lifecycle state.
//! Entry points:
//!
//! - [`CacheWorker::install`] / [`CacheWorker::activate`]: lifecycle transitions
//! - [`CacheWorker::handle`]: per-request interception
//! - [`CacheWorker::post_message`] / [`CacheWorker::handle_control`]: control channel
//!
//! Each call is independent. Cache entries are the only durable state.

mod background;
pub mod control;
pub mod lifecycle;
mod offline;
mod strategy;

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::Url;
use serde::Serialize;
use stash_core::{AppConfig, CacheDb, CacheNames, Error, Namespace};

use crate::classify::{Classifier, RequestClass};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use background::BackgroundTasks;

pub use control::{ControlMessage, ControlOutcome};
pub use lifecycle::{ActivateOutcome, InstallOutcome, LifecycleState};

/// Policy derived from [`AppConfig`], resolved once at startup.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub generation: String,
    pub origin: Url,
    /// Offline landing page for navigations.
    pub root_url: Url,
    /// Synthetic key for `CACHE_PAYLOAD` messages.
    pub payload_url: Url,
    pub manifest: Vec<Url>,
    pub cacheable_api_routes: Vec<String>,
    pub offline_error: String,
    pub offline_message: String,
    pub max_data_entries: Option<usize>,
    pub max_tile_entries: Option<usize>,
    pub classifier: Classifier,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let resolve = |path: &str| config.resolve(path).map_err(|e| Error::InvalidInput(e.to_string()));
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        let manifest = config
            .precache_manifest
            .iter()
            .map(|path| resolve(path.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            generation: config.cache_version.clone(),
            origin,
            root_url: resolve("/")?,
            payload_url: resolve(&config.payload_path)?,
            manifest,
            cacheable_api_routes: config.cacheable_api_routes.clone(),
            offline_error: config.offline_error.clone(),
            offline_message: config.offline_message.clone(),
            max_data_entries: config.max_data_entries,
            max_tile_entries: config.max_tile_entries,
            classifier: Classifier::from_config(config),
        })
    }

    /// Whether a successful API response for `path` may be persisted.
    pub fn is_cacheable_route(&self, path: &str) -> bool {
        self.cacheable_api_routes.iter().any(|route| path.contains(route.as_str()))
    }
}

/// Per-namespace summary for [`CacheWorker::status`].
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStatus {
    pub name: String,
    pub entries: u64,
    pub current: bool,
}

/// Snapshot of the worker for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: LifecycleState,
    pub generation: String,
    pub namespaces: Vec<NamespaceStatus>,
    pub pending_tasks: usize,
}

pub struct CacheWorker {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    settings: Arc<WorkerSettings>,
    names: CacheNames,
    static_assets: Namespace,
    data: Namespace,
    map_tiles: Namespace,
    state: Mutex<LifecycleState>,
    background: BackgroundTasks,
}

impl CacheWorker {
    pub fn new(db: CacheDb, fetcher: Arc<dyn Fetcher>, settings: WorkerSettings) -> Self {
        let names = CacheNames::for_generation(&settings.generation);
        Self {
            static_assets: db.namespace(&names.static_assets),
            data: db.namespace(&names.data),
            map_tiles: db.namespace(&names.map_tiles),
            db,
            fetcher,
            settings: Arc::new(settings),
            names,
            state: Mutex::new(LifecycleState::Uninstalled),
            background: BackgroundTasks::default(),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "lifecycle transition");
        *state = next;
    }

    /// Key of the `CACHE_PAYLOAD` entry in the data namespace.
    fn payload_key(&self) -> String {
        FetchRequest::get(self.settings.payload_url.clone()).cache_key()
    }

    /// Classification the worker would apply to `request`.
    pub fn classify(&self, request: &FetchRequest) -> Option<RequestClass> {
        self.settings.classifier.classify(&request.method, &request.url)
    }

    /// Intercept one request.
    ///
    /// Classified GET requests always produce a response (live, cached, or
    /// synthesized). Requests that are not intercepted (non-GET, or the worker
    /// is not active yet) go straight to the network and surface transport
    /// failures as [`Error::Network`].
    pub async fn handle(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        if self.state() != LifecycleState::Active {
            tracing::debug!(url = %request.url, "worker not active, passing through");
            return self.pass_through(&request).await;
        }

        let Some(class) = self.classify(&request) else {
            return self.pass_through(&request).await;
        };

        tracing::debug!(method = %request.method, url = %request.url, ?class, "intercepted request");

        let response = match class {
            RequestClass::Api => self.network_first(&request).await,
            RequestClass::MapTile => self.stale_while_revalidate(&request).await,
            RequestClass::Static | RequestClass::Other => self.cache_first(&request).await,
        };

        Ok(response)
    }

    async fn pass_through(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        Ok(self.fetcher.fetch(request).await?)
    }

    /// Wait for every detached store/refresh task to finish.
    ///
    /// Never needed for correctness of [`CacheWorker::handle`]; used by tests
    /// and graceful shutdown.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        let current = [&self.names.static_assets, &self.names.data, &self.names.map_tiles];
        let mut namespaces = Vec::new();
        for name in self.db.owned_namespaces().await? {
            let entries = self.db.namespace(&name).len().await?;
            let is_current = current.contains(&&name);
            namespaces.push(NamespaceStatus { name, entries, current: is_current });
        }

        Ok(WorkerStatus {
            state: self.state(),
            generation: self.settings.generation.clone(),
            namespaces,
            pending_tasks: self.background.pending(),
        })
    }
}
