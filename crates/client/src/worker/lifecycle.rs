//! Install and activate transitions.
//!
//! ```text
//! uninstalled ──install──▶ installing ──ok──▶ installed ──activate──▶ activating ──▶ active
//!      ▲                        │                                                      │
//!      └───────── failed ───────┘                       activate (re-run GC) ◀─────────┘
//! ```
//!
//! Install is all-or-nothing: every manifest asset is fetched first and the
//! whole batch is committed in one transaction. Activate deletes every owned
//! namespace from another generation, concurrently, then claims clients.

use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use stash_core::cache::NewEntry;
use stash_core::{CacheName, Error};

use super::CacheWorker;
use crate::fetch::FetchRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninstalled,
    Installing,
    Installed,
    Activating,
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub namespace: String,
    pub cached: usize,
    /// The new generation may activate immediately.
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateOutcome {
    pub generation: String,
    pub deleted: Vec<String>,
    /// Stale namespaces whose deletion failed; retried on the next activation.
    pub failed: Vec<String>,
    /// Already-open clients are now intercepted without a reload.
    pub claimed: bool,
}

impl CacheWorker {
    /// Move to `next` if the current state is one of `allowed`.
    ///
    /// An active worker stays active while activation re-runs, so requests
    /// keep being intercepted. Returns the state to restore if the
    /// transition fails.
    fn begin(&self, next: LifecycleState, allowed: &[LifecycleState]) -> Result<LifecycleState, Error> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !allowed.contains(&*state) {
            return Err(Error::InvalidState(format!("cannot move from {:?} to {:?}", *state, next)));
        }
        let previous = *state;
        if !(previous == LifecycleState::Active && next == LifecycleState::Activating) {
            *state = next;
        }
        Ok(previous)
    }

    /// Pre-cache the manifest into the current static namespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` if any asset fails (transport error or
    /// non-success status) or the batch cannot be written; nothing is
    /// committed and the previous state is restored so install can be retried.
    pub async fn install(&self) -> Result<InstallOutcome, Error> {
        let previous = self.begin(
            LifecycleState::Installing,
            &[LifecycleState::Uninstalled, LifecycleState::Installed],
        )?;
        tracing::info!(generation = %self.settings.generation, assets = self.settings.manifest.len(), "installing");

        match self.precache().await {
            Ok(cached) => {
                self.set_state(LifecycleState::Installed);
                tracing::info!(namespace = self.static_assets.name(), cached, "installed");
                Ok(InstallOutcome { namespace: self.static_assets.name().to_string(), cached, skip_waiting: true })
            }
            Err(e) => {
                self.set_state(previous);
                tracing::warn!(error = %e, "install failed, keeping previous version");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let fetches = self.settings.manifest.iter().map(|url| async move {
            let request = FetchRequest::get(url.clone());
            let response = match self.fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => return Err(Error::InstallFailed(format!("{url}: {e}"))),
            };
            if !response.status.is_success() {
                return Err(Error::InstallFailed(format!("{url}: status {}", response.status.as_u16())));
            }
            Ok(NewEntry { key: request.cache_key(), url: url.to_string(), response: response.to_stored() })
        });

        let entries = try_join_all(fetches).await?;
        self.static_assets
            .put_all(entries)
            .await
            .map_err(|e| Error::InstallFailed(e.to_string()))
    }

    /// Delete stale generations and start intercepting.
    ///
    /// Deletion failures are logged and reported in the outcome; they never
    /// block the other deletions or the activation itself.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the worker is installed (or
    /// already active), and propagates failures to enumerate namespaces.
    pub async fn activate(&self) -> Result<ActivateOutcome, Error> {
        let previous = self.begin(
            LifecycleState::Activating,
            &[LifecycleState::Installed, LifecycleState::Active],
        )?;

        let owned = match self.db.owned_namespaces().await {
            Ok(owned) => owned,
            Err(e) => {
                self.set_state(previous);
                return Err(e);
            }
        };

        let generation = &self.settings.generation;
        let stale: Vec<String> = owned.into_iter().filter(|name| CacheName::is_stale(name, generation)).collect();

        let deletions = stale.iter().map(|name| async move { (name, self.db.delete_namespace(name).await) });
        let results = join_all(deletions).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in results {
            match result {
                Ok(_) => deleted.push(name.clone()),
                Err(e) => {
                    tracing::warn!(namespace = %name, error = %e, "failed to delete stale namespace");
                    failed.push(name.clone());
                }
            }
        }

        self.set_state(LifecycleState::Active);
        tracing::info!(
            generation = %generation,
            deleted = deleted.len(),
            failed = failed.len(),
            "activated, claiming clients"
        );

        Ok(ActivateOutcome { generation: generation.clone(), deleted, failed, claimed: true })
    }
}
