//! Worker lifecycle: install, activate and cache generation cleanup.
//!
//! States advance `parsed → installing → installed → activating →
//! activated`; a failed install ends in `redundant`. Transitions are driven
//! by the host, never by the worker itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::WorkerConfig;
use crate::error::{Error, ErrorSlot, FetchError, Result};
use crate::http::{CacheKey, Request, Response};
use crate::network::Network;
use crate::store::CacheStore;

/// Lifecycle state of a worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created, no lifecycle event seen yet.
    Parsed,
    /// Populating the cache from the manifest.
    Installing,
    /// Manifest cached; waiting to activate.
    Installed,
    /// Deleting old generations.
    Activating,
    /// Serving requests.
    Activated,
    /// Install failed; this generation will never activate.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Drives install and activation of the current cache generation.
pub struct Lifecycle {
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    cache_name: String,
    scope: Url,
    manifest: Vec<String>,
    errors: ErrorSlot,
    state: Mutex<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl Lifecycle {
    /// Creates the lifecycle manager for the generation in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured scope is not an absolute URL.
    pub fn new(
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        config: &WorkerConfig,
        errors: ErrorSlot,
    ) -> Result<Self> {
        Ok(Self {
            store,
            network,
            cache_name: config.cache_name(),
            scope: config.scope_url()?,
            manifest: config.manifest.clone(),
            errors,
            state: Mutex::new(LifecycleState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        log::debug!("{}: {} -> {state}", self.cache_name, self.state());
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn expect_state(&self, action: &'static str, allowed: &[LifecycleState]) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(Error::InvalidState { action, state })
        }
    }

    /// Returns the name of the current generation.
    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Marks the generation to activate as soon as it is installed.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    /// Returns true if activation should not wait for old clients.
    #[must_use]
    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Caches every manifest URL.
    ///
    /// All URLs are fetched before anything is written; a single failed or
    /// non-2xx fetch fails the install and leaves the generation redundant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Install`] naming the first URL that failed, or a
    /// cache error if the entries cannot be written.
    pub async fn install(&self) -> Result<usize> {
        self.expect_state(
            "install",
            &[LifecycleState::Parsed, LifecycleState::Redundant],
        )?;
        self.set_state(LifecycleState::Installing);
        log::info!("Installing {} ({} URLs)", self.cache_name, self.manifest.len());

        match self.precache().await {
            Ok(count) => {
                self.set_state(LifecycleState::Installed);
                self.skip_waiting();
                log::info!("Installed {}: {count} entries cached", self.cache_name);
                Ok(count)
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant);
                self.errors.record("install", &e);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        self.store.open(&self.cache_name).await?;
        let entries =
            try_join_all(self.manifest.iter().map(|path| self.fetch_manifest_entry(path))).await?;
        let count = entries.len();
        for (key, response) in entries {
            self.store.put(&self.cache_name, key, response).await?;
        }
        Ok(count)
    }

    async fn fetch_manifest_entry(&self, path: &str) -> Result<(CacheKey, Response)> {
        let request = Request::new("GET", self.scope.join(path)?);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|reason| Error::Install {
                url: path.to_string(),
                reason,
            })?;
        if !response.is_ok() {
            return Err(Error::Install {
                url: path.to_string(),
                reason: FetchError::Status(response.status),
            });
        }
        Ok((request.cache_key(), response))
    }

    /// Deletes old generations and marks the worker active.
    ///
    /// Safe to repeat: a second activation finds nothing left to delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker was never installed or if cleanup
    /// fails.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.expect_state(
            "activate",
            &[
                LifecycleState::Installed,
                LifecycleState::Activating,
                LifecycleState::Activated,
            ],
        )?;
        self.set_state(LifecycleState::Activating);
        let deleted = self.clean_old_caches().await?;
        self.set_state(LifecycleState::Activated);
        log::info!("Activated {}", self.cache_name);
        Ok(deleted)
    }

    /// Deletes every cache generation except the current one.
    ///
    /// Returns the deleted names. Every stale generation is attempted even
    /// when one deletion fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub async fn clean_old_caches(&self) -> Result<Vec<String>> {
        let names = match self.store.keys().await {
            Ok(names) => names,
            Err(e) => {
                self.errors.record("cache-cleanup", &e);
                return Err(e.into());
            }
        };
        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| name != &self.cache_name)
            .collect();

        let results = join_all(stale.iter().map(|name| self.store.delete(name))).await;

        let mut deleted = Vec::new();
        let mut first_error = None;
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    log::info!("Deleted old cache {name}");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => {
                    self.errors.record("cache-cleanup", &e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(deleted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::mock::{BrokenStore, MockNetwork, SCOPE, url};
    use crate::store::MemoryCacheStore;

    const CACHE: &str = "portfolio-v1.0.0";

    fn config() -> WorkerConfig {
        WorkerConfig::default()
            .with_scope(SCOPE)
            .with_manifest(["/", "/cv.html", "/styles.css"])
    }

    fn serving_network() -> Arc<MockNetwork> {
        let network = Arc::new(MockNetwork::new());
        for path in ["/", "/cv.html", "/styles.css"] {
            network.serve(&url(path), Response::ok(path.to_string()));
        }
        network
    }

    fn lifecycle(store: Arc<dyn CacheStore>, network: Arc<MockNetwork>) -> (Lifecycle, ErrorSlot) {
        let errors = ErrorSlot::new();
        let lc = Lifecycle::new(store, network, &config(), errors.clone()).unwrap();
        (lc, errors)
    }

    #[tokio::test]
    async fn install_caches_manifest() {
        let store = Arc::new(MemoryCacheStore::new());
        let network = serving_network();
        let (lc, _) = lifecycle(store.clone(), network.clone());

        assert_eq!(lc.install().await.unwrap(), 3);
        assert_eq!(lc.state(), LifecycleState::Installed);
        assert!(lc.skips_waiting());
        assert_eq!(network.calls(), 3);

        let key = Request::get(&url("/cv.html")).unwrap().cache_key();
        let hit = store.get(CACHE, &key).await.unwrap().unwrap();
        assert_eq!(hit.text(), "/cv.html");
    }

    #[tokio::test]
    async fn install_fails_fast_on_network_error() {
        let store = Arc::new(MemoryCacheStore::new());
        let network = serving_network();
        network.fail(&url("/cv.html"), FetchError::Dns);
        let (lc, errors) = lifecycle(store.clone(), network);

        let err = lc.install().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Install { ref url, reason: FetchError::Dns } if url == "/cv.html"
        ));
        assert_eq!(lc.state(), LifecycleState::Redundant);
        assert!(store.entries(CACHE).await.unwrap().is_empty());
        assert_eq!(errors.get().unwrap().context, "install");
    }

    #[tokio::test]
    async fn install_rejects_error_status() {
        let store = Arc::new(MemoryCacheStore::new());
        let network = serving_network();
        network.serve(&url("/styles.css"), Response::new(404, "gone"));
        let (lc, _) = lifecycle(store, network);

        let err = lc.install().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Install { reason: FetchError::Status(404), .. }
        ));
    }

    #[tokio::test]
    async fn install_can_be_retried_after_failure() {
        let store = Arc::new(MemoryCacheStore::new());
        let network = serving_network();
        network.set_offline(true);
        let (lc, _) = lifecycle(store, network.clone());
        assert!(lc.install().await.is_err());

        network.set_offline(false);
        assert_eq!(lc.install().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn install_twice_is_rejected() {
        let (lc, _) = lifecycle(Arc::new(MemoryCacheStore::new()), serving_network());
        lc.install().await.unwrap();
        assert!(matches!(
            lc.install().await,
            Err(Error::InvalidState { action: "install", state: LifecycleState::Installed })
        ));
    }

    #[tokio::test]
    async fn activate_requires_install() {
        let (lc, _) = lifecycle(Arc::new(MemoryCacheStore::new()), serving_network());
        assert!(matches!(lc.activate().await, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn activate_deletes_other_generations() {
        let store = Arc::new(MemoryCacheStore::new());
        store.open("portfolio-v0.9.0").await.unwrap();
        store.open("portfolio-v1.0.0-beta").await.unwrap();
        let (lc, _) = lifecycle(store.clone(), serving_network());

        lc.install().await.unwrap();
        let deleted = lc.activate().await.unwrap();
        assert_eq!(deleted, vec!["portfolio-v0.9.0", "portfolio-v1.0.0-beta"]);
        assert_eq!(lc.state(), LifecycleState::Activated);
        assert_eq!(store.keys().await.unwrap(), vec![CACHE]);
    }

    #[tokio::test]
    async fn double_activation_keeps_one_generation() {
        let store = Arc::new(MemoryCacheStore::new());
        store.open("portfolio-v0.1.0").await.unwrap();
        let (lc, _) = lifecycle(store.clone(), serving_network());
        lc.install().await.unwrap();

        lc.activate().await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec![CACHE]);
        assert!(lc.activate().await.unwrap().is_empty());
        assert_eq!(store.keys().await.unwrap(), vec![CACHE]);
    }

    #[tokio::test]
    async fn cleanup_failure_is_reported() {
        let (lc, errors) = lifecycle(Arc::new(BrokenStore), serving_network());
        let err = lc.clean_old_caches().await.unwrap_err();
        assert!(matches!(err, Error::Cache(CacheError::Io(_))));
        assert_eq!(errors.get().unwrap().context, "cache-cleanup");
    }

    #[test]
    fn state_display() {
        assert_eq!(LifecycleState::Activated.to_string(), "activated");
        assert_eq!(LifecycleState::Redundant.to_string(), "redundant");
    }
}
