//! Fetch strategies and the router that picks one per request.
//!
//! Every path through [`StrategyExecutor::handle`] resolves to a
//! [`Response`]: network failures turn into a cached fallback or a
//! synthesized offline response, and cache failures only skip the cache
//! step they affect.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::classify::{Category, Classifier};
use crate::config::WorkerConfig;
use crate::error::{ErrorSlot, FetchError};
use crate::http::{CacheKey, Request, Response};
use crate::network::Network;
use crate::offline::{self, OfflineLink};
use crate::store::CacheStore;

/// Request-handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Serve from cache, fetch and store on a miss.
    CacheFirst,
    /// Fetch and store, fall back to the cache when offline.
    NetworkFirst,
    /// Fetch only; the cache is never read or written.
    NetworkOnly,
    /// Serve from cache and refresh it in the background.
    StaleWhileRevalidate,
}

impl From<Category> for Strategy {
    fn from(category: Category) -> Self {
        match category {
            Category::StaticAsset => Self::CacheFirst,
            Category::HtmlPage => Self::NetworkFirst,
            Category::ApiCall => Self::NetworkOnly,
            Category::Other => Self::StaleWhileRevalidate,
        }
    }
}

/// The current cache generation plus the slot its failures are reported to.
#[derive(Clone)]
struct CacheHandle {
    store: Arc<dyn CacheStore>,
    name: String,
    errors: ErrorSlot,
}

impl CacheHandle {
    async fn lookup(&self, key: &CacheKey) -> Option<Response> {
        match self.store.get(&self.name, key).await {
            Ok(hit) => hit,
            Err(e) => {
                self.errors.record("cache-read", &e);
                None
            }
        }
    }

    /// Stores successful responses; failures are recorded, not returned.
    async fn store_if_ok(&self, key: CacheKey, response: &Response) {
        if !response.is_ok() {
            return;
        }
        if let Err(e) = self.store.put(&self.name, key, response.clone()).await {
            self.errors.record("cache-write", &e);
        }
    }
}

async fn fetch_and_store(
    network: &dyn Network,
    cache: &CacheHandle,
    request: &Request,
) -> Result<Response, FetchError> {
    let response = network.fetch(request).await?;
    cache.store_if_ok(request.cache_key(), &response).await;
    Ok(response)
}

/// Routes intercepted requests to a [`Strategy`] and runs it.
pub struct StrategyExecutor {
    cache: CacheHandle,
    network: Arc<dyn Network>,
    classifier: Classifier,
    offline_page: String,
    offline_links: Vec<OfflineLink>,
    refreshes: TaskTracker,
}

impl StrategyExecutor {
    /// Creates an executor serving the generation named by `config`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        config: &WorkerConfig,
        errors: ErrorSlot,
    ) -> Self {
        Self {
            cache: CacheHandle {
                store,
                name: config.cache_name(),
                errors,
            },
            network,
            classifier: Classifier::new(config.rules.clone()),
            offline_page: config.offline_page.clone(),
            offline_links: config.offline_links.clone(),
            refreshes: TaskTracker::new(),
        }
    }

    /// Returns the classifier used for routing.
    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Picks the strategy for `request`.
    #[must_use]
    pub fn strategy_for(&self, request: &Request) -> Strategy {
        if request.is_get() {
            self.classifier.classify(&request.url).into()
        } else {
            // The cache only holds GET entries.
            Strategy::NetworkOnly
        }
    }

    /// Handles an intercepted request.
    pub async fn handle(&self, request: &Request) -> Response {
        if !request.is_http() {
            return match self.network.fetch(request).await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("Passthrough of {} failed: {e}", request.url);
                    offline::unavailable()
                }
            };
        }
        self.execute(self.strategy_for(request), request).await
    }

    /// Runs a specific strategy.
    pub async fn execute(&self, strategy: Strategy, request: &Request) -> Response {
        log::debug!("{strategy:?} {} {}", request.method, request.url);
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::NetworkOnly => self.network_only(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Waits for every background refresh started so far.
    pub async fn settle(&self) {
        self.refreshes.close();
        self.refreshes.wait().await;
        self.refreshes.reopen();
    }

    /// Number of background refreshes still running.
    #[must_use]
    pub fn pending_refreshes(&self) -> usize {
        self.refreshes.len()
    }

    async fn cache_first(&self, request: &Request) -> Response {
        let key = request.cache_key();
        if let Some(hit) = self.cache.lookup(&key).await {
            return hit;
        }
        match self.network.fetch(request).await {
            Ok(response) => {
                self.cache.store_if_ok(key, &response).await;
                response
            }
            Err(e) => {
                log::warn!("Cache first: {} unavailable: {e}", request.url);
                self.offline_fallback(request).await
            }
        }
    }

    async fn network_first(&self, request: &Request) -> Response {
        match fetch_and_store(self.network.as_ref(), &self.cache, request).await {
            Ok(response) => response,
            Err(e) => {
                log::info!("Network first: falling back to cache for {} ({e})", request.url);
                match self.cache.lookup(&request.cache_key()).await {
                    Some(hit) => hit,
                    None => self.offline_fallback(request).await,
                }
            }
        }
    }

    async fn network_only(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Network only: {} failed: {e}", request.url);
                offline::api_unavailable()
            }
        }
    }

    async fn stale_while_revalidate(&self, request: &Request) -> Response {
        if let Some(hit) = self.cache.lookup(&request.cache_key()).await {
            let cache = self.cache.clone();
            let network = Arc::clone(&self.network);
            let request = request.clone();
            self.refreshes.spawn(async move {
                if let Err(e) = fetch_and_store(network.as_ref(), &cache, &request).await {
                    log::debug!("Background refresh of {} failed: {e}", request.url);
                }
            });
            return hit;
        }
        match fetch_and_store(self.network.as_ref(), &self.cache, request).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Stale while revalidate: {} unavailable: {e}", request.url);
                self.offline_fallback(request).await
            }
        }
    }

    async fn offline_fallback(&self, request: &Request) -> Response {
        if !self.classifier.is_page(request.url.path()) {
            return offline::unavailable();
        }
        if let Ok(url) = request.url.join(&self.offline_page)
            && let Some(page) = self.cache.lookup(&CacheKey::new("GET", &url)).await
        {
            return page;
        }
        offline::offline_page(&self.offline_links)
    }
}
