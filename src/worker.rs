//! The service worker: one object receiving every host event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::config::WorkerConfig;
use crate::error::{ErrorSlot, LastError, Result};
use crate::host::Host;
use crate::http::{Request, Response};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::message::{MessageReply, VersionInfo, WorkerMessage};
use crate::network::Network;
use crate::push::{self, ClickOutcome, Notification, NotificationAction, NotificationConfig};
use crate::store::CacheStore;
use crate::strategy::StrategyExecutor;
use crate::sync::{self, PendingSyncItem, SyncQueue, SyncReport};

/// An event delivered by the host runtime.
#[derive(Debug, Clone)]
pub enum Event {
    /// Populate the cache for this generation.
    Install,
    /// Take over from older generations.
    Activate,
    /// An intercepted request.
    Fetch(Request),
    /// A push message with its raw payload.
    Push(Option<Bytes>),
    /// A click on a displayed notification.
    NotificationClick {
        /// Action identifier, empty for the notification body.
        action: String,
        /// URL stored in the notification data.
        url: Option<String>,
    },
    /// A background sync with its tag.
    Sync(String),
    /// A message posted by a page.
    Message(serde_json::Value),
}

/// Result of handling an [`Event`].
#[derive(Debug)]
pub enum EventOutcome {
    /// Number of manifest entries cached.
    Installed(usize),
    /// Names of the deleted generations.
    Activated(Vec<String>),
    /// Response for an intercepted request.
    Response(Response),
    /// Notification shown for a push, if any.
    Notification(Option<Notification>),
    /// Where a notification click led.
    Click(ClickOutcome),
    /// Sync report, `None` for unrecognised tags.
    Sync(Option<SyncReport>),
    /// Reply to a page message.
    Reply(Option<MessageReply>),
}

/// Snapshot of the worker for status pages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    /// Lifecycle state of this generation.
    pub state: LifecycleState,
    /// Configured version.
    pub version: String,
    /// Name of the current cache generation.
    pub cache_name: String,
    /// Whether open clients have been claimed.
    pub clients_claimed: bool,
    /// Background refreshes still running.
    pub pending_refreshes: usize,
    /// Most recent administrative failure.
    pub last_error: Option<LastError>,
}

/// Contents of one cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    /// Generation name.
    pub name: String,
    /// Number of entries.
    pub size: usize,
    /// URLs of the entries, sorted.
    pub urls: Vec<String>,
}

/// Offline caching worker for the portfolio site.
///
/// All collaborators are injected, so the same worker runs against the
/// axum host, an in-memory cache, or test doubles.
pub struct ServiceWorker {
    version: String,
    lifecycle: Lifecycle,
    executor: StrategyExecutor,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    queue: Arc<dyn SyncQueue>,
    notification: NotificationConfig,
    sync_tag: String,
    sync_endpoint: Url,
    clients_claimed: AtomicBool,
    errors: ErrorSlot,
}

impl ServiceWorker {
    /// Creates a worker for the generation described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope or sync endpoint is not a valid URL.
    pub fn new(
        config: &WorkerConfig,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        host: Arc<dyn Host>,
        queue: Arc<dyn SyncQueue>,
    ) -> Result<Self> {
        let errors = ErrorSlot::new();
        let sync_endpoint = config.scope_url()?.join(&config.sync_endpoint)?;
        Ok(Self {
            version: config.version.clone(),
            lifecycle: Lifecycle::new(store.clone(), network.clone(), config, errors.clone())?,
            executor: StrategyExecutor::new(store.clone(), network.clone(), config, errors.clone()),
            store,
            network,
            host,
            queue,
            notification: config.notification.clone(),
            sync_tag: config.sync_tag.clone(),
            sync_endpoint,
            clients_claimed: AtomicBool::new(false),
            errors,
        })
    }

    /// Dispatches a host event to its handler.
    ///
    /// # Errors
    ///
    /// Returns the handler's error. Fetch events never fail.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        Ok(match event {
            Event::Install => EventOutcome::Installed(self.install().await?),
            Event::Activate => EventOutcome::Activated(self.activate().await?),
            Event::Fetch(request) => EventOutcome::Response(self.fetch(&request).await),
            Event::Push(data) => EventOutcome::Notification(self.push(data.as_deref()).await?),
            Event::NotificationClick { action, url } => {
                EventOutcome::Click(self.notification_click(&action, url.as_deref()).await?)
            }
            Event::Sync(tag) => EventOutcome::Sync(self.sync(&tag).await?),
            Event::Message(value) => EventOutcome::Reply(self.message(&value).await?),
        })
    }

    /// Installs, then activates immediately when skip-waiting is set.
    ///
    /// # Errors
    ///
    /// Returns the install or activation error.
    pub async fn start(&self) -> Result<LifecycleState> {
        self.install().await?;
        if self.lifecycle.skips_waiting() {
            self.activate().await?;
        }
        Ok(self.lifecycle.state())
    }

    /// Caches the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if any manifest URL could not be cached.
    pub async fn install(&self) -> Result<usize> {
        self.lifecycle.install().await
    }

    /// Deletes old generations and claims every open client.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is not installed or cleanup fails.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let deleted = self.lifecycle.activate().await?;
        match self.host.claim().await {
            Ok(()) => self.clients_claimed.store(true, Ordering::SeqCst),
            Err(e) => self.errors.record("claim", &e),
        }
        Ok(deleted)
    }

    /// Answers an intercepted request.
    pub async fn fetch(&self, request: &Request) -> Response {
        self.executor.handle(request).await
    }

    /// Shows the notification for a push message.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or the host cannot
    /// display it. The failure is also kept as the last error.
    pub async fn push(&self, data: Option<&[u8]>) -> Result<Option<Notification>> {
        push::show_push(self.host.as_ref(), &self.notification, data)
            .await
            .inspect_err(|e| self.errors.record("push", e))
    }

    /// Handles a click on a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot focus or open a window.
    pub async fn notification_click(&self, action: &str, url: Option<&str>) -> Result<ClickOutcome> {
        push::handle_click(self.host.as_ref(), NotificationAction::parse(action), url)
            .await
            .inspect_err(|e| self.errors.record("notification-click", e))
    }

    /// Replays pending work for the background sync tag.
    ///
    /// Other tags are ignored and yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending queue cannot be read.
    pub async fn sync(&self, tag: &str) -> Result<Option<SyncReport>> {
        if tag != self.sync_tag {
            log::debug!("Ignoring sync tag {tag}");
            return Ok(None);
        }
        let report = sync::replay(
            self.queue.as_ref(),
            self.network.as_ref(),
            &self.sync_endpoint,
            &self.errors,
        )
        .await?;
        log::info!("Background sync: {} sent, {} failed", report.sent, report.failed);
        Ok(Some(report))
    }

    /// Queues a JSON payload for the next background sync. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be written.
    pub async fn queue_sync(&self, payload: &serde_json::Value) -> Result<String> {
        let item = PendingSyncItem::new(payload)?;
        let id = item.id.clone();
        self.queue.push(item).await?;
        Ok(id)
    }

    /// Handles a message posted by a page.
    ///
    /// # Errors
    ///
    /// Returns an error if a triggered activation or cleanup fails.
    pub async fn message(&self, value: &serde_json::Value) -> Result<Option<MessageReply>> {
        let Some(message) = WorkerMessage::from_value(value) else {
            log::debug!("Ignoring message {value}");
            return Ok(None);
        };
        match message {
            WorkerMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                if self.lifecycle.state() == LifecycleState::Installed {
                    self.activate().await?;
                }
                Ok(None)
            }
            WorkerMessage::CleanCache => {
                let deleted = self.lifecycle.clean_old_caches().await?;
                log::info!("Cache cleanup removed {} generation(s)", deleted.len());
                Ok(None)
            }
            WorkerMessage::GetVersion => Ok(Some(MessageReply::Version(VersionInfo {
                version: self.version.clone(),
                cache_name: self.lifecycle.cache_name().to_string(),
            }))),
        }
    }

    /// Waits for background cache refreshes to finish.
    pub async fn settle(&self) {
        self.executor.settle().await;
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Returns the most recent administrative failure.
    #[must_use]
    pub fn last_error(&self) -> Option<LastError> {
        self.errors.get()
    }

    /// Returns and clears the most recent administrative failure.
    pub fn take_last_error(&self) -> Option<LastError> {
        self.errors.take()
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            state: self.lifecycle.state(),
            version: self.version.clone(),
            cache_name: self.lifecycle.cache_name().to_string(),
            clients_claimed: self.clients_claimed.load(Ordering::SeqCst),
            pending_refreshes: self.executor.pending_refreshes(),
            last_error: self.errors.get(),
        }
    }

    /// Lists every cache generation with its entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn cache_report(&self) -> Result<Vec<CacheInfo>> {
        let mut report = Vec::new();
        for name in self.store.keys().await? {
            let urls: Vec<String> = self
                .store
                .entries(&name)
                .await?
                .iter()
                .map(|key| key.url().to_string())
                .collect();
            report.push(CacheInfo {
                name,
                size: urls.len(),
                urls,
            });
        }
        Ok(report)
    }
}
