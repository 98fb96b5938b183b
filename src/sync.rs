//! Pending work deferred while offline, replayed on background sync.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use crate::error::{Error, ErrorSlot, Result};
use crate::http::Request;
use crate::network::Network;

/// A unit of work waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncItem {
    /// Unique id (UUID v4).
    pub id: String,
    /// When the item was queued.
    pub created: DateTime<Utc>,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// JSON document posted to the sync endpoint.
    pub payload: String,
}

impl PendingSyncItem {
    /// Wraps a JSON payload in a new pending item.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn new(payload: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created: Utc::now(),
            attempts: 0,
            payload: serde_json::to_string(payload)?,
        })
    }
}

/// Storage for pending sync items.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    /// Returns every pending item, oldest first.
    async fn pending(&self) -> Result<Vec<PendingSyncItem>>;

    /// Appends an item.
    async fn push(&self, item: PendingSyncItem) -> Result<()>;

    /// Removes an item. Returns false if it was not queued.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Increments the attempt counter of an item.
    async fn record_attempt(&self, id: &str) -> Result<()>;
}

/// Volatile in-process queue.
#[derive(Debug, Default)]
pub struct MemorySyncQueue {
    items: Mutex<Vec<PendingSyncItem>>,
}

impl MemorySyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncQueue for MemorySyncQueue {
    async fn pending(&self) -> Result<Vec<PendingSyncItem>> {
        Ok(self.items.lock().await.clone())
    }

    async fn push(&self, item: PendingSyncItem) -> Result<()> {
        self.items.lock().await.push(item);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() != before)
    }

    async fn record_attempt(&self, id: &str) -> Result<()> {
        if let Some(item) = self.items.lock().await.iter_mut().find(|i| i.id == id) {
            item.attempts += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueFile {
    #[serde(default)]
    items: Vec<PendingSyncItem>,
}

/// Queue persisted as a TOML file, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileSyncQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSyncQueue {
    /// Creates a queue stored at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the file backing this queue.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<QueueFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| Error::Sync(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(QueueFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, file: &QueueFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let toml_str = toml::to_string(file).map_err(|e| Error::Sync(e.to_string()))?;
        let tmp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp_path, toml_str).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncQueue for FileSyncQueue {
    async fn pending(&self) -> Result<Vec<PendingSyncItem>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.items)
    }

    async fn push(&self, item: PendingSyncItem) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        file.items.push(item);
        self.save(&file).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let before = file.items.len();
        file.items.retain(|i| i.id != id);
        if file.items.len() == before {
            return Ok(false);
        }
        self.save(&file).await?;
        Ok(true)
    }

    async fn record_attempt(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        if let Some(item) = file.items.iter_mut().find(|i| i.id == id) {
            item.attempts += 1;
            self.save(&file).await?;
        }
        Ok(())
    }
}

/// Outcome of one background sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Items delivered and removed.
    pub sent: usize,
    /// Items that failed and stay queued.
    pub failed: usize,
}

/// Posts every pending item to `endpoint`, removing the delivered ones.
///
/// A failing item is recorded and kept for the next run; it does not stop
/// the remaining items.
///
/// # Errors
///
/// Returns an error only if the queue itself cannot be read.
pub async fn replay(
    queue: &dyn SyncQueue,
    network: &dyn Network,
    endpoint: &Url,
    errors: &ErrorSlot,
) -> Result<SyncReport> {
    let items = queue.pending().await.inspect_err(|e| errors.record("sync", e))?;

    let mut report = SyncReport::default();
    for item in items {
        if let Err(e) = deliver(queue, network, endpoint, &item).await {
            errors.record("sync", &format!("item {}: {e}", item.id));
            report.failed += 1;
        } else {
            log::info!("Synced pending item {}", item.id);
            report.sent += 1;
        }
    }
    Ok(report)
}

async fn deliver(
    queue: &dyn SyncQueue,
    network: &dyn Network,
    endpoint: &Url,
    item: &PendingSyncItem,
) -> Result<()> {
    queue.record_attempt(&item.id).await?;
    let request = Request::new("POST", endpoint.clone())
        .with_header("content-type", "application/json")
        .with_body(item.payload.clone());
    let response = network.fetch(&request).await?;
    if !response.is_ok() {
        return Err(Error::Sync(format!("server answered {}", response.status)));
    }
    queue.remove(&item.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use crate::mock::{MockNetwork, url};
    use serde_json::json;
    use tempfile::TempDir;

    fn endpoint() -> Url {
        Url::parse(&url("/api/sync")).unwrap()
    }

    #[tokio::test]
    async fn memory_queue_push_remove() {
        let queue = MemorySyncQueue::new();
        let item = PendingSyncItem::new(&json!({"form": "contact"})).unwrap();
        let id = item.id.clone();
        queue.push(item).await.unwrap();
        queue.record_attempt(&id).await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        assert!(queue.remove(&id).await.unwrap());
        assert!(!queue.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn file_queue_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("sync-queue.toml");

        let item = PendingSyncItem::new(&json!({"event": "page_view", "page": "/cv.html"})).unwrap();
        FileSyncQueue::new(&path).push(item.clone()).await.unwrap();

        let reopened = FileSyncQueue::new(&path);
        assert_eq!(reopened.pending().await.unwrap(), vec![item.clone()]);
        assert!(reopened.remove(&item.id).await.unwrap());
        assert!(FileSyncQueue::new(&path).pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_queue_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let queue = FileSyncQueue::new(dir.path().join("none.toml"));
        assert!(queue.pending().await.unwrap().is_empty());
        assert!(!queue.remove("nope").await.unwrap());
    }

    #[tokio::test]
    async fn file_queue_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, "items = 3").unwrap();
        assert!(matches!(
            FileSyncQueue::new(&path).pending().await,
            Err(Error::Sync(_))
        ));
    }

    #[tokio::test]
    async fn replay_sends_and_removes() {
        let queue = MemorySyncQueue::new();
        queue.push(PendingSyncItem::new(&json!({"n": 1})).unwrap()).await.unwrap();
        queue.push(PendingSyncItem::new(&json!({"n": 2})).unwrap()).await.unwrap();
        let network = MockNetwork::new();
        network.serve(&url("/api/sync"), Response::ok("{}"));
        let errors = ErrorSlot::new();

        let report = replay(&queue, &network, &endpoint(), &errors).await.unwrap();
        assert_eq!(report, SyncReport { sent: 2, failed: 0 });
        assert!(queue.pending().await.unwrap().is_empty());

        let requests = network.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body.as_ref(), br#"{"n":1}"#);
        assert!(errors.get().is_none());
    }

    #[tokio::test]
    async fn replay_keeps_failed_items() {
        let queue = MemorySyncQueue::new();
        queue.push(PendingSyncItem::new(&json!({"n": 1})).unwrap()).await.unwrap();
        let network = MockNetwork::new();
        network.set_offline(true);
        let errors = ErrorSlot::new();

        let report = replay(&queue, &network, &endpoint(), &errors).await.unwrap();
        assert_eq!(report, SyncReport { sent: 0, failed: 1 });
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(errors.get().unwrap().context, "sync");
    }

    #[tokio::test]
    async fn replay_treats_error_status_as_failure() {
        let queue = MemorySyncQueue::new();
        queue.push(PendingSyncItem::new(&json!({})).unwrap()).await.unwrap();
        let network = MockNetwork::new();
        network.serve(&url("/api/sync"), Response::new(500, "oops"));

        let report = replay(&queue, &network, &endpoint(), &ErrorSlot::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(queue.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replay_of_empty_queue_does_nothing() {
        let network = MockNetwork::new();
        let report = replay(&MemorySyncQueue::new(), &network, &endpoint(), &ErrorSlot::new())
            .await
            .unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(network.calls(), 0);
    }
}
