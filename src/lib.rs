//! portfolio-sw - An offline caching layer for a static portfolio site.
//!
//! The worker intercepts requests, routes each one to a caching strategy by
//! request category, manages versioned cache generations, and handles push
//! notifications and background sync. Every collaborator (cache store,
//! network, host runtime, sync queue) sits behind a trait so the worker runs
//! the same against the bundled axum host or test doubles.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use portfolio_sw::{
//!     LoggingHost, MemoryCacheStore, MemorySyncQueue, ReqwestNetwork, Request, ServiceWorker,
//!     WorkerConfig,
//! };
//!
//! # async fn example() -> portfolio_sw::Result<()> {
//! let config = WorkerConfig::default().with_scope("https://portfolio.example/");
//! let worker = ServiceWorker::new(
//!     &config,
//!     Arc::new(MemoryCacheStore::new()),
//!     Arc::new(ReqwestNetwork::default()),
//!     Arc::new(LoggingHost::default()),
//!     Arc::new(MemorySyncQueue::new()),
//! )?;
//!
//! // Cache the manifest and take over from older generations
//! worker.start().await?;
//!
//! let response = worker.fetch(&Request::get("https://portfolio.example/cv.html")?).await;
//! println!("{} {}", response.status, response.text());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod classify;
pub mod config;
pub mod error;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod network;
pub mod offline;
pub mod push;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod mock;

// Re-export main types for convenience
pub use classify::{Category, Classifier, ClassifierRules};
pub use config::{AppConfig, ServerConfig, WorkerConfig};
pub use error::{CacheError, Error, FetchError, LastError, Result};
pub use host::{ClientWindow, Host, LoggingHost};
pub use http::{CacheKey, Request, Response};
pub use lifecycle::LifecycleState;
pub use message::{MessageReply, WorkerMessage};
pub use network::{Network, ReqwestNetwork};
pub use push::{ClickOutcome, Notification, NotificationConfig};
pub use store::{CacheStore, DiskCacheStore, MemoryCacheStore};
pub use strategy::Strategy;
pub use sync::{FileSyncQueue, MemorySyncQueue, PendingSyncItem, SyncQueue, SyncReport};
pub use worker::{CacheInfo, Event, EventOutcome, ServiceWorker, WorkerInfo};
