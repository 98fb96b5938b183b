//! Error types for the portfolio-sw library.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a network fetch did not produce a response.
///
/// Fallback policy currently treats every kind the same way, but the
/// distinction is kept so callers can tell a timeout from a refused
/// connection when they need to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The host name could not be resolved.
    #[error("DNS resolution failed")]
    Dns,

    /// The connection could not be established.
    #[error("connection failed")]
    Connect,

    /// The request was cancelled before it completed.
    #[error("request aborted")]
    Aborted,

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// Any other transport failure.
    #[error("network error: {0}")]
    Other(String),
}

impl FetchError {
    /// Returns true for failures caused by missing connectivity rather than
    /// by the server's answer.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Dns | Self::Connect | Self::Aborted)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::Status(status.as_u16());
        }
        // hyper-util reports resolver failures as "dns error" somewhere in the chain
        let mut source: Option<&dyn std::error::Error> = Some(&err);
        while let Some(e) = source {
            if e.to_string().contains("dns error") {
                return Self::Dns;
            }
            source = e.source();
        }
        if err.is_connect() {
            return Self::Connect;
        }
        Self::Other(err.to_string())
    }
}

/// Failures reported by a [`CacheStore`](crate::store::CacheStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Writing the entry would exceed the store's quota.
    #[error("cache quota exceeded")]
    QuotaExceeded,

    /// A stored entry could not be decoded.
    #[error("corrupted cache entry {key}: {reason}")]
    Corrupted {
        /// Key of the unreadable entry.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// The cache name cannot be used as a storage location.
    #[error("invalid cache name: {0}")]
    InvalidName(String),

    /// Underlying storage I/O failed.
    #[error("cache I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A network fetch failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A cache store operation failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A manifest URL could not be cached during install.
    #[error("install failed for {url}: {reason}")]
    Install {
        /// The manifest URL that failed.
        url: String,
        /// Why it failed.
        reason: FetchError,
    },

    /// A lifecycle transition was requested from the wrong state.
    #[error("cannot {action} while {state}")]
    InvalidState {
        /// The attempted transition.
        action: &'static str,
        /// The state the worker was in.
        state: crate::lifecycle::LifecycleState,
    },

    /// A push payload could not be turned into a notification.
    #[error("push error: {0}")]
    Push(String),

    /// The host runtime refused a client or notification operation.
    #[error("host error: {0}")]
    Host(String),

    /// Pending sync storage failed.
    #[error("sync error: {0}")]
    Sync(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be parsed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A specialized `Result` type for portfolio-sw operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The most recent administrative failure, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LastError {
    /// Which operation failed (`"install"`, `"cache-write"`, ...).
    pub context: &'static str,
    /// Rendered error message.
    pub message: String,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

/// Shared slot holding the last recorded [`LastError`].
///
/// Cloning the slot shares the same storage.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<LastError>>>,
}

impl ErrorSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `err` and stores it as the last error.
    pub fn record(&self, context: &'static str, err: &dyn std::fmt::Display) {
        let message = err.to_string();
        log::error!("{context}: {message}");
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(LastError {
            context,
            message,
            at: Utc::now(),
        });
    }

    /// Returns a copy of the last error, if any.
    #[must_use]
    pub fn get(&self) -> Option<LastError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the last error and clears the slot.
    pub fn take(&self) -> Option<LastError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
