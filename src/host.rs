//! Host runtime services the worker calls out to: client windows and
//! system notifications.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::push::Notification;

/// An open window controlled (or controllable) by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientWindow {
    /// Host-assigned identifier.
    pub id: String,
    /// Current URL of the window.
    pub url: String,
}

/// Client and notification services provided by the host.
#[async_trait]
pub trait Host: Send + Sync {
    /// Displays a notification.
    async fn show_notification(&self, notification: &Notification) -> Result<()>;

    /// Lists open windows, including ones not yet controlled.
    async fn windows(&self) -> Result<Vec<ClientWindow>>;

    /// Brings a window to the foreground.
    async fn focus(&self, window: &ClientWindow) -> Result<()>;

    /// Opens a new window at `url`.
    async fn open_window(&self, url: &str) -> Result<()>;

    /// Takes control of every open client immediately.
    async fn claim(&self) -> Result<()>;
}

/// Headless host that logs every call.
///
/// Keeps the most recent notifications and tracks the windows it opened so
/// a later click on the same target focuses instead of reopening.
#[derive(Debug)]
pub struct LoggingHost {
    shown: Mutex<VecDeque<Notification>>,
    windows: Mutex<Vec<ClientWindow>>,
    history: usize,
}

impl Default for LoggingHost {
    fn default() -> Self {
        Self::new(50)
    }
}

impl LoggingHost {
    /// Creates a host remembering at most `history` notifications.
    #[must_use]
    pub fn new(history: usize) -> Self {
        Self {
            shown: Mutex::new(VecDeque::with_capacity(history)),
            windows: Mutex::new(Vec::new()),
            history,
        }
    }

    /// Returns the remembered notifications, oldest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Host for LoggingHost {
    async fn show_notification(&self, notification: &Notification) -> Result<()> {
        log::info!("Notification: {} - {}", notification.title, notification.body);
        if self.history == 0 {
            return Ok(());
        }
        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        if shown.len() == self.history {
            shown.pop_front();
        }
        shown.push_back(notification.clone());
        Ok(())
    }

    async fn windows(&self) -> Result<Vec<ClientWindow>> {
        Ok(self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn focus(&self, window: &ClientWindow) -> Result<()> {
        log::info!("Focusing window {} at {}", window.id, window.url);
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        let window = ClientWindow {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
        };
        log::info!("Opening window {} at {url}", window.id);
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(window);
        Ok(())
    }

    async fn claim(&self) -> Result<()> {
        log::info!("Claimed all clients");
        Ok(())
    }
}
