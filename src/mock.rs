//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{CacheError, Error, FetchError, Result};
use crate::host::{ClientWindow, Host};
use crate::http::{CacheKey, Request, Response};
use crate::network::Network;
use crate::push::Notification;
use crate::store::CacheStore;

pub const SCOPE: &str = "https://site.test/";

/// Absolute URL on the test origin.
pub fn url(path: &str) -> String {
    format!("https://site.test{path}")
}

/// A scripted network with call counting.
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, Response>>,
    failures: Mutex<HashMap<String, FetchError>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `response` for the absolute `url`.
    pub fn serve(&self, url: &str, response: Response) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Makes fetches of `url` fail with `err`.
    pub fn fail(&self, url: &str, err: FetchError) {
        self.failures.lock().unwrap().insert(url.to_string(), err);
    }

    /// Makes every fetch fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Connect);
        }
        let url = request.url.as_str();
        if let Some(err) = self.failures.lock().unwrap().get(url) {
            return Err(err.clone());
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// A store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn keys(&self) -> std::result::Result<Vec<String>, CacheError> {
        Err(CacheError::Io("disk gone".into()))
    }

    async fn open(&self, _name: &str) -> std::result::Result<(), CacheError> {
        Err(CacheError::Io("disk gone".into()))
    }

    async fn delete(&self, _name: &str) -> std::result::Result<bool, CacheError> {
        Err(CacheError::Io("disk gone".into()))
    }

    async fn get(
        &self,
        _name: &str,
        _key: &CacheKey,
    ) -> std::result::Result<Option<Response>, CacheError> {
        Err(CacheError::Io("disk gone".into()))
    }

    async fn put(
        &self,
        _name: &str,
        _key: CacheKey,
        _response: Response,
    ) -> std::result::Result<(), CacheError> {
        Err(CacheError::QuotaExceeded)
    }

    async fn entries(&self, _name: &str) -> std::result::Result<Vec<CacheKey>, CacheError> {
        Err(CacheError::Io("disk gone".into()))
    }
}

/// A host recording every interaction.
#[derive(Default)]
pub struct MockHost {
    pub windows: Mutex<Vec<ClientWindow>>,
    pub shown: Mutex<Vec<Notification>>,
    pub focused: Mutex<Vec<String>>,
    pub opened: Mutex<Vec<String>>,
    pub claims: AtomicUsize,
    pub fail_display: AtomicBool,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(self, id: &str, url: &str) -> Self {
        self.windows.lock().unwrap().push(ClientWindow {
            id: id.to_string(),
            url: url.to_string(),
        });
        self
    }
}

#[async_trait]
impl Host for MockHost {
    async fn show_notification(&self, notification: &Notification) -> Result<()> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(Error::Host("permission denied".into()));
        }
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn windows(&self) -> Result<Vec<ClientWindow>> {
        Ok(self.windows.lock().unwrap().clone())
    }

    async fn focus(&self, window: &ClientWindow) -> Result<()> {
        self.focused.lock().unwrap().push(window.id.clone());
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn claim(&self) -> Result<()> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
