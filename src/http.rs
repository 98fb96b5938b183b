//! Request and response values exchanged between the worker, the cache
//! store and the network.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers, lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Bytes,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Parses `url` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new("GET", Url::parse(url)?))
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns true for `http` and `https` URLs.
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Returns true for `GET` requests.
    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Returns the identity this request is cached under.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

/// Normalized request identity: method plus URL without fragment.
///
/// Headers (including `Vary`) never take part in the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds the key for `method` and `url`.
    #[must_use]
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {url}", method.to_ascii_uppercase()))
    }

    /// Returns the key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the URL part of the key.
    #[must_use]
    pub fn url(&self) -> &str {
        self.0.split_once(' ').map_or(self.0.as_str(), |(_, url)| url)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A response, either captured from the network, read from the cache or
/// synthesized by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Response headers, lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body).with_status_text("OK")
    }

    /// Sets the reason phrase.
    #[must_use]
    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Looks up a header by name, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_ignores_fragment_and_headers() {
        let a = Request::get("https://example.com/cv.html#top").unwrap();
        let b = Request::get("https://example.com/cv.html")
            .unwrap()
            .with_header("Vary", "Accept-Language");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().as_str(), "GET https://example.com/cv.html");
    }

    #[test]
    fn cache_key_includes_method() {
        let url = Url::parse("https://example.com/api/contact").unwrap();
        let get = Request::new("get", url.clone());
        let post = Request::new("POST", url);
        assert_eq!(get.method, "GET");
        assert_ne!(get.cache_key(), post.cache_key());
    }

    #[test]
    fn cache_key_url_part() {
        let req = Request::get("https://example.com/logo.png?v=2").unwrap();
        assert_eq!(req.cache_key().url(), "https://example.com/logo.png?v=2");
    }

    #[test]
    fn request_scheme_checks() {
        assert!(Request::get("http://example.com/").unwrap().is_http());
        assert!(!Request::get("chrome-extension://abc/app.js").unwrap().is_http());
    }

    #[test]
    fn response_status_and_headers() {
        let resp = Response::ok("hello").with_header("Content-Type", "text/plain");
        assert!(resp.is_ok());
        assert_eq!(resp.header("content-type"), Some("text/plain"));
        assert_eq!(resp.text(), "hello");
        assert!(!Response::new(404, "").is_ok());
        assert!(!Response::new(302, "").is_ok());
    }
}
