//! Network abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::FetchError;
use crate::http::{Request, Response};

/// Performs live requests on behalf of the worker.
///
/// An HTTP error status is a successful fetch; only transport failures
/// are errors.
#[async_trait]
pub trait Network: Send + Sync {
    /// Sends `request` and captures the full response.
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Default network implementation backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestNetwork {
    client: reqwest::Client,
}

impl ReqwestNetwork {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

fn to_header_map(headers: &std::collections::BTreeMap<String, String>) -> HeaderMap {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_str(value).ok()?;
            Some((name, value))
        })
        .collect()
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::Other(e.to_string()))?;

        let reply = self
            .client
            .request(method, request.url.clone())
            .headers(to_header_map(&request.headers))
            .body(request.body.clone())
            .send()
            .await?;

        let status = reply.status();
        let headers = reply
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = reply.bytes().await?;

        log::debug!("{} {} -> {}", request.method, request.url, status.as_u16());
        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_skips_invalid_entries() {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert("accept".to_string(), "text/html".to_string());
        headers.insert("bad header".to_string(), "x".to_string());
        headers.insert("x-line".to_string(), "a\nb".to_string());

        let map = to_header_map(&headers);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("accept").unwrap(), "text/html");
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let network = ReqwestNetwork::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) is closed on loopback in test environments.
        let request = Request::get("http://127.0.0.1:9/").unwrap();
        let err = network.fetch(&request).await.unwrap_err();
        assert!(err.is_transient() || matches!(err, FetchError::Other(_)));
    }

    #[test]
    fn network_is_object_safe() {
        fn assert_dyn(_: &dyn Network) {}
        assert_dyn(&ReqwestNetwork::default());
    }
}
