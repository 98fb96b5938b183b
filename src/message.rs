//! Messages posted to the worker by its pages.

use serde::{Deserialize, Serialize};

/// A recognised worker message.
///
/// Wire form is `{"type": "SKIP_WAITING" | "CLEAN_CACHE" | "GET_VERSION"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker without waiting for clients to close.
    SkipWaiting,
    /// Delete every cache generation except the current one.
    CleanCache,
    /// Ask for the current generation.
    GetVersion,
}

impl WorkerMessage {
    /// Decodes a message, returning `None` for anything unrecognised.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Version details returned for [`WorkerMessage::GetVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Version of the current generation.
    pub version: String,
    /// Name of the current cache generation.
    pub cache_name: String,
}

/// Reply sent back to the page that posted a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageReply {
    /// Answer to [`WorkerMessage::GetVersion`].
    Version(VersionInfo),
}
