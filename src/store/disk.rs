//! File-backed cache store.
//!
//! Layout: `<root>/<cache name>/<sha256(key)>.json`, one file per entry,
//! written atomically (write tmp + rename).

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheStore;
use crate::error::CacheError;
use crate::http::{CacheKey, Response};

/// On-disk form of a cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
    body: String,
    cached_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(key: CacheKey, response: &Response) -> Self {
        Self {
            key,
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            cached_at: Utc::now(),
        }
    }

    fn into_response(self) -> Result<Response, CacheError> {
        let body = BASE64.decode(&self.body).map_err(|e| CacheError::Corrupted {
            key: self.key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: body.into(),
        })
    }
}

/// Cache store persisting generations under a directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
}

impl DiskCacheStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && !name.contains('\0')
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        if Self::is_valid_name(name) {
            Ok(self.root.join(name))
        } else {
            Err(CacheError::InvalidName(name.to_string()))
        }
    }

    fn entry_path(dir: &Path, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.as_str().as_bytes());
        dir.join(format!("{digest:x}.json"))
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>, CacheError> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| CacheError::Corrupted {
                key: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Foreign directories (`.git`, stray temp dirs) are not generations.
            if entry.file_type().await?.is_dir() && Self::is_valid_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open(&self, name: &str) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(self.cache_dir(name)?).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        match tokio::fs::remove_dir_all(self.cache_dir(name)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, name: &str, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        let path = Self::entry_path(&self.cache_dir(name)?, key);
        match Self::read_entry(&path).await? {
            Some(entry) if &entry.key == key => entry.into_response().map(Some),
            Some(entry) => Err(CacheError::Corrupted {
                key: key.to_string(),
                reason: format!("file holds {}", entry.key),
            }),
            None => Ok(None),
        }
    }

    async fn put(&self, name: &str, key: CacheKey, response: Response) -> Result<(), CacheError> {
        let dir = self.cache_dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;

        let path = Self::entry_path(&dir, &key);
        // One temp file per writer so concurrent puts of a key never share it.
        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        let json = serde_json::to_vec(&StoredEntry::new(key, &response))
            .map_err(|e| CacheError::Io(e.to_string()))?;

        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>, CacheError> {
        let mut dir = match tokio::fs::read_dir(self.cache_dir(name)?).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stored) = Self::read_entry(&path).await?
            {
                keys.push(stored.key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
