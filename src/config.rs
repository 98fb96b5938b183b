//! Configuration for the worker and its host runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::ClassifierRules;
use crate::error::{Error, Result};
use crate::offline::OfflineLink;
use crate::push::NotificationConfig;

/// URLs cached at install time.
const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/cv.html",
    "/projet.html",
    "/blog.html",
    "/contact.html",
    "/page secte.html",
    "/easteregg.html",
    "/connection.html",
    "/styles.css",
    "/script.js",
    "/i18n.js",
    "/theme.js",
    "/blog.js",
    "/contact.js",
    "/analytics.js",
    "/manifest.json",
    "/locales/fr.json",
    "/locales/en.json",
    "/images/Logo Afip.jpg",
    "/images/bonhomme.png",
    "/images/Programming_code.jpg",
    "/images/Accueil.png",
    "/Document/cv.pdf",
];

/// Configuration of a single worker generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Application name, the prefix of every cache generation.
    pub app_name: String,
    /// Version of the current generation.
    pub version: String,
    /// Origin the worker controls; manifest paths resolve against it.
    pub scope: String,
    /// Paths cached during install.
    pub manifest: Vec<String>,
    /// Request classification rules.
    pub rules: ClassifierRules,
    /// Cached page served to offline navigations before synthesizing one.
    pub offline_page: String,
    /// Links listed on the synthesized offline page.
    pub offline_links: Vec<OfflineLink>,
    /// Notification presentation.
    pub notification: NotificationConfig,
    /// Endpoint pending sync items are posted to.
    pub sync_endpoint: String,
    /// The only background sync tag the worker reacts to.
    pub sync_tag: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "portfolio".to_string(),
            version: "1.0.0".to_string(),
            scope: "http://127.0.0.1:8080/".to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(ToString::to_string).collect(),
            rules: ClassifierRules::default(),
            offline_page: "/offline.html".to_string(),
            offline_links: OfflineLink::defaults(),
            notification: NotificationConfig::default(),
            sync_endpoint: "/api/sync".to_string(),
            sync_tag: "background-sync".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the name of the current cache generation.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}-v{}", self.app_name, self.version)
    }

    /// Parses the scope URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope is not an absolute URL.
    pub fn scope_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.scope)?)
    }

    /// Sets the application name.
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Sets the generation version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the scope URL.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Replaces the install manifest.
    #[must_use]
    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the classifier rules.
    #[must_use]
    pub fn with_rules(mut self, rules: ClassifierRules) -> Self {
        self.rules = rules;
        self
    }
}

/// Settings for the bundled host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Origin the proxied site is fetched from.
    pub upstream: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Directory for the disk cache; memory-only when unset.
    pub cache_dir: Option<PathBuf>,
    /// Directory holding the pending sync queue.
    pub state_dir: PathBuf,
    /// Seconds between scheduled cache cleanups.
    pub cleanup_interval_secs: u64,
    /// Timeout for upstream requests.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            upstream: "http://127.0.0.1:8080/".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9724,
            cache_dir: None,
            state_dir: data_dir.join("portfolio-sw"),
            cleanup_interval_secs: 24 * 60 * 60,
            request_timeout_secs: 30,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker settings.
    pub worker: WorkerConfig,
    /// Host runtime settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("portfolio-sw")
            .join("config.toml")
    }

    /// Loads configuration from `path`, or from [`Self::default_path`].
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                log::info!("Loaded config from {}", path.display());
                toml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
