//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{ConfigError, VersionRegistry};

/// Resource paths that must be in the static tier after install, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticAssetManifest {
    paths: Vec<String>,
}

impl StaticAssetManifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path against the agent's origin.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, ConfigError> {
        self.paths
            .iter()
            .map(|path| {
                origin.join(path).map_err(|e| ConfigError::InvalidValue {
                    field: "manifest".to_string(),
                    value: path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

/// Path prefixes whose responses are opportunistically cached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicCachePolicy {
    prefixes: Vec<String>,
}

impl DynamicCachePolicy {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// True iff the URL path starts with one of the prefixes.
    pub fn matches(&self, url: &Url) -> bool {
        let path = url.path();
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Push notification presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// Opened when the user picks "explore"
    pub explore_url: String,
    /// Opened on a plain click or any other action
    pub root_url: String,
    pub explore_icon: String,
    pub dismiss_icon: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/assets/images/icon-192.png".to_string(),
            badge: "/assets/images/badge-72.png".to_string(),
            vibrate: vec![200, 100, 200],
            explore_url: "/#demos".to_string(),
            root_url: "/".to_string(),
            explore_icon: "/assets/images/action-explore.png".to_string(),
            dismiss_icon: "/assets/images/action-dismiss.png".to_string(),
        }
    }
}

/// Default fetch timeout in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

fn default_offline_document() -> String {
    "/offline.html".to_string()
}

fn default_fetch_timeout_ms() -> Option<u64> {
    Some(DEFAULT_FETCH_TIMEOUT_MS)
}

/// Master agent configuration.
///
/// The generation registry lives here rather than in globals so that
/// independent agents (and tests) never share version state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Origin whose requests the agent intercepts
    pub origin: Url,
    pub registry: VersionRegistry,
    pub manifest: StaticAssetManifest,
    pub dynamic_policy: DynamicCachePolicy,
    /// Path of the pre-cached offline page in the static tier
    #[serde(default = "default_offline_document")]
    pub offline_document: String,
    /// `None` lets a hung fetch wait forever
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: Option<u64>,
    /// Activate straight after a successful install
    #[serde(default)]
    pub skip_waiting_on_install: bool,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl AgentConfig {
    /// Stock preset for a site at `origin`.
    pub fn new(origin: Url, version: impl Into<String>) -> Self {
        Self {
            origin,
            registry: VersionRegistry::new(version),
            manifest: StaticAssetManifest::new([
                "/",
                "/index.html",
                "/manifest.json",
                "/assets/css/main.css",
                "/assets/js/main.js",
                "/assets/images/favicon.svg",
                "/assets/images/icon-192.png",
                "/assets/images/icon-512.png",
            ]),
            dynamic_policy: DynamicCachePolicy::new([
                "/pages/",
                "/assets/images/",
                "/assets/audio/",
                "/assets/video/",
            ]),
            offline_document: default_offline_document(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            skip_waiting_on_install: false,
            notifications: NotificationConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: VersionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_manifest(mut self, manifest: StaticAssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_dynamic_policy(mut self, policy: DynamicCachePolicy) -> Self {
        self.dynamic_policy = policy;
        self
    }

    pub fn with_offline_document(mut self, path: impl Into<String>) -> Self {
        self.offline_document = path.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_skip_waiting_on_install(mut self, enabled: bool) -> Self {
        self.skip_waiting_on_install = enabled;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    /// Absolute URL of a site-relative path.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin.join(path).map_err(|e| ConfigError::InvalidValue {
            field: "path".to_string(),
            value: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check structural invariants before the agent is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "origin".to_string(),
                value: self.origin.to_string(),
                reason: "must be an http(s) origin".to_string(),
            });
        }

        for generation in [
            &self.registry.static_generation,
            &self.registry.dynamic_generation,
        ] {
            if generation.version.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: format!("registry.{}.version", generation.kind),
                });
            }
        }
        if self.registry.static_name() == self.registry.dynamic_name() {
            return Err(ConfigError::InvalidValue {
                field: "registry".to_string(),
                value: self.registry.static_name(),
                reason: "static and dynamic generations must differ".to_string(),
            });
        }

        for path in self.manifest.paths() {
            require_absolute_path("manifest", path)?;
        }
        for prefix in self.dynamic_policy.prefixes() {
            require_absolute_path("dynamic_policy", prefix)?;
        }
        require_absolute_path("offline_document", &self.offline_document)?;

        if self.fetch_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "use no timeout instead of a zero timeout".to_string(),
            });
        }

        Ok(())
    }
}

fn require_absolute_path(field: &str, path: &str) -> Result<(), ConfigError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: path.to_string(),
            reason: "must start with '/'".to_string(),
        })
    }
}
