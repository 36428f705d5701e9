//! Host process configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use haven_core::{AgentConfig, ConfigError, Url};
use haven_storage::{InMemoryTierStore, LmdbStoreError, LmdbTierStore};

use crate::store::ProxyStore;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_VERSION: &str = "v1";
pub const DEFAULT_CACHE_MAX_MB: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub bind: String,
    pub port: u16,
    /// Origin misses are forwarded to.
    pub upstream: Url,
    /// Origin pages see; the agent's same-origin checks use it.
    pub public_origin: Url,
    pub version: String,
    /// TOML agent configuration replacing the stock preset.
    pub agent_config_path: Option<PathBuf>,
    /// LMDB directory; `None` keeps the cache in memory.
    pub cache_dir: Option<PathBuf>,
    pub cache_max_mb: usize,
    pub event_capacity: usize,
}

fn invalid(field: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_origin(field: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(field, value, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(field, value, "must be an http(s) origin"));
    }
    Ok(url)
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = lookup("HAVEN_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());

        let port = match lookup("HAVEN_PORT").or_else(|| lookup("PORT")) {
            Some(value) => value
                .parse::<u16>()
                .map_err(|e| invalid("HAVEN_PORT", &value, e))?,
            None => DEFAULT_PORT,
        };

        let upstream_value = lookup("HAVEN_UPSTREAM").ok_or_else(|| ConfigError::MissingRequired {
            field: "HAVEN_UPSTREAM".to_string(),
        })?;
        let upstream = parse_origin("HAVEN_UPSTREAM", &upstream_value)?;

        let public_origin = match lookup("HAVEN_PUBLIC_ORIGIN") {
            Some(value) => parse_origin("HAVEN_PUBLIC_ORIGIN", &value)?,
            None => upstream.clone(),
        };

        let version = lookup("HAVEN_VERSION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        let cache_max_mb = lookup("HAVEN_CACHE_MAX_MB")
            .and_then(|s| s.parse().ok())
            .filter(|mb| *mb > 0)
            .unwrap_or(DEFAULT_CACHE_MAX_MB);

        let event_capacity = lookup("HAVEN_EVENT_CAPACITY")
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(haven_agent::DEFAULT_EVENT_CAPACITY);

        Ok(Self {
            bind,
            port,
            upstream,
            public_origin,
            version,
            agent_config_path: lookup("HAVEN_CONFIG").map(PathBuf::from),
            cache_dir: lookup("HAVEN_CACHE_DIR").map(PathBuf::from),
            cache_max_mb,
            event_capacity,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| invalid("HAVEN_BIND", &addr, e))
    }

    /// The agent configuration: the TOML file when one is set, else the
    /// stock preset for the public origin and version.
    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let config = match &self.agent_config_path {
            Some(path) => {
                let display = path.display().to_string();
                let text = std::fs::read_to_string(path)
                    .map_err(|e| invalid("HAVEN_CONFIG", &display, e))?;
                toml::from_str::<AgentConfig>(&text)
                    .map_err(|e| invalid("HAVEN_CONFIG", &display, e))?
            }
            None => AgentConfig::new(self.public_origin.clone(), self.version.clone()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn open_store(&self) -> Result<ProxyStore, LmdbStoreError> {
        match &self.cache_dir {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), max_mb = self.cache_max_mb, "Using LMDB tier store");
                Ok(ProxyStore::Lmdb(LmdbTierStore::new(dir, self.cache_max_mb)?))
            }
            None => {
                tracing::info!("Using in-memory tier store");
                Ok(ProxyStore::Memory(InMemoryTierStore::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            ProxyConfig::from_lookup(lookup(&[("HAVEN_UPSTREAM", "http://127.0.0.1:3000")])).unwrap();

        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_origin, config.upstream);
        assert_eq!(config.version, "v1");
        assert_eq!(config.cache_dir, None);
        assert_eq!(config.cache_max_mb, 256);
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_upstream_is_required() {
        assert_eq!(
            ProxyConfig::from_lookup(lookup(&[])),
            Err(ConfigError::MissingRequired {
                field: "HAVEN_UPSTREAM".to_string()
            })
        );
    }

    #[test]
    fn test_overrides() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("HAVEN_UPSTREAM", "http://backend:3000"),
            ("HAVEN_PUBLIC_ORIGIN", "https://app.example.com"),
            ("PORT", "9090"),
            ("HAVEN_VERSION", "v7"),
            ("HAVEN_CACHE_MAX_MB", "0"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.public_origin.as_str(), "https://app.example.com/");
        assert_eq!(config.cache_max_mb, DEFAULT_CACHE_MAX_MB);

        let agent = config.agent_config().unwrap();
        assert_eq!(agent.registry.static_name(), "static-v7");
        assert_eq!(agent.origin, config.public_origin);
    }

    #[test]
    fn test_invalid_port_and_origin() {
        assert!(ProxyConfig::from_lookup(lookup(&[
            ("HAVEN_UPSTREAM", "http://backend"),
            ("HAVEN_PORT", "eighty"),
        ]))
        .is_err());
        assert!(ProxyConfig::from_lookup(lookup(&[("HAVEN_UPSTREAM", "ftp://backend")])).is_err());
    }

    #[test]
    fn test_agent_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
origin = "https://app.example.com"
manifest = ["/", "/offline.html"]
dynamic_policy = ["/blog/"]
skip_waiting_on_install = true

[registry.static_generation]
kind = "static"
version = "2024.1"

[registry.dynamic_generation]
kind = "dynamic"
version = "2024.1"
"#,
        )
        .unwrap();

        let config = ProxyConfig::from_lookup(lookup(&[
            ("HAVEN_UPSTREAM", "http://backend"),
            ("HAVEN_CONFIG", path.to_str().unwrap()),
        ]))
        .unwrap();
        let agent = config.agent_config().unwrap();

        assert_eq!(agent.manifest.paths(), ["/", "/offline.html"]);
        assert_eq!(agent.registry.static_name(), "static-2024.1");
        assert!(agent.skip_waiting_on_install);
        assert_eq!(agent.offline_document, "/offline.html");
    }

    #[test]
    fn test_memory_store_without_cache_dir() {
        let config =
            ProxyConfig::from_lookup(lookup(&[("HAVEN_UPSTREAM", "http://backend")])).unwrap();
        assert!(matches!(config.open_store().unwrap(), ProxyStore::Memory(_)));
    }
}
