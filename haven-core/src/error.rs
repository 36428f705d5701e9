//! Error types for HAVEN operations

use crate::AgentState;
use thiserror::Error;

/// Cache tier store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open tier {tier}: {reason}")]
    TierOpen { tier: String, reason: String },

    #[error("Read from tier {tier} failed: {reason}")]
    ReadFailed { tier: String, reason: String },

    #[error("Write to tier {tier} failed: {reason}")]
    WriteFailed { tier: String, reason: String },

    #[error("Deleting tier {tier} failed: {reason}")]
    DeleteFailed { tier: String, reason: String },

    #[error("Listing tiers failed: {reason}")]
    ListFailed { reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Store environment error: {reason}")]
    Environment { reason: String },
}

/// Network fetch errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Network unreachable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Fetch of {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Upstream error for {url}: {reason}")]
    Upstream { url: String, reason: String },
}

impl NetworkError {
    /// URL of the request that failed.
    pub fn url(&self) -> &str {
        match self {
            NetworkError::Unreachable { url, .. }
            | NetworkError::Timeout { url, .. }
            | NetworkError::Upstream { url, .. } => url,
        }
    }
}

/// Installation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstallError {
    #[error("{} static asset(s) unavailable, first: {first}: {cause}", .failed.len())]
    AssetsUnavailable {
        failed: Vec<String>,
        first: String,
        cause: String,
    },

    #[error("Writing static asset {identity} failed: {cause}")]
    AssetWriteFailed { identity: String, cause: String },
}

/// Agent lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },

    #[error("Agent failed and cannot serve: {reason}")]
    AgentFailed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors raised by the hosting environment (pages, windows, notifications).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Claiming clients failed: {reason}")]
    ClaimFailed { reason: String },

    #[error("Opening window {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Notification {tag} failed: {reason}")]
    NotificationFailed { tag: String, reason: String },
}

/// Master error type for all HAVEN errors.
#[derive(Debug, Clone, Error)]
pub enum HavenError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Result type alias for HAVEN operations.
pub type HavenResult<T> = Result<T, HavenError>;

// =============================================================================
// TESTS
// =============================================================================
