//! HAVEN Core - Data Types
//!
//! Pure data structures shared by the storage, agent and host crates.
//! Nothing in here performs I/O.

pub mod batch;
pub mod config;
pub mod error;
pub mod generation;
pub mod http;
pub mod message;
pub mod state;

pub use batch::{AttemptOutcome, BatchReport};
pub use config::{
    AgentConfig, DynamicCachePolicy, NotificationConfig, StaticAssetManifest,
    DEFAULT_FETCH_TIMEOUT_MS,
};
pub use error::{
    ConfigError, HavenError, HavenResult, HostError, InstallError, LifecycleError, NetworkError,
    StorageError,
};
pub use generation::{CacheGeneration, GenerationParseError, TierKind, VersionRegistry};
pub use http::{
    CachedEntry, Destination, Headers, Method, Request, RequestIdentity, RequestMode, Response,
    ResponseType,
};
pub use message::{
    ControlMessage, NotificationAction, NotificationChoice, NotificationClick,
    NotificationDescriptor, PushPayload, VersionReply, ACTION_DISMISS, ACTION_EXPLORE,
};
pub use state::{AgentState, AgentStateParseError};

pub use url::Url;
