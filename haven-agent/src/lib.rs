//! HAVEN Agent - Request Interception and Cache Orchestration
//!
//! An installable agent that sits between pages and the network:
//!
//! - [`LifecycleController`]: install → activate, static tier population,
//!   stale generation eviction
//! - [`FetchInterceptor`]: cache-first routing with opportunistic dynamic caching
//! - [`FallbackSynthesizer`]: offline document and placeholder image
//! - [`ControlChannel`]: `GET_VERSION`, `SKIP_WAITING`, `CLEAR_CACHE`
//! - [`NotificationDispatcher`]: push display and click routing
//!
//! [`Agent`] ties them together behind the [`EventHandlers`] capability set,
//! and [`EventLoop`] feeds it from a channel.

pub mod agent;
pub mod control;
pub mod events;
pub mod fallback;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod notify;
pub mod writer;

pub use agent::{Agent, EventHandlers};
pub use control::{ControlChannel, ControlOutcome, MessageEnvelope};
pub use events::{AgentEvent, EventLoop, EventLoopClosed, EventSender, DEFAULT_EVENT_CAPACITY};
pub use fallback::{offline_page, placeholder_image, FallbackSynthesizer};
pub use host::{fetch_bounded, Host, Network};
pub use interceptor::{FetchInterceptor, FetchOutcome};
pub use lifecycle::LifecycleController;
pub use notify::NotificationDispatcher;
pub use writer::{CacheWriteFailure, CacheWriter};
