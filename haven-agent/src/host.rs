//! Collaborators supplied by the hosting environment.
//!
//! The agent never performs I/O of its own: network access goes through
//! [`Network`] and page/window/notification side effects through [`Host`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use haven_core::{HostError, NetworkError, NotificationDescriptor, Request, Response, Url};

/// Outbound network access.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Perform the request. Any HTTP status is a successful fetch; only a
    /// failure to obtain a response at all is an error.
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Page and notification side effects.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Take control of every open page without a reload.
    async fn claim(&self) -> Result<(), HostError>;

    /// Open or focus a window at `url`.
    async fn open_window(&self, url: &Url) -> Result<(), HostError>;

    async fn show_notification(&self, descriptor: &NotificationDescriptor)
        -> Result<(), HostError>;

    async fn close_notification(&self, tag: &str) -> Result<(), HostError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        (**self).fetch(request).await
    }
}

#[async_trait]
impl<T: Host + ?Sized> Host for Arc<T> {
    async fn claim(&self) -> Result<(), HostError> {
        (**self).claim().await
    }

    async fn open_window(&self, url: &Url) -> Result<(), HostError> {
        (**self).open_window(url).await
    }

    async fn show_notification(
        &self,
        descriptor: &NotificationDescriptor,
    ) -> Result<(), HostError> {
        (**self).show_notification(descriptor).await
    }

    async fn close_notification(&self, tag: &str) -> Result<(), HostError> {
        (**self).close_notification(tag).await
    }
}

/// Fetch with an optional upper bound. Expiry becomes
/// [`NetworkError::Timeout`] and the in-flight fetch is dropped.
pub async fn fetch_bounded<N: Network + ?Sized>(
    network: &N,
    request: &Request,
    timeout: Option<Duration>,
) -> Result<Response, NetworkError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, network.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout {
                url: request.url.to_string(),
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        None => network.fetch(request).await,
    }
}
