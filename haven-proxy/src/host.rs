//! Host side effects for a headless proxy.
//!
//! There are no windows to claim or focus, so those are logged. Shown
//! notifications are kept until closed so clients can poll them, up to
//! [`MAX_ACTIVE_NOTIFICATIONS`]; past that the oldest are dropped.

use std::sync::Mutex;

use async_trait::async_trait;
use haven_agent::Host;
use haven_core::{HostError, NotificationDescriptor, Url};

/// Most notifications kept at once.
pub const MAX_ACTIVE_NOTIFICATIONS: usize = 64;

#[derive(Debug)]
pub struct ProxyHost {
    notifications: Mutex<Vec<NotificationDescriptor>>,
    capacity: usize,
}

impl Default for ProxyHost {
    fn default() -> Self {
        Self::with_capacity(MAX_ACTIVE_NOTIFICATIONS)
    }
}

impl ProxyHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` notifications (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Notifications shown and not yet closed, oldest first.
    pub fn active_notifications(&self) -> Vec<NotificationDescriptor> {
        match self.notifications.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Host for ProxyHost {
    async fn claim(&self) -> Result<(), HostError> {
        tracing::info!("Agent claimed clients");
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<(), HostError> {
        tracing::info!(url = %url, "Open window requested");
        Ok(())
    }

    async fn show_notification(&self, descriptor: &NotificationDescriptor) -> Result<(), HostError> {
        let mut notifications = self.notifications.lock().map_err(|e| {
            HostError::NotificationFailed {
                tag: descriptor.tag.clone(),
                reason: e.to_string(),
            }
        })?;
        notifications.retain(|n| n.tag != descriptor.tag);
        notifications.push(descriptor.clone());
        let overflow = notifications.len().saturating_sub(self.capacity);
        if overflow > 0 {
            for evicted in notifications.drain(..overflow) {
                tracing::debug!(tag = %evicted.tag, "Oldest notification evicted");
            }
        }
        tracing::info!(tag = %descriptor.tag, title = %descriptor.title, "Notification shown");
        Ok(())
    }

    async fn close_notification(&self, tag: &str) -> Result<(), HostError> {
        let mut notifications =
            self.notifications
                .lock()
                .map_err(|e| HostError::NotificationFailed {
                    tag: tag.to_string(),
                    reason: e.to_string(),
                })?;
        notifications.retain(|n| n.tag != tag);
        tracing::debug!(tag, "Notification closed");
        Ok(())
    }
}
