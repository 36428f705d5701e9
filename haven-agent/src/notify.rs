//! Notification Dispatcher

use std::sync::Arc;

use haven_core::{
    AgentConfig, HavenResult, NotificationChoice, NotificationClick, NotificationDescriptor,
    PushPayload,
};

use crate::host::Host;

pub struct NotificationDispatcher<H> {
    config: Arc<AgentConfig>,
    host: Arc<H>,
}

impl<H: Host> NotificationDispatcher<H> {
    pub fn new(config: Arc<AgentConfig>, host: Arc<H>) -> Self {
        Self { config, host }
    }

    /// Show a notification for a push. Absent or malformed payloads are
    /// dropped and yield `Ok(None)`.
    pub async fn dispatch_push(&self, raw: Option<&[u8]>) -> HavenResult<Option<NotificationDescriptor>> {
        let Some(payload) = PushPayload::parse(raw) else {
            tracing::debug!(present = raw.is_some(), "Ignoring unusable push payload");
            return Ok(None);
        };

        let descriptor = NotificationDescriptor::from_payload(payload, &self.config.notifications);
        self.host.show_notification(&descriptor).await?;
        tracing::info!(tag = %descriptor.tag, title = %descriptor.title, "Notification shown");
        Ok(Some(descriptor))
    }

    /// Close the notification, then navigate according to the chosen action.
    pub async fn handle_click(&self, click: &NotificationClick) -> HavenResult<NotificationChoice> {
        self.host.close_notification(&click.tag).await?;

        let choice = click.choice();
        let target = match choice {
            NotificationChoice::Dismiss => None,
            NotificationChoice::Explore => Some(&self.config.notifications.explore_url),
            NotificationChoice::Default => Some(&self.config.notifications.root_url),
        };
        tracing::info!(tag = %click.tag, action = ?click.action, "Notification clicked");

        if let Some(path) = target {
            let url = self.config.resolve(path)?;
            self.host.open_window(&url).await?;
        }
        Ok(choice)
    }
}
