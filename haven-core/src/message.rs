//! Control-channel messages, push payloads and notification descriptors.
//!
//! Everything arriving from pages or the push service is untrusted: parsing
//! returns `None` for anything malformed rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::NotificationConfig;

/// A control request from a page, tagged by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate now instead of waiting for old pages to go away
    SkipWaiting,
    /// Ask for the active static generation; needs a reply channel
    GetVersion,
    /// Delete every tier in the store
    ClearCache,
}

impl ControlMessage {
    /// Parse a message object. Unknown or malformed shapes yield `None`.
    pub fn parse(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            ControlMessage::SkipWaiting => "SKIP_WAITING",
            ControlMessage::GetVersion => "GET_VERSION",
            ControlMessage::ClearCache => "CLEAR_CACHE",
        }
    }

    /// Whether the sender expects an answer on a reply channel.
    pub fn expects_reply(&self) -> bool {
        matches!(self, ControlMessage::GetVersion)
    }
}

/// Answer to `GET_VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// Payload delivered by the push service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Value,
}

impl PushPayload {
    /// Decode raw push bytes; absent or malformed payloads yield `None`.
    pub fn parse(raw: Option<&[u8]>) -> Option<Self> {
        let raw = raw?;
        if raw.is_empty() {
            return None;
        }
        serde_json::from_slice(raw).ok()
    }
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_DISMISS: &str = "dismiss";

/// Everything the host needs to display a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDescriptor {
    /// Identifies the notification in later click events
    pub tag: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: Value,
    pub actions: Vec<NotificationAction>,
}

impl NotificationDescriptor {
    pub fn from_payload(payload: PushPayload, config: &NotificationConfig) -> Self {
        Self {
            tag: Uuid::now_v7().to_string(),
            title: payload.title,
            body: payload.body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            data: payload.data,
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: "Explore".to_string(),
                    icon: config.explore_icon.clone(),
                },
                NotificationAction {
                    action: ACTION_DISMISS.to_string(),
                    title: "Dismiss".to_string(),
                    icon: config.dismiss_icon.clone(),
                },
            ],
        }
    }
}

/// A user interaction with a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub tag: String,
    /// `None` for a plain click on the notification body
    #[serde(default)]
    pub action: Option<String>,
}

/// What the user chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationChoice {
    Explore,
    Dismiss,
    /// Plain click or an unrecognised action
    Default,
}

impl NotificationClick {
    pub fn choice(&self) -> NotificationChoice {
        match self.action.as_deref() {
            Some(ACTION_EXPLORE) => NotificationChoice::Explore,
            Some(ACTION_DISMISS) => NotificationChoice::Dismiss,
            _ => NotificationChoice::Default,
        }
    }
}
