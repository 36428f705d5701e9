//! Event delivery.
//!
//! The host pushes [`AgentEvent`]s into an mpsc channel drained by an
//! [`EventLoop`]. Fetch events run concurrently on their own tasks; every
//! other event is handled to completion in arrival order.

use std::sync::Arc;

use haven_core::{
    AgentState, BatchReport, HavenError, HavenResult, NetworkError, NotificationClick,
    NotificationDescriptor, Request, VersionReply,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::agent::EventHandlers;
use crate::control::MessageEnvelope;
use crate::interceptor::FetchOutcome;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// The loop is gone; the event was not delivered or not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Agent event loop is not running")]
pub struct EventLoopClosed;

/// An event for the agent, with a responder where the sender wants an answer.
#[derive(Debug)]
pub enum AgentEvent {
    Install {
        respond: oneshot::Sender<HavenResult<AgentState>>,
    },
    Activate {
        respond: oneshot::Sender<HavenResult<BatchReport<HavenError>>>,
    },
    Fetch {
        request: Request,
        respond: oneshot::Sender<Result<FetchOutcome, NetworkError>>,
    },
    Push {
        payload: Option<Vec<u8>>,
        respond: Option<oneshot::Sender<HavenResult<Option<NotificationDescriptor>>>>,
    },
    Message {
        envelope: MessageEnvelope,
    },
    NotificationClick {
        click: NotificationClick,
    },
}

impl AgentEvent {
    fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Install { .. } => "install",
            AgentEvent::Activate { .. } => "activate",
            AgentEvent::Fetch { .. } => "fetch",
            AgentEvent::Push { .. } => "push",
            AgentEvent::Message { .. } => "message",
            AgentEvent::NotificationClick { .. } => "notificationclick",
        }
    }
}

/// Cloneable handle for submitting events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventSender {
    pub async fn send(&self, event: AgentEvent) -> Result<(), EventLoopClosed> {
        self.tx.send(event).await.map_err(|_| EventLoopClosed)
    }

    pub async fn install(&self) -> Result<HavenResult<AgentState>, EventLoopClosed> {
        let (respond, rx) = oneshot::channel();
        self.send(AgentEvent::Install { respond }).await?;
        rx.await.map_err(|_| EventLoopClosed)
    }

    pub async fn activate(&self) -> Result<HavenResult<BatchReport<HavenError>>, EventLoopClosed> {
        let (respond, rx) = oneshot::channel();
        self.send(AgentEvent::Activate { respond }).await?;
        rx.await.map_err(|_| EventLoopClosed)
    }

    pub async fn fetch(
        &self,
        request: Request,
    ) -> Result<Result<FetchOutcome, NetworkError>, EventLoopClosed> {
        let (respond, rx) = oneshot::channel();
        self.send(AgentEvent::Fetch { request, respond }).await?;
        rx.await.map_err(|_| EventLoopClosed)
    }

    pub async fn push(
        &self,
        payload: Option<Vec<u8>>,
    ) -> Result<HavenResult<Option<NotificationDescriptor>>, EventLoopClosed> {
        let (respond, rx) = oneshot::channel();
        self.send(AgentEvent::Push {
            payload,
            respond: Some(respond),
        })
        .await?;
        rx.await.map_err(|_| EventLoopClosed)
    }

    /// Post a message without a reply port.
    pub async fn post_message(&self, data: Value) -> Result<(), EventLoopClosed> {
        self.send(AgentEvent::Message {
            envelope: MessageEnvelope::new(data),
        })
        .await
    }

    /// Post a message with a reply port and wait for the answer. `None`
    /// when the message was handled without replying.
    pub async fn request(&self, data: Value) -> Result<Option<VersionReply>, EventLoopClosed> {
        let (envelope, rx) = MessageEnvelope::with_reply(data);
        self.send(AgentEvent::Message { envelope }).await?;
        Ok(rx.await.ok())
    }

    pub async fn notification_click(&self, click: NotificationClick) -> Result<(), EventLoopClosed> {
        self.send(AgentEvent::NotificationClick { click }).await
    }
}

/// Drains the event channel into an [`EventHandlers`] implementation.
pub struct EventLoop<A> {
    agent: Arc<A>,
    rx: mpsc::Receiver<AgentEvent>,
}

impl<A: EventHandlers + 'static> EventLoop<A> {
    pub fn new(agent: Arc<A>, capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (EventSender { tx }, Self { agent, rx })
    }

    /// Run on a background task until every [`EventSender`] is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::debug!("Agent event loop started");
        while let Some(event) = self.rx.recv().await {
            tracing::trace!(event = event.kind(), "Dispatching event");
            Self::dispatch(&self.agent, event).await;
        }
        tracing::debug!("Agent event loop stopped");
    }

    async fn dispatch(agent: &Arc<A>, event: AgentEvent) {
        match event {
            AgentEvent::Fetch { request, respond } => {
                let agent = agent.clone();
                tokio::spawn(async move {
                    let result = agent.on_fetch(&request).await;
                    // Requester gone: the page was torn down.
                    let _ = respond.send(result);
                });
            }
            AgentEvent::Install { respond } => {
                let result = agent.on_install().await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Install failed");
                }
                let _ = respond.send(result);
            }
            AgentEvent::Activate { respond } => {
                let result = agent.on_activate().await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Activation failed");
                }
                let _ = respond.send(result);
            }
            AgentEvent::Push { payload, respond } => {
                let result = agent.on_push(payload.as_deref()).await;
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Push handling failed");
                }
                if let Some(respond) = respond {
                    let _ = respond.send(result);
                }
            }
            AgentEvent::Message { envelope } => {
                if let Err(e) = agent.on_message(envelope).await {
                    tracing::warn!(error = %e, "Control message handling failed");
                }
            }
            AgentEvent::NotificationClick { click } => {
                if let Err(e) = agent.on_notification_click(&click).await {
                    tracing::warn!(error = %e, tag = %click.tag, "Notification click handling failed");
                }
            }
        }
    }
}
