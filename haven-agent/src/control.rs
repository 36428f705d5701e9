//! Control Channel
//!
//! Pages post `{ "type": ... }` objects. `GET_VERSION` is answered on the
//! reply port carried by the envelope; `SKIP_WAITING` and `CLEAR_CACHE` are
//! commands. Anything else is dropped without error.

use std::sync::Arc;

use haven_core::{AgentConfig, BatchReport, ControlMessage, HavenError, HavenResult, VersionReply};
use haven_storage::TierStore;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::host::{Host, Network};
use crate::lifecycle::LifecycleController;

/// A message as delivered by the host, with its optional reply port.
#[derive(Debug)]
pub struct MessageEnvelope {
    pub data: Value,
    pub reply: Option<oneshot::Sender<VersionReply>>,
}

impl MessageEnvelope {
    pub fn new(data: Value) -> Self {
        Self { data, reply: None }
    }

    /// Attach a reply port; returns the receiving end.
    pub fn with_reply(data: Value) -> (Self, oneshot::Receiver<VersionReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                data,
                reply: Some(tx),
            },
            rx,
        )
    }
}

/// What handling a message did.
#[derive(Debug)]
pub enum ControlOutcome {
    /// Version sent on the reply port.
    Replied(VersionReply),
    SkippedWaiting,
    /// Every tier deletion attempt, in store order.
    Cleared(BatchReport<HavenError>),
    /// Unrecognised shape, or `GET_VERSION` without a reply port.
    Ignored,
}

pub struct ControlChannel<S, N, H> {
    config: Arc<AgentConfig>,
    lifecycle: Arc<LifecycleController<S, N, H>>,
}

impl<S, N, H> ControlChannel<S, N, H>
where
    S: TierStore + 'static,
    N: Network,
    H: Host,
{
    pub fn new(config: Arc<AgentConfig>, lifecycle: Arc<LifecycleController<S, N, H>>) -> Self {
        Self { config, lifecycle }
    }

    pub async fn handle(&self, envelope: MessageEnvelope) -> HavenResult<ControlOutcome> {
        let Some(message) = ControlMessage::parse(&envelope.data) else {
            tracing::debug!(data = %envelope.data, "Ignoring unrecognised control message");
            return Ok(ControlOutcome::Ignored);
        };
        tracing::debug!(message = message.wire_name(), "Control message received");

        match message {
            ControlMessage::GetVersion => {
                let Some(reply) = envelope.reply else {
                    tracing::debug!("GET_VERSION without reply port");
                    return Ok(ControlOutcome::Ignored);
                };
                let answer = VersionReply {
                    version: self.config.registry.static_name(),
                };
                if reply.send(answer.clone()).is_err() {
                    tracing::debug!("GET_VERSION requester went away");
                }
                Ok(ControlOutcome::Replied(answer))
            }
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting().await?;
                Ok(ControlOutcome::SkippedWaiting)
            }
            ControlMessage::ClearCache => {
                let report = self.lifecycle.clear_all().await?;
                tracing::info!(
                    cleared = report.successes().count(),
                    failed = report.failure_count(),
                    "Cleared all tiers"
                );
                Ok(ControlOutcome::Cleared(report))
            }
        }
    }
}
