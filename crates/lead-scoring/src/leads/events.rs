use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{LeadProfile, LeadStatus, SessionId, TriggerKind};

/// Events reported to the remote collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeadEvent {
    StatusProgression {
        session_id: SessionId,
        from: LeadStatus,
        to: LeadStatus,
        trigger: TriggerKind,
        engagement_score: u32,
        behavioral_score: u32,
        demographic_score: u32,
        timestamp: DateTime<Utc>,
    },
    EngagementAction {
        session_id: SessionId,
        trigger: TriggerKind,
        points: u32,
        engagement_score: u32,
        status: LeadStatus,
        timestamp: DateTime<Utc>,
    },
}

impl LeadEvent {
    pub fn status_progression(
        profile: &LeadProfile,
        from: LeadStatus,
        trigger: TriggerKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        LeadEvent::StatusProgression {
            session_id: profile.id.clone(),
            from,
            to: profile.status,
            trigger,
            engagement_score: profile.engagement_score,
            behavioral_score: profile.behavioral_score,
            demographic_score: profile.demographic_score,
            timestamp,
        }
    }

    pub fn engagement_action(
        profile: &LeadProfile,
        trigger: TriggerKind,
        points: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        LeadEvent::EngagementAction {
            session_id: profile.id.clone(),
            trigger,
            points,
            engagement_score: profile.engagement_score,
            status: profile.status,
            timestamp,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            LeadEvent::StatusProgression { .. } => "status_progression",
            LeadEvent::EngagementAction { .. } => "engagement_action",
        }
    }
}

/// Delivery failure. Logged by the emitter, never surfaced to engine callers.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry transport failed: {0}")]
    Transport(String),
    #[error("collector rejected event with status {0}")]
    Rejected(u16),
}

/// Outbound sink for lead events.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn deliver(&self, event: LeadEvent) -> Result<(), TelemetryError>;
}

/// Sink used when no collector is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn deliver(&self, _event: LeadEvent) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Posts events as JSON to a collector endpoint.
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpEventSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn deliver(&self, event: LeadEvent) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&event)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| TelemetryError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetryError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Fire-and-forget dispatcher in front of an [`EventSink`].
pub struct TelemetryEmitter<E> {
    sink: Arc<E>,
}

impl<E> Clone for TelemetryEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<E> TelemetryEmitter<E>
where
    E: EventSink,
{
    pub fn new(sink: Arc<E>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Schedule delivery on the current runtime and return immediately.
    pub fn emit(&self, event: LeadEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(event = event.name(), "no async runtime; telemetry event dropped");
            return;
        };

        let sink = Arc::clone(&self.sink);
        handle.spawn(async move {
            let name = event.name();
            if let Err(err) = sink.deliver(event).await {
                warn!(event = name, error = %err, "telemetry delivery failed");
            }
        });
    }
}
