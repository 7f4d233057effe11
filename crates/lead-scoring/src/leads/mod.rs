//! Lead scoring and conversion state machine.
//!
//! Behavioral triggers flow into [`LeadScoringEngine`], which accumulates scores, derives the
//! visitor's status through the [`StatusPolicy`], refreshes readiness and predictions, persists
//! through a [`ProfileStore`] and reports to an [`EventSink`] without waiting on it.

pub mod catalog;
pub mod domain;
pub mod evaluation;
pub mod events;
pub mod policy;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use catalog::{action_for, points_for, resolve, EngagementAction};
pub use domain::{
    ActivityRecord, Attribution, Category, LeadProfile, LeadStatus, LeadSummaryView,
    OverrideAnchor, Predictions, ScoringError, SessionId, TriggerKind, TriggerMetadata,
    VisitContext,
};
pub use evaluation::{ProfileEvaluator, ReadinessConfig};
pub use events::{EventSink, HttpEventSink, LeadEvent, NoopSink, TelemetryEmitter, TelemetryError};
pub use policy::{FallbackRule, ScoreWindow, StatusPolicy, StatusThreshold};
pub use router::{lead_router, LeadApiState};
pub use service::{EngineSettings, LeadScoringEngine};
pub use store::{
    AreaError, DurableProfileStore, KeyValueArea, MemoryArea, ProfileStore, SaveOutcome,
    SqliteArea, StoreError, StoreLimits,
};
