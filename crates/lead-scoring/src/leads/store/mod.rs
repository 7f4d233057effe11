//! Durable storage for lead profiles.
//!
//! Profiles are written through a [`KeyValueArea`], a string key/value space that may refuse
//! writes once its capacity is reached. [`DurableProfileStore`] owns the truncation, eviction
//! and degraded-write policy on top of it, so the scoring engine never sees a storage failure.

mod area;
mod durable;

pub use area::{MemoryArea, SqliteArea};
pub use durable::{DurableProfileStore, StoreLimits, PROFILE_KEY_PREFIX, TEMP_KEY_PREFIX};

use super::domain::{LeadProfile, SessionId};

/// Quota-constrained string key/value space.
pub trait KeyValueArea: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AreaError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AreaError>;
    fn remove(&self, key: &str) -> Result<(), AreaError>;
    fn keys(&self) -> Result<Vec<String>, AreaError>;
}

/// Storage abstraction the scoring engine persists through.
pub trait ProfileStore: Send + Sync {
    fn load(&self, id: &SessionId) -> Result<Option<LeadProfile>, StoreError>;
    /// Persist a profile. Failures are absorbed and reported through the outcome.
    fn save(&self, profile: &LeadProfile) -> SaveOutcome;
    fn profiles(&self) -> Result<Vec<LeadProfile>, StoreError>;
}

/// Result of a save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Persisted,
    /// Written in reduced form after an eviction pass.
    PersistedMinimal { evicted: Vec<SessionId> },
    /// Nothing was written; the in-memory profile stays authoritative.
    Dropped { reason: String },
}

impl SaveOutcome {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, SaveOutcome::Dropped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AreaError {
    #[error("storage quota exceeded ({requested} bytes requested, {available} available)")]
    QuotaExceeded { requested: usize, available: usize },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Area(#[from] AreaError),
    #[error("stored profile under '{key}' is unreadable: {source}")]
    Codec {
        key: String,
        source: serde_json::Error,
    },
}
