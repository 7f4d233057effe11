use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::super::domain::{
    ActivityRecord, Attribution, LeadProfile, LeadStatus, OverrideAnchor, Predictions, SessionId,
};
use super::super::evaluation::ProfileEvaluator;
use super::{AreaError, KeyValueArea, ProfileStore, SaveOutcome, StoreError};

pub const PROFILE_KEY_PREFIX: &str = "lead_scoring:profile:";
pub const TEMP_KEY_PREFIX: &str = "lead_scoring:tmp:";

/// Size limits applied when writing profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Activity tail kept in a regular write.
    pub persisted_activities: usize,
    /// Activity tail kept in the reduced write after an eviction pass.
    pub minimal_activities: usize,
    /// Other profiles kept by an eviction pass, most recently active first.
    pub profile_retention: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            persisted_activities: 50,
            minimal_activities: 10,
            profile_retention: 5,
        }
    }
}

pub(crate) fn profile_key(id: &SessionId) -> String {
    format!("{PROFILE_KEY_PREFIX}{}", id.0)
}

/// On-disk shape. Reduced writes omit attribution, readiness and predictions.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredProfile {
    id: SessionId,
    status: LeadStatus,
    engagement_score: u32,
    behavioral_score: u32,
    demographic_score: u32,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversion_readiness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribution: Option<Attribution>,
    #[serde(default)]
    activities: Vec<ActivityRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    predictions: Option<Predictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    override_anchor: Option<OverrideAnchor>,
}

fn tail(activities: &[ActivityRecord], limit: usize) -> Vec<ActivityRecord> {
    let start = activities.len().saturating_sub(limit);
    activities[start..].to_vec()
}

impl StoredProfile {
    fn full(profile: &LeadProfile, limit: usize) -> Self {
        Self {
            conversion_readiness: Some(profile.conversion_readiness),
            source: Some(profile.source.clone()),
            attribution: Some(profile.attribution.clone()),
            predictions: Some(profile.predictions.clone()),
            ..Self::minimal(profile, limit)
        }
    }

    fn minimal(profile: &LeadProfile, limit: usize) -> Self {
        Self {
            id: profile.id.clone(),
            status: profile.status,
            engagement_score: profile.engagement_score,
            behavioral_score: profile.behavioral_score,
            demographic_score: profile.demographic_score,
            created_at: profile.created_at,
            last_activity: profile.last_activity,
            conversion_readiness: None,
            source: None,
            attribution: None,
            activities: tail(&profile.activities, limit),
            predictions: None,
            override_anchor: profile.override_anchor,
        }
    }

    fn into_profile(self, evaluator: &ProfileEvaluator) -> LeadProfile {
        let reduced = self.predictions.is_none() || self.conversion_readiness.is_none();
        let mut profile = LeadProfile {
            id: self.id,
            status: self.status,
            engagement_score: self.engagement_score,
            behavioral_score: self.behavioral_score,
            demographic_score: self.demographic_score,
            conversion_readiness: self.conversion_readiness.unwrap_or_default(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            source: self.source.unwrap_or_else(|| "unknown".to_string()),
            attribution: self.attribution.unwrap_or_default(),
            activities: self.activities,
            predictions: self.predictions.unwrap_or_default(),
            override_anchor: self.override_anchor,
        };

        if reduced {
            let as_of = profile.last_activity;
            evaluator.refresh(&mut profile, as_of);
        }
        profile
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredStamp {
    last_activity: DateTime<Utc>,
}

/// Profile store over a quota-constrained key/value area.
pub struct DurableProfileStore<A> {
    area: Arc<A>,
    evaluator: Arc<ProfileEvaluator>,
    limits: StoreLimits,
}

impl<A> DurableProfileStore<A>
where
    A: KeyValueArea,
{
    pub fn new(area: Arc<A>, evaluator: Arc<ProfileEvaluator>, limits: StoreLimits) -> Self {
        Self {
            area,
            evaluator,
            limits,
        }
    }

    pub fn area(&self) -> &A {
        &self.area
    }

    fn decode(&self, key: &str, raw: &str) -> Result<LeadProfile, StoreError> {
        let stored: StoredProfile =
            serde_json::from_str(raw).map_err(|source| StoreError::Codec {
                key: key.to_string(),
                source,
            })?;
        Ok(stored.into_profile(&self.evaluator))
    }

    /// Remove temporary keys, unreadable profile records and every profile beyond the
    /// retention count. The profile being written is never touched.
    pub fn evict(&self, active: &SessionId) -> Result<Vec<SessionId>, AreaError> {
        let mut live: Vec<(DateTime<Utc>, SessionId, String)> = Vec::new();

        for key in self.area.keys()? {
            if key.starts_with(TEMP_KEY_PREFIX) {
                debug!(%key, "removing temporary key");
                self.area.remove(&key)?;
                continue;
            }

            let Some(raw_id) = key.strip_prefix(PROFILE_KEY_PREFIX) else {
                continue;
            };
            if raw_id == active.as_str() {
                continue;
            }

            let Some(raw) = self.area.get(&key)? else {
                continue;
            };
            match serde_json::from_str::<StoredStamp>(&raw) {
                Ok(stamp) => live.push((stamp.last_activity, SessionId(raw_id.to_string()), key)),
                Err(err) => {
                    debug!(%key, error = %err, "removing unreadable profile record");
                    self.area.remove(&key)?;
                }
            }
        }

        live.sort_by(|left, right| right.0.cmp(&left.0).then_with(|| left.1.cmp(&right.1)));

        let mut evicted = Vec::new();
        for (_, id, key) in live.into_iter().skip(self.limits.profile_retention) {
            self.area.remove(&key)?;
            evicted.push(id);
        }
        Ok(evicted)
    }

    fn save_reduced(&self, profile: &LeadProfile, key: &str) -> SaveOutcome {
        let evicted = match self.evict(&profile.id) {
            Ok(evicted) => evicted,
            Err(err) => {
                warn!(session = %profile.id, error = %err, "eviction pass failed");
                Vec::new()
            }
        };

        let reduced = StoredProfile::minimal(profile, self.limits.minimal_activities);
        let payload = match serde_json::to_string(&reduced) {
            Ok(payload) => payload,
            Err(err) => return SaveOutcome::Dropped { reason: err.to_string() },
        };

        match self.area.set(key, &payload) {
            Ok(()) => {
                info!(
                    session = %profile.id,
                    evicted = evicted.len(),
                    "profile persisted in reduced form after eviction"
                );
                SaveOutcome::PersistedMinimal { evicted }
            }
            Err(err) => {
                warn!(
                    session = %profile.id,
                    error = %err,
                    "dropping profile write; in-memory state remains authoritative"
                );
                SaveOutcome::Dropped {
                    reason: err.to_string(),
                }
            }
        }
    }
}

impl<A> ProfileStore for DurableProfileStore<A>
where
    A: KeyValueArea,
{
    fn load(&self, id: &SessionId) -> Result<Option<LeadProfile>, StoreError> {
        let key = profile_key(id);
        match self.area.get(&key)? {
            Some(raw) => self.decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, profile: &LeadProfile) -> SaveOutcome {
        let key = profile_key(&profile.id);
        let stored = StoredProfile::full(profile, self.limits.persisted_activities);
        let payload = match serde_json::to_string(&stored) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(session = %profile.id, error = %err, "profile could not be serialized");
                return SaveOutcome::Dropped {
                    reason: err.to_string(),
                };
            }
        };

        match self.area.set(&key, &payload) {
            Ok(()) => SaveOutcome::Persisted,
            Err(AreaError::QuotaExceeded {
                requested,
                available,
            }) => {
                info!(
                    session = %profile.id,
                    requested,
                    available,
                    "storage quota exhausted; evicting before retry"
                );
                self.save_reduced(profile, &key)
            }
            Err(err) => {
                warn!(session = %profile.id, error = %err, "profile write failed");
                SaveOutcome::Dropped {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn profiles(&self) -> Result<Vec<LeadProfile>, StoreError> {
        let mut profiles = Vec::new();
        for key in self.area.keys()? {
            if !key.starts_with(PROFILE_KEY_PREFIX) {
                continue;
            }
            let Some(raw) = self.area.get(&key)? else {
                continue;
            };
            match self.decode(&key, &raw) {
                Ok(profile) => profiles.push(profile),
                Err(err) => warn!(error = %err, "skipping unreadable profile record"),
            }
        }
        Ok(profiles)
    }
}
