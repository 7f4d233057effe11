use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::catalog;
use super::domain::{
    ActivityRecord, LeadProfile, LeadStatus, OverrideAnchor, ScoringError, SessionId, TriggerKind,
    TriggerMetadata, VisitContext,
};
use super::evaluation::ProfileEvaluator;
use super::events::{EventSink, LeadEvent, TelemetryEmitter};
use super::store::{ProfileStore, SaveOutcome};

/// Tunables owned by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Activities kept in memory per profile; the oldest are dropped first.
    pub activity_retention: usize,
    /// Profiles kept in the in-process cache. Persisted profiles beyond this are reloaded on demand.
    pub cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            activity_retention: 100,
            cache_capacity: 1_000,
        }
    }
}

struct CachedProfile {
    profile: LeadProfile,
    /// False while the latest state exists only in memory; such entries are never evicted.
    persisted: bool,
}

/// Stateful scoring engine: an in-process profile cache in front of a [`ProfileStore`].
///
/// Each session's load, mutate and persist cycle runs under a per-session lock so concurrent
/// requests for one visitor cannot lose updates. Sessions never block each other. A lock entry
/// lives only while some caller holds or waits on it.
pub struct LeadScoringEngine<S, E> {
    store: Arc<S>,
    emitter: TelemetryEmitter<E>,
    evaluator: Arc<ProfileEvaluator>,
    settings: EngineSettings,
    cache: Mutex<HashMap<SessionId, CachedProfile>>,
    session_locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl<S, E> LeadScoringEngine<S, E>
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    pub fn new(
        store: Arc<S>,
        sink: Arc<E>,
        evaluator: Arc<ProfileEvaluator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            emitter: TelemetryEmitter::new(sink),
            evaluator,
            settings,
            cache: Mutex::new(HashMap::new()),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn evaluator(&self) -> &ProfileEvaluator {
        &self.evaluator
    }

    /// Apply one trigger to the session's profile and return the updated snapshot.
    pub fn apply_trigger(
        &self,
        session_id: &SessionId,
        trigger: TriggerKind,
        metadata: TriggerMetadata,
        visit: &VisitContext,
    ) -> Result<LeadProfile, ScoringError> {
        self.apply_trigger_at(session_id, trigger, metadata, visit, Utc::now())
    }

    /// Parse a wire trigger name before touching any state.
    ///
    /// `manual_override` is refused here; overrides go through [`Self::manual_status_override`].
    pub fn apply_named_trigger(
        &self,
        session_id: &SessionId,
        trigger: &str,
        metadata: TriggerMetadata,
        visit: &VisitContext,
    ) -> Result<LeadProfile, ScoringError> {
        let trigger: TriggerKind = trigger.parse()?;
        if trigger == TriggerKind::ManualOverride {
            return Err(ScoringError::ReservedTrigger(trigger.label().to_string()));
        }
        self.apply_trigger(session_id, trigger, metadata, visit)
    }

    pub fn apply_trigger_at(
        &self,
        session_id: &SessionId,
        trigger: TriggerKind,
        metadata: TriggerMetadata,
        visit: &VisitContext,
        now: DateTime<Utc>,
    ) -> Result<LeadProfile, ScoringError> {
        if let TriggerMetadata::Override { target, reason, .. } = &metadata {
            if trigger == TriggerKind::ManualOverride {
                return Ok(self.manual_status_override_at(session_id, *target, reason.clone(), now));
            }
        }

        Ok(self.with_session(session_id, || {
            let mut profile = self.load_or_create(session_id, visit, now);
            let previous = profile.status;
            let points = catalog::points_for(trigger, &metadata);

            self.record(&mut profile, trigger, points, visit.page_url.clone(), metadata, now);

            let derived = self.evaluator.policy().derive(
                profile.engagement_score,
                &profile.activities,
                profile.override_anchor.as_ref(),
            );
            profile.status = previous.max(derived);
            self.evaluator.refresh(&mut profile, now);

            self.commit(profile, previous, trigger, points, now)
        }))
    }

    /// Force a profile into `target`, bypassing score-derived progression.
    pub fn manual_status_override(
        &self,
        session_id: &SessionId,
        target: LeadStatus,
        reason: Option<String>,
    ) -> LeadProfile {
        self.manual_status_override_at(session_id, target, reason, Utc::now())
    }

    pub fn manual_status_override_at(
        &self,
        session_id: &SessionId,
        target: LeadStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> LeadProfile {
        self.with_session(session_id, || {
            let mut profile = self.load_or_create(session_id, &VisitContext::default(), now);
            let previous = profile.status;
            let floor = self.evaluator.policy().window(target).min_score;
            let points = floor.saturating_sub(profile.engagement_score);

            info!(
                session = %session_id,
                from = %previous,
                to = %target,
                points,
                "manual status override"
            );

            let metadata = TriggerMetadata::Override {
                target,
                previous,
                reason,
            };
            self.record(
                &mut profile,
                TriggerKind::ManualOverride,
                points,
                None,
                metadata,
                now,
            );
            profile.override_anchor = Some(OverrideAnchor {
                target,
                engagement_score: profile.engagement_score,
                at: now,
            });

            profile.status = self.evaluator.policy().derive(
                profile.engagement_score,
                &profile.activities,
                profile.override_anchor.as_ref(),
            );
            self.evaluator.refresh(&mut profile, now);

            self.commit(profile, previous, TriggerKind::ManualOverride, points, now)
        })
    }

    /// Current profile for a session, read through the cache. `None` means no activity yet.
    pub fn current_profile(&self, session_id: &SessionId) -> Option<LeadProfile> {
        if let Some(profile) = self.cache_get(session_id) {
            return Some(profile);
        }

        // A writer may commit while the store is read, so the miss is resolved under the lock.
        self.with_session(session_id, || {
            if let Some(profile) = self.cache_get(session_id) {
                return Some(profile);
            }

            match self.store.load(session_id) {
                Ok(Some(profile)) => {
                    self.cache_put(profile.clone(), true);
                    Some(profile)
                }
                Ok(None) => None,
                Err(err) => {
                    warn!(session = %session_id, error = %err, "profile load failed");
                    None
                }
            }
        })
    }

    /// Load the session's profile, creating and persisting a fresh one when none exists.
    pub fn ensure_profile(&self, session_id: &SessionId, visit: &VisitContext) -> LeadProfile {
        self.with_session(session_id, || {
            if let Some(profile) = self.cache_get(session_id) {
                return profile;
            }

            let (profile, persisted) = match self.store.load(session_id) {
                Ok(Some(profile)) => (profile, true),
                loaded => {
                    if let Err(err) = loaded {
                        warn!(session = %session_id, error = %err, "profile load failed");
                    }
                    let now = Utc::now();
                    let mut profile = LeadProfile::new(session_id.clone(), visit, now);
                    self.evaluator.refresh(&mut profile, now);
                    let outcome = self.store.save(&profile);
                    log_save(&profile.id, &outcome);
                    (profile, outcome.is_persisted())
                }
            };
            self.cache_put(profile.clone(), persisted);
            profile
        })
    }

    /// Count of known profiles per status. Cached profiles win over stored copies.
    pub fn status_distribution(&self) -> BTreeMap<LeadStatus, usize> {
        let mut statuses: BTreeMap<SessionId, LeadStatus> = BTreeMap::new();

        match self.store.profiles() {
            Ok(profiles) => {
                for profile in profiles {
                    statuses.insert(profile.id, profile.status);
                }
            }
            Err(err) => warn!(error = %err, "stored profiles unavailable for distribution"),
        }

        {
            let guard = self.cache.lock().expect("profile cache mutex poisoned");
            for (id, cached) in guard.iter() {
                statuses.insert(id.clone(), cached.profile.status);
            }
        }

        let mut distribution: BTreeMap<LeadStatus, usize> =
            LeadStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        for status in statuses.into_values() {
            *distribution.entry(status).or_default() += 1;
        }
        distribution
    }

    #[cfg(test)]
    pub(crate) fn tracked_sessions(&self) -> (usize, usize) {
        let locks = self
            .session_locks
            .lock()
            .expect("session lock table poisoned")
            .len();
        let cached = self.cache.lock().expect("profile cache mutex poisoned").len();
        (locks, cached)
    }

    fn with_session<T>(&self, session_id: &SessionId, work: impl FnOnce() -> T) -> T {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().expect("session mutex poisoned");
            work()
        };
        self.release_session_lock(session_id, lock);
        result
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        let mut guard = self
            .session_locks
            .lock()
            .expect("session lock table poisoned");
        Arc::clone(guard.entry(session_id.clone()).or_default())
    }

    fn release_session_lock(&self, session_id: &SessionId, lock: Arc<Mutex<()>>) {
        let mut guard = self
            .session_locks
            .lock()
            .expect("session lock table poisoned");
        // The table and `lock` are the last two handles when nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            guard.remove(session_id);
        }
    }

    fn cache_get(&self, session_id: &SessionId) -> Option<LeadProfile> {
        self.cache
            .lock()
            .expect("profile cache mutex poisoned")
            .get(session_id)
            .map(|cached| cached.profile.clone())
    }

    fn cache_put(&self, profile: LeadProfile, persisted: bool) {
        let mut cache = self.cache.lock().expect("profile cache mutex poisoned");
        let id = profile.id.clone();
        cache.insert(id.clone(), CachedProfile { profile, persisted });

        while cache.len() > self.settings.cache_capacity {
            let stalest = cache
                .iter()
                .filter(|(key, cached)| cached.persisted && **key != id)
                .min_by_key(|(_, cached)| cached.profile.last_activity)
                .map(|(key, _)| key.clone());
            match stalest {
                Some(key) => {
                    cache.remove(&key);
                    debug!(session = %key, "profile dropped from cache");
                }
                None => break,
            }
        }
    }

    fn load_or_create(
        &self,
        session_id: &SessionId,
        visit: &VisitContext,
        now: DateTime<Utc>,
    ) -> LeadProfile {
        if let Some(profile) = self.cache_get(session_id) {
            return profile;
        }

        match self.store.load(session_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(session = %session_id, "creating visitor profile");
                LeadProfile::new(session_id.clone(), visit, now)
            }
            Err(err) => {
                warn!(
                    session = %session_id,
                    error = %err,
                    "stored profile unusable; starting a fresh visitor profile"
                );
                LeadProfile::new(session_id.clone(), visit, now)
            }
        }
    }

    fn record(
        &self,
        profile: &mut LeadProfile,
        trigger: TriggerKind,
        points: u32,
        page_url: Option<String>,
        metadata: TriggerMetadata,
        now: DateTime<Utc>,
    ) {
        let share = catalog::category_share(catalog::action_for(trigger).category, points);

        profile.engagement_score = profile.engagement_score.saturating_add(points);
        profile.behavioral_score = profile.behavioral_score.saturating_add(share.behavioral);
        profile.demographic_score = profile.demographic_score.saturating_add(share.demographic);

        profile.activities.push(ActivityRecord {
            timestamp: now,
            trigger,
            points,
            page_url,
            metadata,
        });
        let overflow = profile
            .activities
            .len()
            .saturating_sub(self.settings.activity_retention);
        if overflow > 0 {
            profile.activities.drain(..overflow);
        }

        profile.last_activity = now;
    }

    fn commit(
        &self,
        profile: LeadProfile,
        previous: LeadStatus,
        trigger: TriggerKind,
        points: u32,
        now: DateTime<Utc>,
    ) -> LeadProfile {
        let outcome = self.store.save(&profile);
        log_save(&profile.id, &outcome);
        self.cache_put(profile.clone(), outcome.is_persisted());

        if profile.status != previous {
            info!(
                session = %profile.id,
                from = %previous,
                to = %profile.status,
                score = profile.engagement_score,
                "lead status changed"
            );
            self.emitter
                .emit(LeadEvent::status_progression(&profile, previous, trigger, now));
        }
        self.emitter
            .emit(LeadEvent::engagement_action(&profile, trigger, points, now));

        profile
    }
}

fn log_save(session_id: &SessionId, outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Persisted => debug!(session = %session_id, "profile persisted"),
        SaveOutcome::PersistedMinimal { evicted } => debug!(
            session = %session_id,
            evicted = evicted.len(),
            "profile persisted in reduced form"
        ),
        SaveOutcome::Dropped { reason } => warn!(
            session = %session_id,
            %reason,
            "profile not persisted; continuing in memory"
        ),
    }
}
