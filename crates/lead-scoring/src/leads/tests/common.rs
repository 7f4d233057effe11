use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::assessment::AssessmentRegistry;
use crate::leads::domain::{LeadProfile, SessionId, TriggerKind, TriggerMetadata, VisitContext};
use crate::leads::evaluation::{ProfileEvaluator, ReadinessConfig};
use crate::leads::events::{EventSink, LeadEvent, TelemetryError};
use crate::leads::lead_router;
use crate::leads::policy::StatusPolicy;
use crate::leads::service::{EngineSettings, LeadScoringEngine};
use crate::leads::store::{
    AreaError, DurableProfileStore, MemoryArea, ProfileStore, SaveOutcome, StoreError, StoreLimits,
};

pub(super) type MemoryStore = DurableProfileStore<MemoryArea>;
pub(super) type TestEngine = LeadScoringEngine<MemoryStore, RecordingSink>;

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 24, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn minutes(offset: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(offset)
}

pub(super) fn session(id: &str) -> SessionId {
    SessionId(id.to_string())
}

pub(super) fn campaign_visit() -> VisitContext {
    let mut query = BTreeMap::new();
    query.insert("utm_source".to_string(), "newsletter".to_string());
    query.insert("utm_medium".to_string(), "email".to_string());
    query.insert("utm_campaign".to_string(), "autumn-webinar".to_string());
    VisitContext {
        page_url: Some("https://example.org/tools/burnout".to_string()),
        referrer: Some("https://mail.example.net/inbox".to_string()),
        query,
    }
}

pub(super) fn evaluator() -> Arc<ProfileEvaluator> {
    Arc::new(ProfileEvaluator::new(
        Arc::new(StatusPolicy::standard()),
        ReadinessConfig::default(),
    ))
}

pub(super) fn memory_store(area: Arc<MemoryArea>, limits: StoreLimits) -> Arc<MemoryStore> {
    Arc::new(DurableProfileStore::new(area, evaluator(), limits))
}

pub(super) struct Harness {
    pub engine: TestEngine,
    pub area: Arc<MemoryArea>,
    pub sink: Arc<RecordingSink>,
}

pub(super) fn harness() -> Harness {
    harness_with(Arc::new(MemoryArea::unbounded()), EngineSettings::default())
}

pub(super) fn harness_with(area: Arc<MemoryArea>, settings: EngineSettings) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let store = memory_store(Arc::clone(&area), StoreLimits::default());
    let engine = LeadScoringEngine::new(store, Arc::clone(&sink), evaluator(), settings);
    Harness { engine, area, sink }
}

/// Engine sharing an existing area, as a second process would after a restart.
pub(super) fn engine_over(area: Arc<MemoryArea>) -> TestEngine {
    let store = memory_store(area, StoreLimits::default());
    LeadScoringEngine::new(
        store,
        Arc::new(RecordingSink::default()),
        evaluator(),
        EngineSettings::default(),
    )
}

/// Apply a sequence of bare triggers one minute apart, starting at `t0`.
pub(super) fn replay(
    engine: &TestEngine,
    id: &SessionId,
    triggers: &[TriggerKind],
) -> LeadProfile {
    let visit = campaign_visit();
    let mut last = None;
    for (offset, trigger) in triggers.iter().enumerate() {
        let profile = engine
            .apply_trigger_at(id, *trigger, TriggerMetadata::None, &visit, minutes(offset as i64))
            .expect("catalog trigger");
        last = Some(profile);
    }
    last.expect("at least one trigger")
}

#[derive(Default)]
pub(super) struct RecordingSink {
    events: Mutex<Vec<LeadEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<LeadEvent> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn deliver(&self, event: LeadEvent) -> Result<(), TelemetryError> {
        self.events.lock().expect("sink mutex poisoned").push(event);
        Ok(())
    }
}

pub(super) struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn deliver(&self, _event: LeadEvent) -> Result<(), TelemetryError> {
        Err(TelemetryError::Transport("collector unreachable".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl ProfileStore for UnavailableStore {
    fn load(&self, _id: &SessionId) -> Result<Option<LeadProfile>, StoreError> {
        Err(AreaError::Unavailable("storage disabled".to_string()).into())
    }

    fn save(&self, _profile: &LeadProfile) -> SaveOutcome {
        SaveOutcome::Dropped {
            reason: "storage disabled".to_string(),
        }
    }

    fn profiles(&self) -> Result<Vec<LeadProfile>, StoreError> {
        Err(AreaError::Unavailable("storage disabled".to_string()).into())
    }
}

/// Store whose first load reports that it started, then stalls before returning what it read.
pub(super) struct SlowLoadStore {
    inner: Arc<MemoryStore>,
    started: Mutex<Option<mpsc::Sender<()>>>,
}

impl SlowLoadStore {
    pub fn new(inner: Arc<MemoryStore>, started: mpsc::Sender<()>) -> Self {
        Self {
            inner,
            started: Mutex::new(Some(started)),
        }
    }
}

impl ProfileStore for SlowLoadStore {
    fn load(&self, id: &SessionId) -> Result<Option<LeadProfile>, StoreError> {
        let loaded = self.inner.load(id);
        let first = self.started.lock().expect("store mutex poisoned").take();
        if let Some(started) = first {
            started.send(()).expect("test is listening");
            thread::sleep(std::time::Duration::from_millis(50));
        }
        loaded
    }

    fn save(&self, profile: &LeadProfile) -> SaveOutcome {
        self.inner.save(profile)
    }

    fn profiles(&self) -> Result<Vec<LeadProfile>, StoreError> {
        self.inner.profiles()
    }
}

/// Yield until the sink has seen `expected` events or the budget runs out.
pub(super) async fn settle(sink: &RecordingSink, expected: usize) -> Vec<LeadEvent> {
    for _ in 0..100 {
        let events = sink.events();
        if events.len() >= expected {
            return events;
        }
        tokio::task::yield_now().await;
    }
    sink.events()
}

pub(super) fn router_for(engine: TestEngine) -> axum::Router {
    lead_router(Arc::new(engine), Arc::new(AssessmentRegistry::standard()))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
