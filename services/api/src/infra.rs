use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use lead_scoring::config::{ScoringConfig, TelemetryConfig};
use lead_scoring::error::AppError;
use lead_scoring::leads::{
    AreaError, DurableProfileStore, EventSink, HttpEventSink, KeyValueArea, LeadEvent,
    LeadScoringEngine, MemoryArea, NoopSink, ProfileEvaluator, ReadinessConfig, SqliteArea,
    StatusPolicy, TelemetryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Storage backend picked from configuration.
pub(crate) enum ConfiguredArea {
    Memory(MemoryArea),
    Sqlite(SqliteArea),
}

impl KeyValueArea for ConfiguredArea {
    fn get(&self, key: &str) -> Result<Option<String>, AreaError> {
        match self {
            ConfiguredArea::Memory(area) => area.get(key),
            ConfiguredArea::Sqlite(area) => area.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AreaError> {
        match self {
            ConfiguredArea::Memory(area) => area.set(key, value),
            ConfiguredArea::Sqlite(area) => area.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<(), AreaError> {
        match self {
            ConfiguredArea::Memory(area) => area.remove(key),
            ConfiguredArea::Sqlite(area) => area.remove(key),
        }
    }

    fn keys(&self) -> Result<Vec<String>, AreaError> {
        match self {
            ConfiguredArea::Memory(area) => area.keys(),
            ConfiguredArea::Sqlite(area) => area.keys(),
        }
    }
}

/// Event sink picked from configuration.
pub(crate) enum ConfiguredSink {
    Noop(NoopSink),
    Http(HttpEventSink),
}

#[async_trait]
impl EventSink for ConfiguredSink {
    async fn deliver(&self, event: LeadEvent) -> Result<(), TelemetryError> {
        match self {
            ConfiguredSink::Noop(sink) => sink.deliver(event).await,
            ConfiguredSink::Http(sink) => sink.deliver(event).await,
        }
    }
}

pub(crate) type ConfiguredStore = DurableProfileStore<ConfiguredArea>;
pub(crate) type ConfiguredEngine = LeadScoringEngine<ConfiguredStore, ConfiguredSink>;

pub(crate) fn standard_evaluator() -> Arc<ProfileEvaluator> {
    Arc::new(ProfileEvaluator::new(
        Arc::new(StatusPolicy::standard()),
        ReadinessConfig::default(),
    ))
}

pub(crate) fn build_area(config: &ScoringConfig) -> Result<ConfiguredArea, AppError> {
    let area = match &config.storage_path {
        Some(path) => {
            info!(path = %path.display(), "opening sqlite profile area");
            ConfiguredArea::Sqlite(SqliteArea::open(path, Some(config.storage_quota_bytes))?)
        }
        None => ConfiguredArea::Memory(MemoryArea::with_quota(config.storage_quota_bytes)),
    };
    Ok(area)
}

pub(crate) fn build_sink(config: &TelemetryConfig) -> ConfiguredSink {
    match &config.collector_endpoint {
        Some(endpoint) => {
            info!(%endpoint, "forwarding lead events to collector");
            ConfiguredSink::Http(HttpEventSink::new(
                endpoint.clone(),
                config.collector_timeout,
            ))
        }
        None => ConfiguredSink::Noop(NoopSink),
    }
}

pub(crate) fn build_engine(
    scoring: &ScoringConfig,
    telemetry: &TelemetryConfig,
) -> Result<ConfiguredEngine, AppError> {
    let evaluator = standard_evaluator();
    let store = DurableProfileStore::new(
        Arc::new(build_area(scoring)?),
        Arc::clone(&evaluator),
        scoring.store_limits(),
    );

    Ok(LeadScoringEngine::new(
        Arc::new(store),
        Arc::new(build_sink(telemetry)),
        evaluator,
        scoring.engine_settings(),
    ))
}
