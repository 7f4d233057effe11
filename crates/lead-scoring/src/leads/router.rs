use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use super::domain::{
    LeadStatus, LeadSummaryView, SessionId, TriggerKind, TriggerMetadata, VisitContext,
};
use super::events::EventSink;
use super::service::LeadScoringEngine;
use super::store::ProfileStore;
use crate::assessment::{AssessmentRegistry, Question, Response as AssessmentResponse, ScoreResult};
use crate::error::AppError;

/// Shared state for the lead routes.
pub struct LeadApiState<S, E> {
    pub engine: Arc<LeadScoringEngine<S, E>>,
    pub assessments: Arc<AssessmentRegistry>,
}

impl<S, E> Clone for LeadApiState<S, E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            assessments: Arc::clone(&self.assessments),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub trigger: String,
    #[serde(default)]
    pub metadata: TriggerMetadata,
    #[serde(default)]
    pub visit: VisitContext,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub status: LeadStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssessmentRequest {
    pub session_id: String,
    pub questions: Vec<Question>,
    pub responses: Vec<AssessmentResponse>,
    #[serde(default)]
    pub visit: VisitContext,
}

#[derive(Debug, Serialize)]
pub struct AssessmentOutcome {
    pub result: ScoreResult,
    pub lead: LeadSummaryView,
}

/// Router builder exposing the scoring engine over HTTP.
pub fn lead_router<S, E>(
    engine: Arc<LeadScoringEngine<S, E>>,
    assessments: Arc<AssessmentRegistry>,
) -> Router
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    Router::new()
        .route(
            "/api/v1/leads/:session_id",
            get(profile_handler::<S, E>),
        )
        .route(
            "/api/v1/leads/:session_id/triggers",
            post(trigger_handler::<S, E>),
        )
        .route(
            "/api/v1/leads/:session_id/override",
            post(override_handler::<S, E>),
        )
        .route(
            "/api/v1/reports/status-distribution",
            get(distribution_handler::<S, E>),
        )
        .route(
            "/api/v1/assessments/:tool_id",
            post(assessment_handler::<S, E>),
        )
        .with_state(LeadApiState {
            engine,
            assessments,
        })
}

/// Engine calls block on storage I/O and per-session locks, so they run off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await?)
}

pub(crate) async fn trigger_handler<S, E>(
    State(state): State<LeadApiState<S, E>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<TriggerRequest>,
) -> Result<Response, AppError>
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    let engine = Arc::clone(&state.engine);
    let session_id = SessionId(session_id);
    let profile = run_blocking(move || {
        engine.apply_named_trigger(
            &session_id,
            &request.trigger,
            request.metadata,
            &request.visit,
        )
    })
    .await??;
    Ok((StatusCode::OK, axum::Json(profile)).into_response())
}

pub(crate) async fn profile_handler<S, E>(
    State(state): State<LeadApiState<S, E>>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError>
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    let engine = Arc::clone(&state.engine);
    let session_id = SessionId(session_id);
    let view = run_blocking(move || match engine.current_profile(&session_id) {
        Some(profile) => profile.summary_view(),
        None => LeadSummaryView::visitor_defaults(session_id),
    })
    .await?;
    Ok((StatusCode::OK, axum::Json(view)).into_response())
}

pub(crate) async fn override_handler<S, E>(
    State(state): State<LeadApiState<S, E>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<OverrideRequest>,
) -> Result<Response, AppError>
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    let engine = Arc::clone(&state.engine);
    let session_id = SessionId(session_id);
    let profile = run_blocking(move || {
        engine.manual_status_override(&session_id, request.status, request.reason)
    })
    .await?;
    Ok((StatusCode::OK, axum::Json(profile)).into_response())
}

pub(crate) async fn distribution_handler<S, E>(
    State(state): State<LeadApiState<S, E>>,
) -> Result<Response, AppError>
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    let engine = Arc::clone(&state.engine);
    let distribution: BTreeMap<&'static str, usize> =
        run_blocking(move || engine.status_distribution())
            .await?
            .into_iter()
            .map(|(status, count)| (status.label(), count))
            .collect();
    Ok((StatusCode::OK, axum::Json(distribution)).into_response())
}

pub(crate) async fn assessment_handler<S, E>(
    State(state): State<LeadApiState<S, E>>,
    Path(tool_id): Path<String>,
    axum::Json(request): axum::Json<AssessmentRequest>,
) -> Result<Response, AppError>
where
    S: ProfileStore + 'static,
    E: EventSink,
{
    let result = state
        .assessments
        .score(&tool_id, &request.responses, &request.questions)?;

    let metadata = TriggerMetadata::Assessment {
        tool_id,
        score: result.score,
        tier: result.tier.label().to_string(),
    };
    let engine = Arc::clone(&state.engine);
    let session_id = SessionId(request.session_id);
    let visit = request.visit;
    let profile = run_blocking(move || {
        engine.apply_trigger(
            &session_id,
            TriggerKind::AssessmentCompleted,
            metadata,
            &visit,
        )
    })
    .await??;

    let outcome = AssessmentOutcome {
        result,
        lead: profile.summary_view(),
    };
    Ok((StatusCode::OK, axum::Json(outcome)).into_response())
}
