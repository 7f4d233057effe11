use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Identifier wrapper for a browsing session. Assigned once, never reused for another visitor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of visitor actions the engine knows how to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PageView,
    ReturnVisit,
    TimeOnSite,
    ContentDownload,
    NewsletterSignup,
    ToolUsage,
    AssessmentCompleted,
    FormSubmitted,
    CompanyInfoProvided,
    EmailVerified,
    RegistrationComplete,
    WebinarRegistered,
    ConsultationRequested,
    ManualOverride,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 14] = [
        TriggerKind::PageView,
        TriggerKind::ReturnVisit,
        TriggerKind::TimeOnSite,
        TriggerKind::ContentDownload,
        TriggerKind::NewsletterSignup,
        TriggerKind::ToolUsage,
        TriggerKind::AssessmentCompleted,
        TriggerKind::FormSubmitted,
        TriggerKind::CompanyInfoProvided,
        TriggerKind::EmailVerified,
        TriggerKind::RegistrationComplete,
        TriggerKind::WebinarRegistered,
        TriggerKind::ConsultationRequested,
        TriggerKind::ManualOverride,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            TriggerKind::PageView => "page_view",
            TriggerKind::ReturnVisit => "return_visit",
            TriggerKind::TimeOnSite => "time_on_site",
            TriggerKind::ContentDownload => "content_download",
            TriggerKind::NewsletterSignup => "newsletter_signup",
            TriggerKind::ToolUsage => "tool_usage",
            TriggerKind::AssessmentCompleted => "assessment_completed",
            TriggerKind::FormSubmitted => "form_submitted",
            TriggerKind::CompanyInfoProvided => "company_info_provided",
            TriggerKind::EmailVerified => "email_verified",
            TriggerKind::RegistrationComplete => "registration_complete",
            TriggerKind::WebinarRegistered => "webinar_registered",
            TriggerKind::ConsultationRequested => "consultation_requested",
            TriggerKind::ManualOverride => "manual_override",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TriggerKind {
    type Err = ScoringError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.label() == wanted)
            .ok_or_else(|| ScoringError::UnknownTrigger(raw.to_string()))
    }
}

/// Evidence class a trigger contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Behavioral,
    Demographic,
    Firmographic,
    Engagement,
}

/// Ordered classification tiers. Declaration order is the progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Visitor,
    ColdLead,
    Candidate,
    HotLead,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 4] = [
        LeadStatus::Visitor,
        LeadStatus::ColdLead,
        LeadStatus::Candidate,
        LeadStatus::HotLead,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            LeadStatus::Visitor => "visitor",
            LeadStatus::ColdLead => "cold_lead",
            LeadStatus::Candidate => "candidate",
            LeadStatus::HotLead => "hot_lead",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.label() == wanted)
            .ok_or_else(|| format!("unknown lead status '{raw}'"))
    }
}

/// Known metadata shapes attached to a trigger, plus a generic bag for new producers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerMetadata {
    #[default]
    None,
    TimeOnSite {
        minutes: f64,
    },
    ToolUsage {
        tool_id: String,
        tool_name: String,
    },
    Assessment {
        tool_id: String,
        score: u8,
        tier: String,
    },
    Webinar {
        webinar_id: String,
    },
    Override {
        target: LeadStatus,
        previous: LeadStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Generic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiplier: Option<f64>,
        #[serde(default)]
        fields: BTreeMap<String, serde_json::Value>,
    },
}

impl TriggerMetadata {
    /// Scale applied to the catalog's base points. Never negative.
    pub fn multiplier(&self) -> f64 {
        let raw = match self {
            TriggerMetadata::TimeOnSite { minutes } => *minutes,
            TriggerMetadata::Generic {
                multiplier: Some(multiplier),
                ..
            } => *multiplier,
            _ => 1.0,
        };

        if raw.is_finite() && raw > 0.0 {
            raw
        } else {
            0.0
        }
    }
}

/// Referring context read once when a profile is first created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitContext {
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

/// Attribution snapshot frozen at profile creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub referrer: Option<String>,
    pub landing_page: Option<String>,
    pub query: BTreeMap<String, String>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl Attribution {
    /// Resolve the traffic source and attribution block from a visit.
    pub fn capture(visit: &VisitContext, now: DateTime<Utc>) -> (String, Attribution) {
        let source = visit
            .query
            .get("utm_source")
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .or_else(|| visit.referrer.as_deref().and_then(referrer_host))
            .unwrap_or_else(|| "direct".to_string());

        let attribution = Attribution {
            medium: visit.query.get("utm_medium").cloned(),
            campaign: visit.query.get("utm_campaign").cloned(),
            referrer: visit.referrer.clone(),
            landing_page: visit.page_url.clone(),
            query: visit.query.clone(),
            captured_at: Some(now),
        };

        (source, attribution)
    }
}

fn referrer_host(referrer: &str) -> Option<String> {
    let parsed = Url::parse(referrer.trim()).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.");

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// One scored visitor action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub trigger: TriggerKind,
    pub points: u32,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub metadata: TriggerMetadata,
}

/// Forecast recomputed after every trigger. Never edited by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predictions {
    pub conversion_probability: f64,
    pub time_to_conversion_days: u32,
    pub best_conversion_path: String,
    pub next_best_action: String,
    pub risk_of_churn: f64,
}

/// Where the latest manual override left the profile.
///
/// Kept on the profile itself so the rebase outlives the `manual_override` record once the
/// bounded activity log or a truncated write drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideAnchor {
    pub target: LeadStatus,
    /// Engagement score right after the override was applied.
    pub engagement_score: u32,
    pub at: DateTime<Utc>,
}

/// Per-session aggregate owned by the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadProfile {
    pub id: SessionId,
    pub status: LeadStatus,
    pub engagement_score: u32,
    pub behavioral_score: u32,
    pub demographic_score: u32,
    pub conversion_readiness: f64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub source: String,
    pub attribution: Attribution,
    pub activities: Vec<ActivityRecord>,
    pub predictions: Predictions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_anchor: Option<OverrideAnchor>,
}

impl LeadProfile {
    /// Fresh visitor profile with attribution captured from the visit.
    pub fn new(id: SessionId, visit: &VisitContext, now: DateTime<Utc>) -> Self {
        let (source, attribution) = Attribution::capture(visit, now);
        Self {
            id,
            status: LeadStatus::Visitor,
            engagement_score: 0,
            behavioral_score: 0,
            demographic_score: 0,
            conversion_readiness: 0.0,
            created_at: now,
            last_activity: now,
            source,
            attribution,
            activities: Vec::new(),
            predictions: Predictions::default(),
            override_anchor: None,
        }
    }

    /// Sum of points still present in the bounded activity window.
    pub fn retained_points(&self) -> u64 {
        self.activities
            .iter()
            .map(|activity| u64::from(activity.points))
            .sum()
    }

    pub fn summary_view(&self) -> LeadSummaryView {
        LeadSummaryView {
            session_id: self.id.clone(),
            known: true,
            status: self.status,
            engagement_score: self.engagement_score,
            behavioral_score: self.behavioral_score,
            demographic_score: self.demographic_score,
            conversion_readiness: self.conversion_readiness,
            activity_count: self.activities.len(),
            last_activity: Some(self.last_activity),
            predictions: Some(self.predictions.clone()),
        }
    }
}

/// Read model handed to consumers that only gate on status and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummaryView {
    pub session_id: SessionId,
    pub known: bool,
    pub status: LeadStatus,
    pub engagement_score: u32,
    pub behavioral_score: u32,
    pub demographic_score: u32,
    pub conversion_readiness: f64,
    pub activity_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Predictions>,
}

impl LeadSummaryView {
    /// Defaults a consumer sees before any trigger was recorded for the session.
    pub fn visitor_defaults(session_id: SessionId) -> Self {
        Self {
            session_id,
            known: false,
            status: LeadStatus::Visitor,
            engagement_score: 0,
            behavioral_score: 0,
            demographic_score: 0,
            conversion_readiness: 0.0,
            activity_count: 0,
            last_activity: None,
            predictions: None,
        }
    }
}

/// Errors surfaced by the scoring engine. Storage and telemetry failures never appear here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("unknown trigger '{0}'")]
    UnknownTrigger(String),
    #[error("trigger '{0}' is only accepted through the override endpoint")]
    ReservedTrigger(String),
    #[error("no assessment registered for tool '{0}'")]
    UnknownAssessment(String),
}
