use chrono::{DateTime, Utc};

use super::super::domain::{LeadProfile, LeadStatus, Predictions};
use super::super::policy::StatusPolicy;

const SECONDS_PER_DAY: f64 = 86_400.0;
const CHURN_HORIZON_DAYS: f64 = 7.0;

/// Curated recommendation for a status tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTemplate {
    pub best_conversion_path: &'static str,
    pub next_best_action: &'static str,
}

pub fn path_template(status: LeadStatus) -> PathTemplate {
    match status {
        LeadStatus::Visitor => PathTemplate {
            best_conversion_path: "free tools -> email capture -> nurture sequence",
            next_best_action: "offer a free assessment tool",
        },
        LeadStatus::ColdLead => PathTemplate {
            best_conversion_path: "educational content -> email verification -> registration",
            next_best_action: "invite to verify email for personalized results",
        },
        LeadStatus::Candidate => PathTemplate {
            best_conversion_path: "webinar invitation -> live session -> consultation",
            next_best_action: "send webinar invitation",
        },
        LeadStatus::HotLead => PathTemplate {
            best_conversion_path: "consultation call -> tailored offer -> enrollment",
            next_best_action: "schedule a consultation call",
        },
    }
}

fn probability_band(status: LeadStatus) -> (f64, f64) {
    match status {
        LeadStatus::Visitor => (0.02, 0.10),
        LeadStatus::ColdLead => (0.10, 0.30),
        LeadStatus::Candidate => (0.30, 0.60),
        LeadStatus::HotLead => (0.60, 0.90),
    }
}

/// Higher probability maps to fewer days.
pub fn time_to_conversion_days(probability: f64) -> u32 {
    if probability >= 0.75 {
        3
    } else if probability >= 0.5 {
        7
    } else if probability >= 0.3 {
        14
    } else if probability >= 0.1 {
        30
    } else {
        60
    }
}

fn risk_of_churn(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let idle_seconds = (now - last_activity).num_seconds().max(0) as f64;
    (idle_seconds / SECONDS_PER_DAY / CHURN_HORIZON_DAYS).min(1.0)
}

pub(crate) fn predict(profile: &LeadProfile, policy: &StatusPolicy, now: DateTime<Utc>) -> Predictions {
    let (low, high) = probability_band(profile.status);
    let progress = policy.window(profile.status).progress(profile.engagement_score);
    let conversion_probability = ((low + (high - low) * progress) * 1000.0).round() / 1000.0;
    let template = path_template(profile.status);

    Predictions {
        conversion_probability,
        time_to_conversion_days: time_to_conversion_days(conversion_probability),
        best_conversion_path: template.best_conversion_path.to_string(),
        next_best_action: template.next_best_action.to_string(),
        risk_of_churn: risk_of_churn(profile.last_activity, now),
    }
}
