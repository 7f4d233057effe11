use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::LeadProfile;

/// Caps and ceilings for the conversion-readiness blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub engagement_ceiling: u32,
    pub engagement_cap: f64,
    pub demographic_ceiling: u32,
    pub demographic_cap: f64,
    pub behavioral_ceiling: u32,
    pub behavioral_cap: f64,
    pub recency_window_hours: i64,
    pub recency_points_per_activity: f64,
    pub recency_cap: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            engagement_ceiling: 200,
            engagement_cap: 40.0,
            demographic_ceiling: 100,
            demographic_cap: 25.0,
            behavioral_ceiling: 100,
            behavioral_cap: 20.0,
            recency_window_hours: 24,
            recency_points_per_activity: 3.0,
            recency_cap: 15.0,
        }
    }
}

fn ramp(score: u32, ceiling: u32, cap: f64) -> f64 {
    if ceiling == 0 {
        return cap;
    }
    (f64::from(score) / f64::from(ceiling)).min(1.0) * cap
}

pub(crate) fn conversion_readiness(
    profile: &LeadProfile,
    config: &ReadinessConfig,
    now: DateTime<Utc>,
) -> f64 {
    let engagement = ramp(
        profile.engagement_score,
        config.engagement_ceiling,
        config.engagement_cap,
    );
    let demographic = ramp(
        profile.demographic_score,
        config.demographic_ceiling,
        config.demographic_cap,
    );
    let behavioral = ramp(
        profile.behavioral_score,
        config.behavioral_ceiling,
        config.behavioral_cap,
    );

    let cutoff = now - Duration::hours(config.recency_window_hours);
    let recent = profile
        .activities
        .iter()
        .filter(|activity| activity.timestamp > cutoff && activity.timestamp <= now)
        .count();
    let recency = (recent as f64 * config.recency_points_per_activity).min(config.recency_cap);

    let total = (engagement + demographic + behavioral + recency).min(100.0);
    (total * 10.0).round() / 10.0
}
