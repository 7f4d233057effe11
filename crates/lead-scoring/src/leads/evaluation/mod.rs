mod forecast;
mod readiness;

pub use forecast::{path_template, time_to_conversion_days, PathTemplate};
pub use readiness::ReadinessConfig;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::{LeadProfile, Predictions};
use super::policy::StatusPolicy;

/// Stateless evaluator recomputing the derived parts of a profile.
pub struct ProfileEvaluator {
    policy: Arc<StatusPolicy>,
    readiness: ReadinessConfig,
}

impl ProfileEvaluator {
    pub fn new(policy: Arc<StatusPolicy>, readiness: ReadinessConfig) -> Self {
        Self { policy, readiness }
    }

    pub fn policy(&self) -> &StatusPolicy {
        &self.policy
    }

    pub fn readiness(&self, profile: &LeadProfile, now: DateTime<Utc>) -> f64 {
        readiness::conversion_readiness(profile, &self.readiness, now)
    }

    pub fn predict(&self, profile: &LeadProfile, now: DateTime<Utc>) -> Predictions {
        forecast::predict(profile, &self.policy, now)
    }

    /// Refresh readiness and predictions from the current accumulators.
    pub fn refresh(&self, profile: &mut LeadProfile, now: DateTime<Utc>) {
        profile.conversion_readiness = self.readiness(profile, now);
        profile.predictions = self.predict(profile, now);
    }
}
