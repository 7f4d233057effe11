use serde::{Deserialize, Serialize};

use super::domain::{ActivityRecord, LeadStatus, OverrideAnchor, TriggerKind, TriggerMetadata};

/// Numeric window a status owns. `max_score` is inclusive and only bounds interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreWindow {
    pub min_score: u32,
    pub max_score: u32,
}

impl ScoreWindow {
    /// Position of `score` inside the window, clamped to `0.0..=1.0`.
    pub fn progress(&self, score: u32) -> f64 {
        if self.max_score <= self.min_score {
            return 1.0;
        }
        let span = f64::from(self.max_score - self.min_score);
        let offset = f64::from(score.saturating_sub(self.min_score));
        (offset / span).clamp(0.0, 1.0)
    }
}

/// Score threshold plus the triggers that must have fired at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusThreshold {
    pub status: LeadStatus,
    pub window: ScoreWindow,
    pub qualifying_triggers: Vec<TriggerKind>,
}

/// Score-only promotion used when the qualified rule for a status is not satisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub status: LeadStatus,
    pub min_score: u32,
}

/// Maps accumulated score and trigger history to a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPolicy {
    thresholds: Vec<StatusThreshold>,
    fallbacks: Vec<FallbackRule>,
}

impl StatusPolicy {
    /// Thresholds must be given in ascending status order starting at `Visitor`.
    pub fn new(thresholds: Vec<StatusThreshold>, fallbacks: Vec<FallbackRule>) -> Self {
        Self {
            thresholds,
            fallbacks,
        }
    }

    pub fn standard() -> Self {
        Self::new(
            vec![
                StatusThreshold {
                    status: LeadStatus::Visitor,
                    window: ScoreWindow {
                        min_score: 0,
                        max_score: 14,
                    },
                    qualifying_triggers: Vec::new(),
                },
                StatusThreshold {
                    status: LeadStatus::ColdLead,
                    window: ScoreWindow {
                        min_score: 15,
                        max_score: 74,
                    },
                    qualifying_triggers: Vec::new(),
                },
                StatusThreshold {
                    status: LeadStatus::Candidate,
                    window: ScoreWindow {
                        min_score: 75,
                        max_score: 149,
                    },
                    qualifying_triggers: vec![
                        TriggerKind::EmailVerified,
                        TriggerKind::RegistrationComplete,
                        TriggerKind::FormSubmitted,
                    ],
                },
                StatusThreshold {
                    status: LeadStatus::HotLead,
                    window: ScoreWindow {
                        min_score: 150,
                        max_score: 300,
                    },
                    qualifying_triggers: vec![
                        TriggerKind::WebinarRegistered,
                        TriggerKind::ConsultationRequested,
                    ],
                },
            ],
            vec![
                FallbackRule {
                    status: LeadStatus::Candidate,
                    min_score: 120,
                },
                FallbackRule {
                    status: LeadStatus::HotLead,
                    min_score: 250,
                },
            ],
        )
    }

    pub fn thresholds(&self) -> &[StatusThreshold] {
        &self.thresholds
    }

    pub fn window(&self, status: LeadStatus) -> ScoreWindow {
        self.thresholds
            .iter()
            .find(|threshold| threshold.status == status)
            .map(|threshold| threshold.window)
            .unwrap_or(ScoreWindow {
                min_score: 0,
                max_score: 0,
            })
    }

    /// Status for a score and trigger history, scanning from the highest tier down.
    ///
    /// An override anchor rebases the derivation. Its target becomes a floor and the score
    /// restarts at the target's minimum plus the points earned since the override. Only triggers
    /// recorded after the override count as qualifying.
    pub fn derive(
        &self,
        engagement_score: u32,
        activities: &[ActivityRecord],
        anchor: Option<&OverrideAnchor>,
    ) -> LeadStatus {
        let basis = StatusBasis::new(self, engagement_score, activities, anchor);

        let matched = self
            .thresholds
            .iter()
            .rev()
            .find(|threshold| self.qualifies(threshold, &basis))
            .map(|threshold| threshold.status)
            .unwrap_or(LeadStatus::Visitor);

        matched.max(basis.floor)
    }

    fn qualifies(&self, threshold: &StatusThreshold, basis: &StatusBasis<'_>) -> bool {
        if basis.score >= threshold.window.min_score
            && (threshold.qualifying_triggers.is_empty()
                || threshold
                    .qualifying_triggers
                    .iter()
                    .any(|trigger| basis.fired(*trigger)))
        {
            return true;
        }

        self.fallbacks
            .iter()
            .any(|rule| rule.status == threshold.status && basis.score >= rule.min_score)
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

struct StatusBasis<'a> {
    score: u32,
    history: &'a [ActivityRecord],
    floor: LeadStatus,
}

impl<'a> StatusBasis<'a> {
    fn new(
        policy: &StatusPolicy,
        engagement_score: u32,
        activities: &'a [ActivityRecord],
        anchor: Option<&OverrideAnchor>,
    ) -> Self {
        let Some(anchor) = anchor else {
            return Self {
                score: engagement_score,
                history: activities,
                floor: LeadStatus::Visitor,
            };
        };

        // Once the override record has left the log, everything retained is newer than it.
        let history = activities
            .iter()
            .rposition(|activity| {
                activity.trigger == TriggerKind::ManualOverride
                    && matches!(activity.metadata, TriggerMetadata::Override { .. })
            })
            .map_or(activities, |index| &activities[index + 1..]);
        let earned = engagement_score.saturating_sub(anchor.engagement_score);

        Self {
            score: policy.window(anchor.target).min_score.saturating_add(earned),
            history,
            floor: anchor.target,
        }
    }

    fn fired(&self, trigger: TriggerKind) -> bool {
        self.history
            .iter()
            .any(|activity| activity.trigger == trigger)
    }
}
