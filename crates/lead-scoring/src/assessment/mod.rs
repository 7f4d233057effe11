//! Stateless per-tool assessment scoring.
//!
//! Each assessment tool registers a plain function that turns answers into a 0–100 score and
//! tier. The lead engine only sees the completion trigger; these scores stay with the tool.

mod scorers;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::leads::ScoringError;

/// Question definition supplied by the assessment tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub max_value: u32,
    #[serde(default)]
    pub inverted: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// A visitor's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub question_id: String,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentTier {
    Emerging,
    Developing,
    Established,
    Advanced,
}

impl AssessmentTier {
    pub fn for_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => AssessmentTier::Advanced,
            60..=79 => AssessmentTier::Established,
            40..=59 => AssessmentTier::Developing,
            _ => AssessmentTier::Emerging,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AssessmentTier::Emerging => "emerging",
            AssessmentTier::Developing => "developing",
            AssessmentTier::Established => "established",
            AssessmentTier::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u8,
    pub tier: AssessmentTier,
    pub answered: usize,
}

pub type ScoreFn = fn(&[Response], &[Question]) -> ScoreResult;

/// Scoring functions keyed by tool id.
#[derive(Debug, Clone, Default)]
pub struct AssessmentRegistry {
    scorers: BTreeMap<String, ScoreFn>,
}

impl AssessmentRegistry {
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register("weighted_average", scorers::weighted_average);
        registry.register("burnout_check", scorers::burnout_check);
        registry.register("career_readiness", scorers::career_readiness);
        registry
    }

    pub fn register(&mut self, tool_id: impl Into<String>, scorer: ScoreFn) {
        self.scorers.insert(tool_id.into(), scorer);
    }

    pub fn tool_ids(&self) -> impl Iterator<Item = &str> {
        self.scorers.keys().map(String::as_str)
    }

    pub fn score(
        &self,
        tool_id: &str,
        responses: &[Response],
        questions: &[Question],
    ) -> Result<ScoreResult, ScoringError> {
        let scorer = self
            .scorers
            .get(tool_id)
            .ok_or_else(|| ScoringError::UnknownAssessment(tool_id.to_string()))?;
        Ok(scorer(responses, questions))
    }
}
