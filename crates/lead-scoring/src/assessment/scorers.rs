use std::collections::HashMap;

use super::{AssessmentTier, Question, Response, ScoreResult};

struct Blend {
    unanswered_as_zero: bool,
    invert_all: bool,
}

fn blend(responses: &[Response], questions: &[Question], blend: Blend) -> ScoreResult {
    let answers: HashMap<&str, u32> = responses
        .iter()
        .map(|response| (response.question_id.as_str(), response.value))
        .collect();

    let mut earned = 0.0;
    let mut possible = 0.0;
    let mut answered = 0;

    for question in questions {
        if question.max_value == 0 || !question.weight.is_finite() || question.weight <= 0.0 {
            continue;
        }

        let ratio = match answers.get(question.id.as_str()) {
            Some(value) => {
                answered += 1;
                let clamped = (*value).min(question.max_value);
                let ratio = f64::from(clamped) / f64::from(question.max_value);
                if question.inverted != blend.invert_all {
                    1.0 - ratio
                } else {
                    ratio
                }
            }
            None if blend.unanswered_as_zero => 0.0,
            None => continue,
        };

        earned += ratio * question.weight;
        possible += question.weight;
    }

    let score = if possible > 0.0 {
        ((earned / possible) * 100.0).round().clamp(0.0, 100.0) as u8
    } else {
        0
    };

    ScoreResult {
        score,
        tier: AssessmentTier::for_score(score),
        answered,
    }
}

pub(super) fn weighted_average(responses: &[Response], questions: &[Question]) -> ScoreResult {
    blend(
        responses,
        questions,
        Blend {
            unanswered_as_zero: false,
            invert_all: false,
        },
    )
}

/// Higher answers mean more strain, so the healthy end scores high.
pub(super) fn burnout_check(responses: &[Response], questions: &[Question]) -> ScoreResult {
    blend(
        responses,
        questions,
        Blend {
            unanswered_as_zero: false,
            invert_all: true,
        },
    )
}

pub(super) fn career_readiness(responses: &[Response], questions: &[Question]) -> ScoreResult {
    blend(
        responses,
        questions,
        Blend {
            unanswered_as_zero: true,
            invert_all: false,
        },
    )
}
