use serde::Serialize;

use super::domain::{Category, ScoringError, TriggerKind, TriggerMetadata};

/// Static scoring entry for one trigger kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngagementAction {
    pub trigger: TriggerKind,
    pub points: u32,
    pub weight: f32,
    pub category: Category,
}

const fn action(trigger: TriggerKind, points: u32, weight: f32, category: Category) -> EngagementAction {
    EngagementAction {
        trigger,
        points,
        weight,
        category,
    }
}

static PAGE_VIEW: EngagementAction = action(TriggerKind::PageView, 1, 0.2, Category::Behavioral);
static RETURN_VISIT: EngagementAction =
    action(TriggerKind::ReturnVisit, 5, 0.4, Category::Behavioral);
// Points per minute; the metadata carries the minute count as multiplier.
static TIME_ON_SITE: EngagementAction =
    action(TriggerKind::TimeOnSite, 2, 0.3, Category::Engagement);
static CONTENT_DOWNLOAD: EngagementAction =
    action(TriggerKind::ContentDownload, 10, 0.5, Category::Engagement);
static NEWSLETTER_SIGNUP: EngagementAction =
    action(TriggerKind::NewsletterSignup, 15, 0.5, Category::Engagement);
static TOOL_USAGE: EngagementAction = action(TriggerKind::ToolUsage, 20, 0.6, Category::Behavioral);
static ASSESSMENT_COMPLETED: EngagementAction =
    action(TriggerKind::AssessmentCompleted, 30, 0.7, Category::Behavioral);
static FORM_SUBMITTED: EngagementAction =
    action(TriggerKind::FormSubmitted, 25, 0.6, Category::Demographic);
static COMPANY_INFO_PROVIDED: EngagementAction =
    action(TriggerKind::CompanyInfoProvided, 30, 0.6, Category::Firmographic);
static EMAIL_VERIFIED: EngagementAction =
    action(TriggerKind::EmailVerified, 50, 0.8, Category::Demographic);
static REGISTRATION_COMPLETE: EngagementAction =
    action(TriggerKind::RegistrationComplete, 75, 0.9, Category::Demographic);
static WEBINAR_REGISTERED: EngagementAction =
    action(TriggerKind::WebinarRegistered, 100, 1.0, Category::Engagement);
static CONSULTATION_REQUESTED: EngagementAction =
    action(TriggerKind::ConsultationRequested, 120, 1.0, Category::Engagement);
// Base of zero: override points are computed from the score gap to the target tier.
static MANUAL_OVERRIDE: EngagementAction =
    action(TriggerKind::ManualOverride, 0, 1.0, Category::Engagement);

/// Catalog entry for a trigger. Exhaustive over the enum, so it cannot fail.
pub fn action_for(trigger: TriggerKind) -> &'static EngagementAction {
    match trigger {
        TriggerKind::PageView => &PAGE_VIEW,
        TriggerKind::ReturnVisit => &RETURN_VISIT,
        TriggerKind::TimeOnSite => &TIME_ON_SITE,
        TriggerKind::ContentDownload => &CONTENT_DOWNLOAD,
        TriggerKind::NewsletterSignup => &NEWSLETTER_SIGNUP,
        TriggerKind::ToolUsage => &TOOL_USAGE,
        TriggerKind::AssessmentCompleted => &ASSESSMENT_COMPLETED,
        TriggerKind::FormSubmitted => &FORM_SUBMITTED,
        TriggerKind::CompanyInfoProvided => &COMPANY_INFO_PROVIDED,
        TriggerKind::EmailVerified => &EMAIL_VERIFIED,
        TriggerKind::RegistrationComplete => &REGISTRATION_COMPLETE,
        TriggerKind::WebinarRegistered => &WEBINAR_REGISTERED,
        TriggerKind::ConsultationRequested => &CONSULTATION_REQUESTED,
        TriggerKind::ManualOverride => &MANUAL_OVERRIDE,
    }
}

/// Resolve a wire name to its catalog entry.
pub fn resolve(name: &str) -> Result<&'static EngagementAction, ScoringError> {
    let trigger: TriggerKind = name.parse()?;
    Ok(action_for(trigger))
}

/// Points awarded for one application of `trigger` with the given metadata.
pub fn points_for(trigger: TriggerKind, metadata: &TriggerMetadata) -> u32 {
    let base = f64::from(action_for(trigger).points);
    let scaled = (base * metadata.multiplier()).round();
    scaled.min(f64::from(u32::MAX)) as u32
}

/// Split of awarded points into the per-category accumulators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryShare {
    pub behavioral: u32,
    pub demographic: u32,
}

/// Engagement-category actions count as half-weight behavioral evidence.
pub fn category_share(category: Category, points: u32) -> CategoryShare {
    match category {
        Category::Behavioral => CategoryShare {
            behavioral: points,
            demographic: 0,
        },
        Category::Demographic | Category::Firmographic => CategoryShare {
            behavioral: 0,
            demographic: points,
        },
        Category::Engagement => CategoryShare {
            behavioral: points / 2,
            demographic: 0,
        },
    }
}
