use std::sync::{mpsc, Arc};

use chrono::Duration;

use crate::leads::domain::{LeadStatus, ScoringError, TriggerKind, TriggerMetadata, VisitContext};
use crate::leads::service::{EngineSettings, LeadScoringEngine};
use crate::leads::store::{MemoryArea, StoreLimits};

use super::common::{
    campaign_visit, engine_over, evaluator, harness, harness_with, memory_store, minutes, replay,
    session, RecordingSink, SlowLoadStore, UnavailableStore,
};

#[test]
fn tool_usage_moves_visitor_to_cold_lead() {
    let harness = harness();
    let id = session("scenario-a");

    let profile = replay(&harness.engine, &id, &[TriggerKind::ToolUsage]);

    assert_eq!(profile.engagement_score, 20);
    assert_eq!(profile.behavioral_score, 20);
    assert_eq!(profile.status, LeadStatus::ColdLead);
    assert_eq!(profile.activities.len(), 1);
}

#[test]
fn verified_registration_reaches_candidate() {
    let harness = harness();
    let id = session("scenario-b");

    let profile = replay(
        &harness.engine,
        &id,
        &[TriggerKind::EmailVerified, TriggerKind::RegistrationComplete],
    );

    assert_eq!(profile.engagement_score, 125);
    assert_eq!(profile.demographic_score, 125);
    assert_eq!(profile.behavioral_score, 0);
    assert_eq!(profile.status, LeadStatus::Candidate);
}

#[test]
fn webinar_registration_reaches_hot_lead() {
    let harness = harness();
    let id = session("scenario-c");

    let profile = replay(
        &harness.engine,
        &id,
        &[
            TriggerKind::EmailVerified,
            TriggerKind::ContentDownload,
            TriggerKind::WebinarRegistered,
        ],
    );

    assert_eq!(profile.engagement_score, 160);
    assert_eq!(profile.behavioral_score, 55);
    assert_eq!(profile.demographic_score, 50);
    assert_eq!(profile.status, LeadStatus::HotLead);
}

#[test]
fn score_without_qualifiers_stops_at_fallback_tiers() {
    let harness = harness();
    let id = session("tool-only");

    let profile = replay(&harness.engine, &id, &[TriggerKind::ToolUsage; 8]);
    assert_eq!(profile.engagement_score, 160);
    assert_eq!(profile.status, LeadStatus::Candidate);

    let profile = replay(&harness.engine, &id, &[TriggerKind::ToolUsage; 5]);
    assert_eq!(profile.engagement_score, 260);
    assert_eq!(profile.status, LeadStatus::HotLead);
}

#[test]
fn unknown_trigger_is_rejected_without_side_effects() {
    let harness = harness();
    let id = session("scenario-d");

    let result = harness.engine.apply_named_trigger(
        &id,
        "telepathy",
        TriggerMetadata::None,
        &VisitContext::default(),
    );
    assert_eq!(
        result.map(|profile| profile.engagement_score),
        Err(ScoringError::UnknownTrigger("telepathy".to_string()))
    );
    assert!(harness.engine.current_profile(&id).is_none());
    assert_eq!(harness.area.usage(), 0);

    let before = replay(&harness.engine, &id, &[TriggerKind::PageView]);
    let rejected = harness.engine.apply_named_trigger(
        &id,
        "levitation",
        TriggerMetadata::None,
        &VisitContext::default(),
    );
    assert!(rejected.is_err());
    assert_eq!(harness.engine.current_profile(&id), Some(before));
}

#[test]
fn identical_sequences_produce_identical_profiles() {
    let sequence = [
        TriggerKind::PageView,
        TriggerKind::NewsletterSignup,
        TriggerKind::ToolUsage,
        TriggerKind::FormSubmitted,
        TriggerKind::ConsultationRequested,
    ];
    let id = session("replay");

    let first = replay(&harness().engine, &id, &sequence);
    let second = replay(&harness().engine, &id, &sequence);

    assert_eq!(first, second);
}

#[test]
fn score_and_status_never_decrease() {
    let harness = harness();
    let id = session("monotonic");
    let visit = campaign_visit();

    let mut last_score = 0;
    let mut last_status = LeadStatus::Visitor;
    for (offset, trigger) in TriggerKind::ALL
        .into_iter()
        .filter(|trigger| *trigger != TriggerKind::ManualOverride)
        .enumerate()
    {
        let profile = harness
            .engine
            .apply_trigger_at(&id, trigger, TriggerMetadata::None, &visit, minutes(offset as i64))
            .expect("catalog trigger");
        assert!(profile.engagement_score >= last_score, "{trigger}");
        assert!(profile.status >= last_status, "{trigger}");
        last_score = profile.engagement_score;
        last_status = profile.status;
    }
    assert_eq!(last_status, LeadStatus::HotLead);
}

#[test]
fn bounded_log_keeps_newest_and_score_keeps_everything() {
    let harness = harness_with(
        Arc::new(MemoryArea::unbounded()),
        EngineSettings {
            activity_retention: 3,
            ..EngineSettings::default()
        },
    );
    let id = session("bounded");

    let profile = replay(
        &harness.engine,
        &id,
        &[
            TriggerKind::PageView,
            TriggerKind::ReturnVisit,
            TriggerKind::ToolUsage,
            TriggerKind::EmailVerified,
            TriggerKind::FormSubmitted,
        ],
    );

    let kept: Vec<TriggerKind> = profile.activities.iter().map(|a| a.trigger).collect();
    assert_eq!(
        kept,
        vec![
            TriggerKind::ToolUsage,
            TriggerKind::EmailVerified,
            TriggerKind::FormSubmitted
        ]
    );
    assert_eq!(profile.engagement_score, 101);
    assert_eq!(profile.retained_points(), 95);
    assert!(u64::from(profile.engagement_score) >= profile.retained_points());
}

#[test]
fn status_survives_qualifier_aging_out_of_the_log() {
    let harness = harness_with(
        Arc::new(MemoryArea::unbounded()),
        EngineSettings {
            activity_retention: 2,
            ..EngineSettings::default()
        },
    );
    let id = session("aging");

    let profile = replay(
        &harness.engine,
        &id,
        &[
            TriggerKind::ToolUsage,
            TriggerKind::ToolUsage,
            TriggerKind::EmailVerified,
        ],
    );
    assert_eq!(profile.status, LeadStatus::Candidate);

    let profile = replay(
        &harness.engine,
        &id,
        &[TriggerKind::PageView, TriggerKind::PageView],
    );
    assert!(profile
        .activities
        .iter()
        .all(|activity| activity.trigger == TriggerKind::PageView));
    assert_eq!(profile.status, LeadStatus::Candidate);
}

#[test]
fn current_profile_is_stable_between_reads() {
    let harness = harness();
    let id = session("re-entry");
    replay(&harness.engine, &id, &[TriggerKind::ToolUsage]);

    let first = harness.engine.current_profile(&id);
    let second = harness.engine.current_profile(&id);
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[test]
fn second_engine_resumes_persisted_profile() {
    let harness = harness();
    let id = session("restart");
    replay(&harness.engine, &id, &[TriggerKind::ToolUsage]);

    let restarted = engine_over(Arc::clone(&harness.area));
    let loaded = restarted.current_profile(&id).expect("persisted profile");
    assert_eq!(loaded.engagement_score, 20);

    let profile = restarted
        .apply_trigger_at(
            &id,
            TriggerKind::PageView,
            TriggerMetadata::None,
            &VisitContext::default(),
            minutes(5),
        )
        .expect("page view");
    assert_eq!(profile.engagement_score, 21);
    assert_eq!(profile.activities.len(), 2);
}

#[test]
fn ensure_profile_creates_once() {
    let harness = harness();
    let id = session("ensure");

    let created = harness.engine.ensure_profile(&id, &campaign_visit());
    assert_eq!(created.status, LeadStatus::Visitor);
    assert_eq!(created.source, "newsletter");
    assert!(harness.area.usage() > 0);

    let again = harness.engine.ensure_profile(&id, &VisitContext::default());
    assert_eq!(again.created_at, created.created_at);
    assert_eq!(again.source, "newsletter");
}

#[test]
fn attribution_is_captured_on_first_visit_only() {
    let harness = harness();
    let id = session("attribution");
    replay(&harness.engine, &id, &[TriggerKind::PageView]);

    let later_visit = VisitContext {
        page_url: Some("https://example.org/pricing".to_string()),
        referrer: Some("https://www.search.example.com/?q=coaching".to_string()),
        ..VisitContext::default()
    };
    let profile = harness
        .engine
        .apply_trigger_at(
            &id,
            TriggerKind::ReturnVisit,
            TriggerMetadata::None,
            &later_visit,
            minutes(10),
        )
        .expect("return visit");

    assert_eq!(profile.source, "newsletter");
    assert_eq!(profile.attribution.medium.as_deref(), Some("email"));
    assert_eq!(
        profile.attribution.campaign.as_deref(),
        Some("autumn-webinar")
    );
    assert_eq!(profile.attribution.captured_at, Some(minutes(0)));
    assert_eq!(
        profile.activities[1].page_url.as_deref(),
        Some("https://example.org/pricing")
    );
}

#[test]
fn referrer_host_is_used_without_utm_source() {
    let harness = harness();
    let id = session("referred");
    let visit = VisitContext {
        referrer: Some("https://www.search.example.com/results?q=burnout".to_string()),
        ..VisitContext::default()
    };

    let profile = harness
        .engine
        .apply_trigger_at(&id, TriggerKind::PageView, TriggerMetadata::None, &visit, minutes(0))
        .expect("page view");
    assert_eq!(profile.source, "search.example.com");

    let direct = harness
        .engine
        .apply_trigger_at(
            &session("direct"),
            TriggerKind::PageView,
            TriggerMetadata::None,
            &VisitContext::default(),
            minutes(0),
        )
        .expect("page view");
    assert_eq!(direct.source, "direct");

    let malformed = harness
        .engine
        .apply_trigger_at(
            &session("malformed"),
            TriggerKind::PageView,
            TriggerMetadata::None,
            &VisitContext {
                referrer: Some("not a url".to_string()),
                ..VisitContext::default()
            },
            minutes(0),
        )
        .expect("page view");
    assert_eq!(malformed.source, "direct");
    assert_eq!(malformed.attribution.referrer.as_deref(), Some("not a url"));

    let with_port = harness
        .engine
        .apply_trigger_at(
            &session("ported"),
            TriggerKind::PageView,
            TriggerMetadata::None,
            &VisitContext {
                referrer: Some("http://user@Partner.Example.org:8080/deal".to_string()),
                ..VisitContext::default()
            },
            minutes(0),
        )
        .expect("page view");
    assert_eq!(with_port.source, "partner.example.org");
}

#[test]
fn override_promotes_and_demotes() {
    let harness = harness();
    let id = session("override");

    let promoted = harness.engine.manual_status_override_at(
        &id,
        LeadStatus::HotLead,
        Some("booked by phone".to_string()),
        minutes(0),
    );
    assert_eq!(promoted.status, LeadStatus::HotLead);
    assert_eq!(promoted.engagement_score, 150);
    let record = promoted.activities.last().expect("override record");
    assert_eq!(record.trigger, TriggerKind::ManualOverride);
    assert_eq!(record.points, 150);
    assert_eq!(
        record.metadata,
        TriggerMetadata::Override {
            target: LeadStatus::HotLead,
            previous: LeadStatus::Visitor,
            reason: Some("booked by phone".to_string()),
        }
    );

    let demoted =
        harness
            .engine
            .manual_status_override_at(&id, LeadStatus::ColdLead, None, minutes(1));
    assert_eq!(demoted.status, LeadStatus::ColdLead);
    assert_eq!(demoted.engagement_score, 150);

    let after = harness
        .engine
        .apply_trigger_at(
            &id,
            TriggerKind::ToolUsage,
            TriggerMetadata::None,
            &VisitContext::default(),
            minutes(2),
        )
        .expect("tool usage");
    assert_eq!(after.engagement_score, 170);
    assert_eq!(after.status, LeadStatus::ColdLead);
}

#[test]
fn override_metadata_on_a_trigger_takes_the_override_path() {
    let harness = harness();
    let id = session("override-trigger");

    let profile = harness
        .engine
        .apply_trigger_at(
            &id,
            TriggerKind::ManualOverride,
            TriggerMetadata::Override {
                target: LeadStatus::Candidate,
                previous: LeadStatus::Visitor,
                reason: None,
            },
            &VisitContext::default(),
            minutes(0),
        )
        .expect("override");

    assert_eq!(profile.status, LeadStatus::Candidate);
    assert_eq!(profile.engagement_score, 75);
}

#[test]
fn named_override_trigger_is_refused() {
    let harness = harness();
    let id = session("sneaky");

    let refused = harness.engine.apply_named_trigger(
        &id,
        "manual_override",
        TriggerMetadata::Override {
            target: LeadStatus::HotLead,
            previous: LeadStatus::Visitor,
            reason: None,
        },
        &VisitContext::default(),
    );

    assert_eq!(
        refused,
        Err(ScoringError::ReservedTrigger("manual_override".to_string()))
    );
    assert!(harness.engine.current_profile(&id).is_none());
}

#[test]
fn demotion_holds_after_the_override_leaves_the_activity_log() {
    let harness = harness_with(
        Arc::new(MemoryArea::unbounded()),
        EngineSettings {
            activity_retention: 2,
            ..EngineSettings::default()
        },
    );
    let id = session("aged-override");

    harness
        .engine
        .manual_status_override_at(&id, LeadStatus::HotLead, None, minutes(0));
    harness
        .engine
        .manual_status_override_at(&id, LeadStatus::ColdLead, None, minutes(1));

    let mut profile = None;
    for offset in 2..5 {
        profile = Some(
            harness
                .engine
                .apply_trigger_at(
                    &id,
                    TriggerKind::PageView,
                    TriggerMetadata::None,
                    &VisitContext::default(),
                    minutes(offset),
                )
                .expect("page view"),
        );
    }
    let profile = profile.expect("page views applied");

    assert!(profile
        .activities
        .iter()
        .all(|activity| activity.trigger == TriggerKind::PageView));
    assert_eq!(profile.engagement_score, 153);
    assert_eq!(profile.status, LeadStatus::ColdLead);
}

#[test]
fn demotion_survives_truncated_persistence_and_restart() {
    let harness = harness();
    let id = session("demoted");
    let visit = VisitContext::default();

    harness
        .engine
        .manual_status_override_at(&id, LeadStatus::HotLead, None, minutes(0));
    let demoted = harness.engine.manual_status_override_at(
        &id,
        LeadStatus::ColdLead,
        Some("duplicate account".to_string()),
        minutes(1),
    );
    assert_eq!(demoted.engagement_score, 150);

    for offset in 0..51 {
        let profile = harness
            .engine
            .apply_trigger_at(
                &id,
                TriggerKind::PageView,
                TriggerMetadata::None,
                &visit,
                minutes(2 + offset),
            )
            .expect("page view");
        assert_eq!(profile.status, LeadStatus::ColdLead);
    }

    let restarted = engine_over(Arc::clone(&harness.area));
    let reloaded = restarted.current_profile(&id).expect("persisted profile");
    assert_eq!(reloaded.engagement_score, 201);
    assert_eq!(reloaded.activities.len(), 50);
    assert!(reloaded
        .activities
        .iter()
        .all(|activity| activity.trigger != TriggerKind::ManualOverride));
    assert_eq!(
        reloaded
            .override_anchor
            .map(|anchor| (anchor.target, anchor.engagement_score)),
        Some((LeadStatus::ColdLead, 150))
    );

    let after = restarted
        .apply_trigger_at(
            &id,
            TriggerKind::PageView,
            TriggerMetadata::None,
            &visit,
            minutes(60),
        )
        .expect("page view");
    assert_eq!(after.engagement_score, 202);
    assert_eq!(after.status, LeadStatus::ColdLead);
}

#[test]
fn full_storage_keeps_serving_from_memory() {
    let area = Arc::new(MemoryArea::with_quota(0));
    let harness = harness_with(Arc::clone(&area), EngineSettings::default());
    let id = session("scenario-e");

    let profile = replay(&harness.engine, &id, &[TriggerKind::ToolUsage]);
    assert_eq!(profile.status, LeadStatus::ColdLead);
    assert_eq!(area.usage(), 0);
    assert_eq!(
        harness
            .engine
            .current_profile(&id)
            .map(|profile| profile.engagement_score),
        Some(20)
    );

    area.set_quota(None);
    let profile = harness
        .engine
        .apply_trigger_at(
            &id,
            TriggerKind::PageView,
            TriggerMetadata::None,
            &VisitContext::default(),
            minutes(3),
        )
        .expect("page view");
    assert_eq!(profile.engagement_score, 21);

    let restarted = engine_over(area);
    assert_eq!(
        restarted
            .current_profile(&id)
            .map(|profile| profile.engagement_score),
        Some(21)
    );
}

#[test]
fn unavailable_store_does_not_block_scoring() {
    let engine = LeadScoringEngine::new(
        Arc::new(UnavailableStore),
        Arc::new(RecordingSink::default()),
        evaluator(),
        EngineSettings::default(),
    );
    let id = session("offline");

    let profile = engine
        .apply_trigger_at(
            &id,
            TriggerKind::ToolUsage,
            TriggerMetadata::None,
            &VisitContext::default(),
            minutes(0),
        )
        .expect("tool usage");
    assert_eq!(profile.status, LeadStatus::ColdLead);

    let distribution = engine.status_distribution();
    assert_eq!(distribution.get(&LeadStatus::ColdLead), Some(&1));
}

#[test]
fn readiness_and_predictions_follow_the_profile() {
    let harness = harness();
    let id = session("forecast");

    let profile = replay(
        &harness.engine,
        &id,
        &[TriggerKind::EmailVerified, TriggerKind::RegistrationComplete],
    );

    assert_eq!(profile.conversion_readiness, 56.0);
    assert_eq!(profile.predictions.conversion_probability, 0.503);
    assert_eq!(profile.predictions.time_to_conversion_days, 7);
    assert_eq!(
        profile.predictions.next_best_action,
        "send webinar invitation"
    );
    assert_eq!(profile.predictions.risk_of_churn, 0.0);

    let evaluator = harness.engine.evaluator();
    let later = profile.last_activity + Duration::hours(84);
    assert_eq!(evaluator.readiness(&profile, later), 50.0);
    assert_eq!(evaluator.predict(&profile, later).risk_of_churn, 0.5);
    assert_eq!(
        evaluator
            .predict(&profile, profile.last_activity + Duration::days(10))
            .risk_of_churn,
        1.0
    );
}

#[test]
fn readiness_is_capped_at_one_hundred() {
    let harness = harness();
    let id = session("saturated");

    let profile = replay(
        &harness.engine,
        &id,
        &[
            TriggerKind::RegistrationComplete,
            TriggerKind::EmailVerified,
            TriggerKind::ConsultationRequested,
            TriggerKind::WebinarRegistered,
            TriggerKind::ToolUsage,
            TriggerKind::ToolUsage,
            TriggerKind::AssessmentCompleted,
        ],
    );

    assert_eq!(profile.conversion_readiness, 100.0);
    assert_eq!(profile.status, LeadStatus::HotLead);
    assert!(profile.predictions.conversion_probability <= 0.9);
}

#[test]
fn distribution_counts_every_status() {
    let harness = harness();
    replay(&harness.engine, &session("a"), &[TriggerKind::ToolUsage]);
    replay(
        &harness.engine,
        &session("b"),
        &[TriggerKind::EmailVerified, TriggerKind::RegistrationComplete],
    );
    replay(&harness.engine, &session("c"), &[TriggerKind::PageView]);

    let distribution = harness.engine.status_distribution();
    assert_eq!(distribution.get(&LeadStatus::Visitor), Some(&1));
    assert_eq!(distribution.get(&LeadStatus::ColdLead), Some(&1));
    assert_eq!(distribution.get(&LeadStatus::Candidate), Some(&1));
    assert_eq!(distribution.get(&LeadStatus::HotLead), Some(&0));

    let restarted = engine_over(Arc::clone(&harness.area));
    assert_eq!(restarted.status_distribution(), distribution);
}

#[test]
fn concurrent_triggers_on_one_session_are_not_lost() {
    let harness = harness();
    let id = session("concurrent");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..10 {
                    harness
                        .engine
                        .apply_trigger(
                            &id,
                            TriggerKind::ToolUsage,
                            TriggerMetadata::None,
                            &VisitContext::default(),
                        )
                        .expect("tool usage");
                }
            });
        }
    });

    let profile = harness.engine.current_profile(&id).expect("profile");
    assert_eq!(profile.engagement_score, 800);
    assert_eq!(profile.activities.len(), 40);
}

#[test]
fn cold_read_does_not_overwrite_a_concurrent_write() {
    let area = Arc::new(MemoryArea::unbounded());
    let id = session("read-write");
    replay(&engine_over(Arc::clone(&area)), &id, &[TriggerKind::ToolUsage]);

    let (started_tx, started_rx) = mpsc::channel();
    let store = Arc::new(SlowLoadStore::new(
        memory_store(area, StoreLimits::default()),
        started_tx,
    ));
    let engine = LeadScoringEngine::new(
        store,
        Arc::new(RecordingSink::default()),
        evaluator(),
        EngineSettings::default(),
    );
    let (engine, id) = (&engine, &id);

    std::thread::scope(|scope| {
        scope.spawn(move || engine.current_profile(id));
        scope.spawn(move || {
            started_rx.recv().expect("reader began loading");
            for _ in 0..2 {
                engine
                    .apply_trigger(
                        id,
                        TriggerKind::ToolUsage,
                        TriggerMetadata::None,
                        &VisitContext::default(),
                    )
                    .expect("tool usage");
            }
        });
    });

    let profile = engine.current_profile(id).expect("profile");
    assert_eq!(profile.engagement_score, 60);
    assert_eq!(profile.activities.len(), 3);
}

#[test]
fn idle_sessions_release_their_locks() {
    let harness = harness();
    replay(&harness.engine, &session("one"), &[TriggerKind::PageView]);
    harness.engine.current_profile(&session("two"));
    harness
        .engine
        .ensure_profile(&session("three"), &VisitContext::default());
    harness
        .engine
        .manual_status_override_at(&session("four"), LeadStatus::Candidate, None, minutes(0));

    let (locks, cached) = harness.engine.tracked_sessions();
    assert_eq!(locks, 0);
    assert_eq!(cached, 3);
}

#[test]
fn cache_drops_the_stalest_persisted_profile_beyond_capacity() {
    let harness = harness_with(
        Arc::new(MemoryArea::unbounded()),
        EngineSettings {
            cache_capacity: 2,
            ..EngineSettings::default()
        },
    );

    for (offset, name) in ["a", "b", "c"].into_iter().enumerate() {
        harness
            .engine
            .apply_trigger_at(
                &session(name),
                TriggerKind::ToolUsage,
                TriggerMetadata::None,
                &VisitContext::default(),
                minutes(offset as i64),
            )
            .expect("tool usage");
    }
    assert_eq!(harness.engine.tracked_sessions(), (0, 2));

    let reloaded = harness
        .engine
        .current_profile(&session("a"))
        .expect("persisted profile");
    assert_eq!(reloaded.engagement_score, 20);
    assert_eq!(harness.engine.tracked_sessions(), (0, 2));

    let distribution = harness.engine.status_distribution();
    assert_eq!(distribution.get(&LeadStatus::ColdLead), Some(&3));
}

#[test]
fn unpersisted_profiles_stay_cached_beyond_capacity() {
    let harness = harness_with(
        Arc::new(MemoryArea::with_quota(0)),
        EngineSettings {
            cache_capacity: 1,
            ..EngineSettings::default()
        },
    );

    replay(&harness.engine, &session("first"), &[TriggerKind::ToolUsage]);
    replay(&harness.engine, &session("second"), &[TriggerKind::ToolUsage]);

    assert_eq!(harness.engine.tracked_sessions(), (0, 2));
    assert_eq!(
        harness
            .engine
            .current_profile(&session("first"))
            .map(|profile| profile.engagement_score),
        Some(20)
    );
}
