use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;
use lead_scoring::error::AppError;
use lead_scoring::leads::{
    points_for, DurableProfileStore, EngineSettings, LeadProfile, LeadScoringEngine, MemoryArea,
    NoopSink, SessionId, StoreLimits, TriggerKind, TriggerMetadata, VisitContext,
};

use crate::infra::standard_evaluator;

#[derive(Args, Debug)]
pub(crate) struct SimulateArgs {
    /// Comma-separated trigger names, applied in order
    #[arg(long, value_delimiter = ',', required = true)]
    pub(crate) triggers: Vec<TriggerKind>,
    /// Session identifier for the simulated visitor
    #[arg(long, default_value = "simulated-visitor")]
    pub(crate) session: String,
    /// Minutes applied to every time_on_site trigger
    #[arg(long, default_value_t = 1.0)]
    pub(crate) minutes_on_site: f64,
    /// Gap between consecutive triggers, in minutes
    #[arg(long, default_value_t = 5)]
    pub(crate) gap_minutes: i64,
    /// Print the final profile as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_simulation(args: SimulateArgs) -> Result<(), AppError> {
    let profile = simulate(&args)?;

    if args.json {
        match serde_json::to_string_pretty(&profile) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Profile could not be rendered as JSON: {err}"),
        }
        return Ok(());
    }

    let predictions = &profile.predictions;
    println!("\nFinal status: {}", profile.status);
    println!(
        "  Scores: engagement {} / behavioral {} / demographic {}",
        profile.engagement_score, profile.behavioral_score, profile.demographic_score
    );
    println!("  Conversion readiness: {:.1}", profile.conversion_readiness);
    println!(
        "  Conversion probability: {:.1}% (about {} days)",
        predictions.conversion_probability * 100.0,
        predictions.time_to_conversion_days
    );
    println!("  Best path: {}", predictions.best_conversion_path);
    println!("  Next best action: {}", predictions.next_best_action);
    Ok(())
}

fn metadata_for(trigger: TriggerKind, args: &SimulateArgs) -> TriggerMetadata {
    match trigger {
        TriggerKind::TimeOnSite => TriggerMetadata::TimeOnSite {
            minutes: args.minutes_on_site,
        },
        _ => TriggerMetadata::None,
    }
}

pub(crate) fn simulate(args: &SimulateArgs) -> Result<LeadProfile, AppError> {
    let evaluator = standard_evaluator();
    let store = DurableProfileStore::new(
        Arc::new(MemoryArea::unbounded()),
        Arc::clone(&evaluator),
        StoreLimits::default(),
    );
    let engine = LeadScoringEngine::new(
        Arc::new(store),
        Arc::new(NoopSink),
        evaluator,
        EngineSettings::default(),
    );

    let session = SessionId(args.session.clone());
    let visit = VisitContext::default();
    let start = Utc::now();

    if !args.json {
        println!("Simulating {} trigger(s) for session {session}", args.triggers.len());
    }

    let mut latest = None;
    for (step, trigger) in args.triggers.iter().copied().enumerate() {
        let metadata = metadata_for(trigger, args);
        let points = points_for(trigger, &metadata);
        let at = start + Duration::minutes(args.gap_minutes.saturating_mul(step as i64));
        let profile = engine.apply_trigger_at(&session, trigger, metadata, &visit, at)?;

        if !args.json {
            println!(
                "  {:>2}. {:<24} +{:<4} score {:<5} {}",
                step + 1,
                trigger.label(),
                points,
                profile.engagement_score,
                profile.status
            );
        }
        latest = Some(profile);
    }

    Ok(latest.unwrap_or_else(|| LeadProfile::new(session, &visit, start)))
}
