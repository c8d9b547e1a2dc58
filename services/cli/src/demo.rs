use chrono::{Datelike, NaiveDate};
use clap::Args;
use kpi_engine::config::{AppConfig, FiscalYear, ThresholdConfig};
use kpi_engine::eligibility::{
    Classifier, ProgramKind, ScenarioSpec, ScenarioSynthesizer, SuggestionEngine, WorkingSet,
};
use kpi_engine::error::AppError;

use crate::infra::{render_outcomes, render_suggestions};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Calendar year the demo fiscal year starts in (defaults to the configured fiscal year)
    #[arg(long)]
    pub(crate) year: Option<i32>,
    /// Skip the suggestion pass
    #[arg(long)]
    pub(crate) skip_suggestions: bool,
}

pub(crate) fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        year,
        skip_suggestions,
    } = args;

    let fiscal_year = year.map_or(config.thresholds.fiscal_year, FiscalYear::starting);
    let thresholds = ThresholdConfig {
        fiscal_year,
        ..config.thresholds.clone()
    };

    println!("KPI eligibility demo ({})", fiscal_year.window());

    let scenarios = demo_scenarios(fiscal_year.start.year());
    let bundle = ScenarioSynthesizer::new(fiscal_year)
        .with_run_tag("DEMO")
        .generate(&scenarios)?;

    println!("\nSynthesized scenarios");
    for row in &bundle.aggregate_rows {
        println!(
            "- {} ({}): frailty {} | {} in-person | {} remote | {} contact(s)",
            row.scenario_id,
            row.patient_id,
            row.frailty_score,
            row.in_person_events,
            row.remote_events,
            row.encounters
        );
    }

    let mut working_set = WorkingSet::new();
    working_set.absorb(bundle);

    let classifier = Classifier::new(thresholds, config.cutoffs);
    let outcomes = classifier.classify_all(&mut working_set);
    println!();
    render_outcomes(&outcomes);

    if !skip_suggestions {
        let engine = SuggestionEngine::new(classifier, config.suggestions);
        println!();
        render_suggestions(&engine.suggest(&working_set, fiscal_year.window()));
    }

    Ok(())
}

fn demo_scenarios(year: i32) -> Vec<ScenarioSpec> {
    let on = |month: u32, day: u32| NaiveDate::from_ymd_opt(year, month, day);

    let mut robust = ScenarioSpec::new("robust-exact-minimum");
    robust.frailty_score = Some(2);
    robust.session_date = on(5, 6);
    robust.attendance_count = Some(2);
    robust.remarks = Some("exactly at the robust minimum".to_string());

    let mut robust_short = ScenarioSpec::new("robust-one-short");
    robust_short.frailty_score = Some(3);
    robust_short.session_date = on(5, 6);
    robust_short.attendance_count = Some(1);

    let mut frail = ScenarioSpec::new("very-frail-near-miss");
    frail.frailty_score = Some(7);
    frail.event_mode = Some("Home Visit".to_string());
    frail.session_date = on(4, 15);
    frail.attendance_count = Some(5);

    let mut remote = ScenarioSpec::new("remote-only");
    remote.frailty_score = Some(6);
    remote.event_mode = Some("Telephone".to_string());
    remote.attendance_count = Some(8);

    let mut befriending = ScenarioSpec::new("befriending-summer");
    befriending.frailty_score = Some(4);
    befriending.session_date = on(6, 1);
    befriending.attendance_count = Some(13);
    befriending.contact_log_count = Some(47);
    befriending.boundary = Some(true);
    befriending.program = Some(ProgramKind::Befriending);
    befriending.program_start = on(6, 1);
    befriending.program_end = on(8, 31);

    let mut buddying = ScenarioSpec::new("buddying-fallthrough");
    buddying.frailty_score = Some(2);
    buddying.session_date = on(7, 1);
    buddying.attendance_count = Some(3);
    buddying.program = Some(ProgramKind::Buddying);
    buddying.program_start = on(7, 1);
    buddying.program_end = on(9, 30);

    vec![robust, robust_short, frail, remote, befriending, buddying]
}
