use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use kpi_engine::config::{AppConfig, FiscalYear};
use kpi_engine::eligibility::scenario::write_bundle;
use kpi_engine::eligibility::{Classifier, FieldOverride, ScenarioSynthesizer, SuggestionEngine};
use kpi_engine::error::AppError;
use tracing::info;

use crate::infra::{
    load_working_set, parse_date, print_json, read_scenarios, render_outcomes,
    render_suggestions, write_json,
};

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// Working set JSON (patients, events, encounters, questionnaires)
    pub(crate) input: PathBuf,
    /// Write the annotated working set to this path
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Print outcomes as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SuggestArgs {
    /// Working set JSON
    pub(crate) input: PathBuf,
    /// First day of the counting window (defaults to the fiscal-year start)
    #[arg(long, value_parser = parse_date)]
    pub(crate) window_start: Option<NaiveDate>,
    /// Last day of the counting window (defaults to the fiscal-year end)
    #[arg(long, value_parser = parse_date)]
    pub(crate) window_end: Option<NaiveDate>,
    /// Print suggestions as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SynthesizeArgs {
    /// Scenario sheet (`.csv`) or scenario list (`.json`)
    pub(crate) scenarios: PathBuf,
    /// Directory receiving the bundle files and manifest
    #[arg(long, default_value = "bundle")]
    pub(crate) out_dir: PathBuf,
    /// Global field override applied after generation, as `entity.field=value`
    #[arg(long = "override", value_name = "ENTITY.FIELD=VALUE")]
    pub(crate) overrides: Vec<String>,
    /// Prefix for generated ids
    #[arg(long)]
    pub(crate) run_tag: Option<String>,
}

pub(crate) fn run_classify(config: &AppConfig, args: ClassifyArgs) -> Result<(), AppError> {
    let ClassifyArgs {
        input,
        output,
        json,
    } = args;

    let mut working_set = load_working_set(&input)?;
    let classifier = Classifier::new(config.thresholds.clone(), config.cutoffs);
    let outcomes = classifier.classify_all(&mut working_set);

    if json {
        print_json(&outcomes)?;
    } else {
        render_outcomes(&outcomes);
    }

    if let Some(path) = output {
        write_json(&path, &working_set)?;
        info!(path = %path.display(), "annotated working set written");
    }

    Ok(())
}

pub(crate) fn run_suggest(config: &AppConfig, args: SuggestArgs) -> Result<(), AppError> {
    let SuggestArgs {
        input,
        window_start,
        window_end,
        json,
    } = args;

    let fiscal_year = config.thresholds.fiscal_year;
    let window = FiscalYear::new(
        window_start.unwrap_or(fiscal_year.start),
        window_end.unwrap_or(fiscal_year.end),
    )?
    .window();

    let working_set = load_working_set(&input)?;
    let engine = SuggestionEngine::new(
        Classifier::new(config.thresholds.clone(), config.cutoffs),
        config.suggestions,
    );
    let suggestions = engine.suggest(&working_set, window);

    if json {
        print_json(&suggestions)
    } else {
        println!("Counting window {window}, margin {}", engine.margin());
        render_suggestions(&suggestions);
        Ok(())
    }
}

pub(crate) fn run_synthesize(config: &AppConfig, args: SynthesizeArgs) -> Result<(), AppError> {
    let SynthesizeArgs {
        scenarios,
        out_dir,
        overrides,
        run_tag,
    } = args;

    let scenarios = read_scenarios(&scenarios)?;
    let overrides = overrides
        .iter()
        .map(|raw| FieldOverride::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut synthesizer =
        ScenarioSynthesizer::new(config.thresholds.fiscal_year).with_overrides(overrides);
    if let Some(tag) = run_tag {
        synthesizer = synthesizer.with_run_tag(tag);
    }

    let bundle = synthesizer.generate(&scenarios)?;
    let manifest = write_bundle(&bundle, &out_dir)?;

    println!(
        "Synthesized {} scenario(s) into {}",
        bundle.aggregate_rows.len(),
        out_dir.display()
    );
    for (label, category) in [
        ("residents", &manifest.residents),
        ("volunteers", &manifest.volunteers),
        ("events", &manifest.events),
        ("encounters", &manifest.encounters),
        ("questionnaires", &manifest.questionnaires),
        ("organizations", &manifest.organizations),
        ("locations", &manifest.locations),
        ("aggregate rows", &manifest.aggregate_rows),
    ] {
        match &category.path {
            Some(path) => println!("- {label}: {} -> {}", category.count, path.display()),
            None => println!("- {label}: none"),
        }
    }

    Ok(())
}
