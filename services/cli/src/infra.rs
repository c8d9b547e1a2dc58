use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use kpi_engine::eligibility::scenario::{parse_csv, parse_json};
use kpi_engine::eligibility::{ClassificationOutcome, ScenarioSpec, Suggestion, WorkingSet};
use kpi_engine::error::AppError;
use serde::Serialize;
use tracing::info;

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Read a working set and rebuild its attendance links; stored link sets are never trusted.
pub(crate) fn load_working_set(path: &Path) -> Result<WorkingSet, AppError> {
    let file = File::open(path)?;
    let mut working_set: WorkingSet = serde_json::from_reader(BufReader::new(file))?;
    working_set.resync_links();
    info!(
        path = %path.display(),
        patients = working_set.patients.len(),
        events = working_set.events.len(),
        encounters = working_set.encounters.len(),
        "working set loaded"
    );
    Ok(working_set)
}

/// Scenario lists are CSV when the extension says so, JSON otherwise.
pub(crate) fn read_scenarios(path: &Path) -> Result<Vec<ScenarioSpec>, AppError> {
    let file = BufReader::new(File::open(path)?);
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let scenarios = if is_csv {
        parse_csv(file)?
    } else {
        parse_json(file)?
    };
    Ok(scenarios)
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body)?;
    Ok(())
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn render_outcomes(outcomes: &[ClassificationOutcome]) {
    let classified = outcomes
        .iter()
        .filter(|outcome| outcome.verdict.is_classified())
        .count();
    println!(
        "Classified {classified} of {} patient(s)",
        outcomes.len()
    );

    for outcome in outcomes {
        println!("- {}: {}", outcome.patient_id, outcome.verdict.label());
        if let (false, Some(candidate)) = (outcome.verdict.is_classified(), outcome.candidate) {
            for check in outcome.deficits() {
                println!(
                    "    short of {}: {} of {} {}",
                    candidate.label(),
                    check.actual,
                    check.required,
                    check.metric.label()
                );
            }
        }
        for diagnostic in &outcome.diagnostics {
            println!("    ! {}", diagnostic.message());
        }
    }
}

pub(crate) fn render_suggestions(suggestions: &[Suggestion]) {
    if suggestions.is_empty() {
        println!("No suggestions: every patient is clear of the thresholds.");
        return;
    }

    println!("{} suggestion(s)", suggestions.len());
    for suggestion in suggestions {
        println!(
            "- [{:.2}] {} {}: {}",
            suggestion.confidence,
            suggestion.kind.label(),
            suggestion.reference,
            suggestion.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kpi-cli-{}-{name}", std::process::id()));
        std::fs::write(&path, body).expect("scratch file written");
        path
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date(" 2024-06-01 "),
            Ok(NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date"))
        );
        let err = parse_date("01/06/2024").expect_err("slashes are rejected");
        assert!(err.contains("YYYY-MM-DD"));
    }

    #[test]
    fn scenarios_are_read_by_extension() {
        let csv = scratch("scenarios.csv", "Scenario,Frailty Score\ncsv-one,2\n");
        let json = scratch("scenarios.json", r#"[{"scenario_id": "json-one", "age": 80}]"#);

        let from_csv = read_scenarios(&csv).expect("csv scenarios read");
        let from_json = read_scenarios(&json).expect("json scenarios read");

        assert_eq!(from_csv[0].identifier(), Some("csv-one"));
        assert_eq!(from_csv[0].frailty_score, Some(2));
        assert_eq!(from_json[0].identifier(), Some("json-one"));
        assert_eq!(from_json[0].age, Some(80));

        let _ = std::fs::remove_file(csv);
        let _ = std::fs::remove_file(json);
    }

    #[test]
    fn working_set_links_are_rebuilt_on_load() {
        let path = scratch(
            "working-set.json",
            r#"{
                "patients": [{"id": "p1", "frailty_score": 2, "age": 70, "attended_events": ["stale"]}],
                "events": [{"id": "e1", "mode": "In-Person", "start": "2024-05-06T10:00:00", "patients": ["p1"]}]
            }"#,
        );

        let working_set = load_working_set(&path).expect("working set loads");
        let linked: Vec<_> = working_set.patients[0]
            .attended_events
            .iter()
            .map(|id| id.0.as_str())
            .collect();
        assert_eq!(linked, vec!["e1"]);

        let _ = std::fs::remove_file(path);
    }
}
