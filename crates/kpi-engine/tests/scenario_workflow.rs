use chrono::NaiveDate;
use kpi_engine::config::{ClassifierCutoffs, FiscalYear, SuggestionConfig, ThresholdConfig};
use kpi_engine::eligibility::scenario::{parse_csv, parse_json, FieldOverride};
use kpi_engine::eligibility::{
    Classifier, EventId, KpiSubgroup, KpiTier, ScenarioSynthesizer, SuggestionEngine,
    SuggestionKind, Verdict, WorkingSet,
};

const SHEET: &str = "\
Scenario,Seniors,Frailty Score,Event Mode,Session Date,Attendance,Boundary,Contact Purpose,Contact Date,Age,Remarks,Contact Logs,Program,Program Start,Program End
robust-exact,1,2,In-Person,2024-05-06,2,no,Wellbeing check,2024-05-06,72,exact minimum,,,,
robust-short,1,2,In-Person,2024-05-06,1,no,Wellbeing check,2024-05-06,74,one short,,,,
frail-short,1,7,Home Visit,2024-04-15,5,no,Falls review,2024-04-15,84,,,,,
befriending,1,4,Group Activity,2024-06-01,13,yes,Befriending call,2024-06-01,81,,47,befriending,2024-06-01,2024-08-31
";

fn fiscal_year() -> FiscalYear {
    FiscalYear::starting(2024)
}

fn classifier() -> Classifier {
    Classifier::new(ThresholdConfig::standard(fiscal_year()), ClassifierCutoffs::default())
}

fn synthesized_set() -> WorkingSet {
    let scenarios = parse_csv(SHEET.as_bytes()).expect("sheet parses");
    let bundle = ScenarioSynthesizer::new(fiscal_year())
        .generate(&scenarios)
        .expect("scenarios generate");

    let mut set = WorkingSet::new();
    set.absorb(bundle);
    set
}

#[test]
fn sheet_to_verdicts_end_to_end() {
    let mut set = synthesized_set();
    let outcomes = classifier().classify_all(&mut set);

    let verdicts: Vec<Verdict> = outcomes.iter().map(|outcome| outcome.verdict).collect();
    assert_eq!(
        verdicts,
        vec![
            Verdict::new(KpiTier::Robust, Some(KpiSubgroup::Group1)),
            Verdict::UNCLASSIFIED,
            Verdict::UNCLASSIFIED,
            Verdict::new(KpiTier::Befriending, None),
        ]
    );
    assert!(set.patients.iter().all(|patient| patient.kpi_tier.is_some()));
}

#[test]
fn suggestions_target_the_near_misses() {
    let set = synthesized_set();
    let engine = SuggestionEngine::new(classifier(), SuggestionConfig::default());

    let suggestions = engine.suggest(&set, fiscal_year().window());

    let shortfalls: Vec<_> = suggestions
        .iter()
        .filter(|suggestion| suggestion.kind == SuggestionKind::Shortfall)
        .map(|suggestion| suggestion.reference.to_string())
        .collect();
    assert_eq!(shortfalls.len(), 2);
    assert!(suggestions
        .iter()
        .all(|suggestion| (0.0..=1.0).contains(&suggestion.confidence)));
}

#[test]
fn removing_an_event_and_resyncing_changes_the_verdict() {
    let mut set = synthesized_set();
    let robust_id = set.patients[0].id.clone();
    let first_event: EventId = set
        .events_for(&robust_id)
        .next()
        .map(|event| event.id.clone())
        .expect("robust patient has events");

    set.remove_event(&first_event).expect("event removed");
    set.resync_links();

    let patient = set.patient(&robust_id).expect("patient present");
    assert!(!patient.attended_events.contains(&first_event));
    assert_eq!(patient.attended_events.len(), 1);

    let outcome = classifier().evaluate(patient, &set.events, &set.encounters);
    assert_eq!(outcome.verdict, Verdict::UNCLASSIFIED);
}

#[test]
fn json_scenarios_and_overrides_drive_generation() {
    let json = r#"[
        {"scenario_id": "frail-json", "frailty_score": 6, "attendance_count": 6,
         "session_date": "2024-04-15", "social_risk_score": 5}
    ]"#;
    let scenarios = parse_json(json.as_bytes()).expect("json parses");
    let overrides = vec![FieldOverride::parse("event.mode=Telephone").expect("valid override")];

    let bundle = ScenarioSynthesizer::new(fiscal_year())
        .with_overrides(overrides)
        .generate(&scenarios)
        .expect("generates");
    assert_eq!(bundle.aggregate_rows[0].remote_events, 6);

    let mut set = WorkingSet::new();
    set.absorb(bundle);
    let outcomes = classifier().classify_all(&mut set);

    assert_eq!(outcomes[0].verdict, Verdict::UNCLASSIFIED);
    assert_eq!(
        outcomes[0].candidate,
        Some(Verdict::new(KpiTier::Frail, Some(KpiSubgroup::Group2)))
    );
    assert_eq!(
        NaiveDate::from_ymd_opt(2024, 4, 15),
        set.events[0]
            .start
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
    );
}
