use super::common::*;
use crate::eligibility::domain::{KpiSubgroup, KpiTier, ProgramKind, Verdict, WorkingSet};
use crate::eligibility::scenario::{
    FieldOverride, ScenarioError, ScenarioSpec, ScenarioSynthesizer,
};

fn synthesizer() -> ScenarioSynthesizer {
    ScenarioSynthesizer::new(fiscal_year())
}

fn robust_boundary() -> ScenarioSpec {
    let mut spec = ScenarioSpec::new("robust-boundary");
    spec.frailty_score = Some(2);
    spec.event_mode = Some("In-Person".to_string());
    spec.session_date = Some(date(2024, 5, 6));
    spec.attendance_count = Some(2);
    spec.age = Some(72);
    spec
}

fn befriending_summer() -> ScenarioSpec {
    let mut spec = ScenarioSpec::new("befriending-summer");
    spec.frailty_score = Some(4);
    spec.event_mode = Some("Home Visit".to_string());
    spec.session_date = Some(date(2024, 6, 1));
    spec.attendance_count = Some(13);
    spec.contact_log_count = Some(47);
    spec.program = Some(ProgramKind::Befriending);
    spec.program_start = Some(date(2024, 6, 1));
    spec.program_end = Some(date(2024, 8, 31));
    spec
}

#[test]
fn synthesized_records_reach_the_intended_verdict() {
    let bundle = synthesizer()
        .generate(&[robust_boundary(), befriending_summer()])
        .expect("scenarios generate");

    let mut set = WorkingSet::new();
    set.absorb(bundle);
    let outcomes = classifier().classify_all(&mut set);

    assert_eq!(
        outcomes[0].verdict,
        Verdict::new(KpiTier::Robust, Some(KpiSubgroup::Group1))
    );
    assert_eq!(outcomes[1].verdict, Verdict::new(KpiTier::Befriending, None));
}

#[test]
fn bundle_links_are_consistent() {
    let bundle = synthesizer()
        .generate(&[befriending_summer()])
        .expect("scenario generates");

    let patient = &bundle.patients[0];
    assert_eq!(patient.attended_events.len(), 13);
    assert!(bundle
        .events
        .iter()
        .all(|event| event.references(&patient.id) && patient.attended_events.contains(&event.id)));
    assert!(bundle
        .encounters
        .iter()
        .all(|encounter| encounter.patient == patient.id));
    assert_eq!(bundle.encounters.len(), 47);
    assert_eq!(bundle.questionnaires.len(), 1);

    let row = &bundle.aggregate_rows[0];
    assert_eq!(row.scenario_id, "befriending-summer");
    assert_eq!((row.in_person_events, row.remote_events, row.encounters), (13, 0, 47));
}

#[test]
fn explicit_fields_beat_defaults_and_overrides_beat_both() {
    let mut spec = ScenarioSpec::new("layered");
    spec.frailty_score = Some(2);

    let plain = synthesizer().generate(&[spec.clone()]).expect("generates");
    assert_eq!(plain.patients[0].frailty_score, 2);
    assert_eq!(plain.patients[0].age, 75);

    let overrides = vec![
        FieldOverride::parse("patient.frailty_score=8").expect("valid override"),
        FieldOverride::parse("encounter.boundary=yes").expect("valid override"),
    ];
    let overridden = synthesizer()
        .with_overrides(overrides)
        .generate(&[spec])
        .expect("generates");

    assert_eq!(overridden.patients[0].frailty_score, 8);
    assert!(overridden.encounters.iter().all(|encounter| encounter.boundary));
    assert_eq!(overridden.aggregate_rows[0].frailty_score, 8);
    assert!(overridden.aggregate_rows[0].boundary);
}

#[test]
fn override_can_turn_attendance_off() {
    let overrides = vec![FieldOverride::parse("event.attended=false").expect("valid override")];
    let bundle = synthesizer()
        .with_overrides(overrides)
        .generate(&[robust_boundary()])
        .expect("generates");

    let mut set = WorkingSet::new();
    set.absorb(bundle);
    let outcomes = classifier().classify_all(&mut set);

    assert_eq!(outcomes[0].verdict, Verdict::UNCLASSIFIED);
    assert_eq!(outcomes[0].checks[0].actual, 0);
}

#[test]
fn generation_is_repeatable() {
    let scenarios = [robust_boundary(), befriending_summer()];
    let overrides = vec![FieldOverride::parse("event.venue=Library").expect("valid override")];

    let first = synthesizer()
        .with_overrides(overrides.clone())
        .generate(&scenarios)
        .expect("generates");
    let second = synthesizer()
        .with_overrides(overrides)
        .generate(&scenarios)
        .expect("generates");

    assert_eq!(first, second);
}

#[test]
fn contradictory_scenarios_are_generated_as_written() {
    let mut spec = robust_boundary();
    spec.frailty_score = Some(8);
    spec.attendance_count = Some(1);

    let bundle = synthesizer().generate(&[spec]).expect("generates");
    let mut set = WorkingSet::new();
    set.absorb(bundle);
    let outcomes = classifier().classify_all(&mut set);

    assert_eq!(outcomes[0].verdict, Verdict::UNCLASSIFIED);
    assert_eq!(outcomes[0].deficits().next().map(|check| check.shortfall()), Some(5));
}

#[test]
fn ids_stay_unique_across_runs_on_one_synthesizer() {
    let mut synthesizer = synthesizer();
    let first = synthesizer.generate(&[robust_boundary()]).expect("generates");
    let second = synthesizer.generate(&[robust_boundary()]).expect("generates");

    let mut set = WorkingSet::new();
    set.absorb(first);
    set.absorb(second);

    let ids = set.record_ids();
    let total = set.patients.len() + set.events.len() + set.encounters.len() + set.questionnaires.len();
    assert_eq!(ids.len(), total);
}

#[test]
fn generating_into_a_populated_set_with_the_same_tag_collides() {
    let mut set = WorkingSet::new();
    set.absorb(synthesizer().generate(&[robust_boundary()]).expect("generates"));

    let mut fresh = synthesizer();
    fresh.reserve(&set);

    match fresh.generate(&[robust_boundary()]) {
        Err(ScenarioError::IdCollision(_)) => {}
        other => panic!("expected id collision, got {other:?}"),
    }

    let mut tagged = ScenarioSynthesizer::new(fiscal_year()).with_run_tag("RUN2");
    tagged.reserve(&set);
    assert!(tagged.generate(&[robust_boundary()]).is_ok());
}

#[test]
fn scenarios_without_an_id_are_rejected() {
    let mut spec = robust_boundary();
    spec.scenario_id = Some("  ".to_string());

    match synthesizer().generate(&[spec]) {
        Err(ScenarioError::MissingField { index: 0, field }) => assert_eq!(field, "scenario_id"),
        other => panic!("expected missing field, got {other:?}"),
    }
}
