use chrono::{Duration, NaiveDate};

use crate::config::{ClassifierCutoffs, FiscalYear, SuggestionConfig, ThresholdConfig};
use crate::eligibility::classifier::Classifier;
use crate::eligibility::domain::{
    Encounter, EncounterId, Event, EventId, Patient, PatientId, WorkingSet,
};
use crate::eligibility::suggestions::SuggestionEngine;

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn fiscal_year() -> FiscalYear {
    FiscalYear::starting(2024)
}

pub(super) fn thresholds() -> ThresholdConfig {
    ThresholdConfig::standard(fiscal_year())
}

pub(super) fn classifier() -> Classifier {
    Classifier::new(thresholds(), ClassifierCutoffs::default())
}

pub(super) fn suggestion_engine() -> SuggestionEngine {
    SuggestionEngine::new(classifier(), SuggestionConfig::default())
}

/// `count` attended sessions for `patient`, one per week from `from`.
pub(super) fn weekly_events(patient: &str, mode: &str, from: NaiveDate, count: u32) -> Vec<Event> {
    (0..count)
        .map(|index| {
            let day = from + Duration::weeks(i64::from(index));
            Event {
                id: EventId(format!("{patient}-E{index:03}")),
                mode: mode.to_string(),
                start: format!("{day}T10:00:00"),
                end: format!("{day}T11:30:00"),
                duration_minutes: 90,
                venue: "Community Centre".to_string(),
                capacity: 10,
                patients: vec![PatientId(patient.to_string())],
                purpose: "Exercise class".to_string(),
                attended: true,
            }
        })
        .collect()
}

/// `count` contact encounters for `patient`, one per day from `from`.
pub(super) fn daily_encounters(patient: &str, from: NaiveDate, count: u32) -> Vec<Encounter> {
    (0..count)
        .map(|index| {
            let day = from + Duration::days(i64::from(index));
            Encounter {
                id: EncounterId(format!("{patient}-C{index:03}")),
                status: "finished".to_string(),
                timestamp: format!("{day}T14:00:00"),
                staff: "Volunteer A".to_string(),
                referral_source: "GP Practice".to_string(),
                purpose: "Befriending call".to_string(),
                boundary: false,
                patient: PatientId(patient.to_string()),
            }
        })
        .collect()
}

pub(super) fn working_set(patients: Vec<Patient>, events: Vec<Event>, encounters: Vec<Encounter>) -> WorkingSet {
    let mut working_set = WorkingSet {
        patients,
        events,
        encounters,
        questionnaires: Vec::new(),
    };
    working_set.resync_links();
    working_set
}
