use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::super::domain::{
    Encounter, Event, PatientId, Patient, ProgramKind, QuestionnaireResponse,
};

/// Declarative description of the records a test scenario needs. Every field except the
/// scenario id is optional; the synthesizer fills gaps with defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub seniors: Option<u32>,
    #[serde(default)]
    pub frailty_score: Option<i32>,
    #[serde(default)]
    pub event_mode: Option<String>,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub attendance_count: Option<u32>,
    #[serde(default)]
    pub boundary: Option<bool>,
    #[serde(default)]
    pub contact_purpose: Option<String>,
    #[serde(default)]
    pub contact_date: Option<NaiveDate>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub contact_log_count: Option<u32>,
    #[serde(default)]
    pub social_risk_score: Option<i32>,
    #[serde(default)]
    pub program: Option<ProgramKind>,
    #[serde(default)]
    pub program_start: Option<NaiveDate>,
    #[serde(default)]
    pub program_end: Option<NaiveDate>,
}

impl ScenarioSpec {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: Some(scenario_id.into()),
            ..Self::default()
        }
    }

    /// The scenario id when present and not blank.
    pub fn identifier(&self) -> Option<&str> {
        self.scenario_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// One summary line per synthesized scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub scenario_id: String,
    pub patient_id: PatientId,
    pub frailty_score: i32,
    pub in_person_events: u32,
    pub remote_events: u32,
    pub encounters: u32,
    pub questionnaires: u32,
    pub boundary: bool,
    pub remarks: String,
}

/// Synthesizer output. Every reference inside resolves to a record in the same bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedBundle {
    pub patients: Vec<Patient>,
    pub events: Vec<Event>,
    pub encounters: Vec<Encounter>,
    pub questionnaires: Vec<QuestionnaireResponse>,
    pub aggregate_rows: Vec<AggregateRow>,
}

impl GeneratedBundle {
    pub fn extend(&mut self, other: GeneratedBundle) {
        self.patients.extend(other.patients);
        self.events.extend(other.events);
        self.encounters.extend(other.encounters);
        self.questionnaires.extend(other.questionnaires);
        self.aggregate_rows.extend(other.aggregate_rows);
    }
}
