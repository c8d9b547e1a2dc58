use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use super::super::domain::{
    DateWindow, Encounter, EncounterId, Event, EventId, EventMode, Patient, PatientId,
    ProgramEnrollment, QuestionnaireId, QuestionnaireResponse, WorkingSet,
};
use super::super::links;
use super::overrides::{FieldOverride, Overridable};
use super::spec::{AggregateRow, GeneratedBundle, ScenarioSpec};
use super::ScenarioError;
use crate::config::FiscalYear;

const DEFAULT_FRAILTY_SCORE: i32 = 3;
const DEFAULT_AGE: i32 = 75;
const DEFAULT_VENUE: &str = "Community Centre";
const DEFAULT_PURPOSE: &str = "Scheduled activity";
const DEFAULT_CONTACT_PURPOSE: &str = "Wellbeing check";
const CONTACT_LOG_PURPOSE: &str = "Contact log";
const DEFAULT_STAFF: &str = "Care Coordinator";
const DEFAULT_REFERRAL: &str = "Community Referral";
const SESSION_MINUTES: u32 = 90;

/// Turns scenario specs into linked records.
///
/// Field precedence is fixed: generator defaults, then the scenario's explicit fields, then
/// the global overrides. Contradictory scenarios are generated as written; the classifier
/// is what reports the contradiction.
#[derive(Debug, Clone)]
pub struct ScenarioSynthesizer {
    fiscal_year: FiscalYear,
    overrides: Vec<FieldOverride>,
    run_tag: String,
    sequence: u64,
    issued: HashSet<String>,
}

impl ScenarioSynthesizer {
    pub fn new(fiscal_year: FiscalYear) -> Self {
        Self {
            fiscal_year,
            overrides: Vec::new(),
            run_tag: "SYN".to_string(),
            sequence: 0,
            issued: HashSet::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: Vec<FieldOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Prefix for every generated id; distinct tags keep separate runs apart.
    pub fn with_run_tag(mut self, run_tag: impl Into<String>) -> Self {
        self.run_tag = run_tag.into();
        self
    }

    /// Treat every id already in `working_set` as taken so generated ids never shadow them.
    pub fn reserve(&mut self, working_set: &WorkingSet) {
        self.issued.extend(working_set.record_ids());
    }

    pub fn overrides(&self) -> &[FieldOverride] {
        &self.overrides
    }

    pub fn generate(&mut self, scenarios: &[ScenarioSpec]) -> Result<GeneratedBundle, ScenarioError> {
        let mut bundle = GeneratedBundle::default();

        for (index, spec) in scenarios.iter().enumerate() {
            let scenario_id = spec
                .identifier()
                .ok_or(ScenarioError::MissingField {
                    index,
                    field: "scenario_id",
                })?
                .to_string();
            let generated = self.generate_one(&scenario_id, spec)?;
            debug!(
                scenario = %scenario_id,
                events = generated.events.len(),
                encounters = generated.encounters.len(),
                "synthesized scenario"
            );
            bundle.extend(generated);
        }

        links::resync(&mut bundle.patients, &bundle.events);

        info!(
            scenarios = scenarios.len(),
            patients = bundle.patients.len(),
            events = bundle.events.len(),
            encounters = bundle.encounters.len(),
            overrides = self.overrides.len(),
            "scenario synthesis complete"
        );

        Ok(bundle)
    }

    fn generate_one(&mut self, scenario_id: &str, spec: &ScenarioSpec) -> Result<GeneratedBundle, ScenarioError> {
        let plan = SchedulePlan::for_spec(spec, &self.fiscal_year);

        // generator defaults, with explicit scenario fields layered on top
        let patient_id = PatientId(self.issue("P")?);
        let mut patient = Patient::new(
            patient_id.0.clone(),
            spec.frailty_score.unwrap_or(DEFAULT_FRAILTY_SCORE),
            spec.age.unwrap_or(DEFAULT_AGE),
        );
        if let Some(score) = spec.social_risk_score {
            patient.social_risk_score = score;
        }
        if let Some(program) = spec.program {
            *patient.enrollment_mut(program) = ProgramEnrollment {
                start: spec.program_start,
                end: spec.program_end,
            };
        }

        let mode = spec
            .event_mode
            .clone()
            .unwrap_or_else(|| EventMode::InPerson.label().to_string());
        let capacity = spec.seniors.unwrap_or(1).max(1);

        let mut events = Vec::new();
        for date in schedule(plan.sessions, spec.attendance_count.unwrap_or(0), plan.weekly_sessions) {
            events.push(Event {
                id: EventId(self.issue("E")?),
                mode: mode.clone(),
                start: timestamp(date, 10, 0),
                end: timestamp(date, 11, 30),
                duration_minutes: SESSION_MINUTES,
                venue: DEFAULT_VENUE.to_string(),
                capacity,
                patients: vec![patient_id.clone()],
                purpose: DEFAULT_PURPOSE.to_string(),
                attended: true,
            });
        }

        let contact_count = spec.contact_log_count.unwrap_or(1).max(1);
        let mut encounters = Vec::new();
        let contact_dates = schedule(plan.contacts, contact_count, plan.weekly_contacts);
        for (position, date) in contact_dates.into_iter().enumerate() {
            let purpose = match (position, &spec.contact_purpose) {
                (0, Some(purpose)) => purpose.clone(),
                (0, None) => DEFAULT_CONTACT_PURPOSE.to_string(),
                _ => CONTACT_LOG_PURPOSE.to_string(),
            };
            encounters.push(Encounter {
                id: EncounterId(self.issue("C")?),
                status: "finished".to_string(),
                timestamp: timestamp(date, 14, 0),
                staff: DEFAULT_STAFF.to_string(),
                referral_source: DEFAULT_REFERRAL.to_string(),
                purpose,
                boundary: spec.boundary.unwrap_or(false),
                patient: patient_id.clone(),
            });
        }

        let mut questionnaire = QuestionnaireResponse {
            id: QuestionnaireId(self.issue("Q")?),
            patient: patient_id.clone(),
            completed_on: Some(plan.contacts.start),
            score: 0,
            remarks: spec.remarks.clone().unwrap_or_default(),
        };

        // global overrides always land last
        for field_override in &self.overrides {
            field_override.apply(&mut patient);
            events.iter_mut().for_each(|event| field_override.apply(event));
            encounters
                .iter_mut()
                .for_each(|encounter| field_override.apply(encounter));
            field_override.apply(&mut questionnaire);
        }

        let in_person_events = events
            .iter()
            .filter(|event| EventMode::from_label(&event.mode).is_some_and(EventMode::is_in_person))
            .count() as u32;
        let row = AggregateRow {
            scenario_id: scenario_id.to_string(),
            patient_id: patient_id.clone(),
            frailty_score: patient.frailty_score,
            in_person_events,
            remote_events: events.len() as u32 - in_person_events,
            encounters: encounters.len() as u32,
            questionnaires: 1,
            boundary: encounters.first().is_some_and(|encounter| encounter.boundary),
            remarks: questionnaire.remarks.clone(),
        };

        Ok(GeneratedBundle {
            patients: vec![patient],
            events,
            encounters,
            questionnaires: vec![questionnaire],
            aggregate_rows: vec![row],
        })
    }

    fn issue(&mut self, kind: &str) -> Result<String, ScenarioError> {
        self.sequence += 1;
        let id = format!("{}-{kind}{:05}", self.run_tag, self.sequence);
        if !self.issued.insert(id.clone()) {
            return Err(ScenarioError::IdCollision(id));
        }
        Ok(id)
    }
}

/// Convenience wrapper for a one-off run.
pub fn generate(
    scenarios: &[ScenarioSpec],
    overrides: Vec<FieldOverride>,
    fiscal_year: FiscalYear,
) -> Result<GeneratedBundle, ScenarioError> {
    ScenarioSynthesizer::new(fiscal_year)
        .with_overrides(overrides)
        .generate(scenarios)
}

/// Date ranges sessions and contacts are spread across.
struct SchedulePlan {
    sessions: DateWindow,
    contacts: DateWindow,
    weekly_sessions: bool,
    weekly_contacts: bool,
}

impl SchedulePlan {
    fn for_spec(spec: &ScenarioSpec, fiscal_year: &FiscalYear) -> Self {
        let program_window = spec.program.map(|_| {
            let start = spec.program_start.unwrap_or(fiscal_year.start);
            let end = spec
                .program_end
                .map_or(fiscal_year.end, |end| end.min(fiscal_year.end));
            DateWindow::new(start, end)
        });
        let horizon = program_window.map_or(fiscal_year.end, |window| window.end);
        let default_start = program_window.map_or(fiscal_year.start, |window| window.start);

        let session_start = spec.session_date.unwrap_or(default_start);
        let contact_start = spec.contact_date.or(spec.session_date).unwrap_or(default_start);

        Self {
            sessions: DateWindow::new(session_start, horizon.max(session_start)),
            contacts: DateWindow::new(contact_start, horizon.max(contact_start)),
            weekly_sessions: spec.session_date.is_some(),
            weekly_contacts: spec.contact_date.or(spec.session_date).is_some(),
        }
    }
}

/// Weekly from the window start when asked for and the weeks fit before the window end;
/// otherwise spread evenly.
fn schedule(window: DateWindow, count: u32, weekly: bool) -> Vec<NaiveDate> {
    let weeks_needed = i64::from(count.saturating_sub(1)) * 7;
    if weekly && weeks_needed < window.days() {
        return (0..i64::from(count))
            .map(|week| window.start + Duration::weeks(week))
            .collect();
    }
    spread(window, count)
}

/// `count` dates spread evenly from the window start, never past its end.
fn spread(window: DateWindow, count: u32) -> Vec<NaiveDate> {
    let span = (window.end - window.start).num_days().max(0);
    let count = i64::from(count);
    (0..count)
        .map(|position| window.start + Duration::days(position * span / count.max(1)))
        .collect()
}

fn timestamp(date: NaiveDate, hour: u32, minute: u32) -> String {
    date.and_hms_opt(hour, minute, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| date.format("%Y-%m-%d").to_string())
}
