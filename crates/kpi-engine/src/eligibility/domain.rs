use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for tracked patients.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatientId(pub String);

/// Identifier wrapper for scheduled events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Identifier wrapper for logged encounters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncounterId(pub String);

/// Identifier wrapper for questionnaire responses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionnaireId(pub String);

macro_rules! display_id {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_id!(PatientId, EventId, EncounterId, QuestionnaireId);

/// Points at a single record in the working set so diagnostics can name their subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordRef {
    Patient(PatientId),
    Event(EventId),
    Encounter(EncounterId),
    Questionnaire(QuestionnaireId),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Patient(id) => write!(f, "patient {id}"),
            RecordRef::Event(id) => write!(f, "event {id}"),
            RecordRef::Encounter(id) => write!(f, "encounter {id}"),
            RecordRef::Questionnaire(id) => write!(f, "questionnaire {id}"),
        }
    }
}

/// Fixed set of event delivery modes. Only the in-person-like modes count towards
/// attendance thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMode {
    InPerson,
    HomeVisit,
    GroupActivity,
    Outreach,
    Telephone,
    VideoCall,
    Messaging,
}

impl EventMode {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::InPerson,
            Self::HomeVisit,
            Self::GroupActivity,
            Self::Outreach,
            Self::Telephone,
            Self::VideoCall,
            Self::Messaging,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::InPerson => "In-Person",
            Self::HomeVisit => "Home Visit",
            Self::GroupActivity => "Group Activity",
            Self::Outreach => "Outreach",
            Self::Telephone => "Telephone",
            Self::VideoCall => "Video Call",
            Self::Messaging => "Messaging",
        }
    }

    pub const fn is_in_person(self) -> bool {
        matches!(
            self,
            Self::InPerson | Self::HomeVisit | Self::GroupActivity | Self::Outreach
        )
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        Self::ordered()
            .into_iter()
            .find(|mode| mode.label().eq_ignore_ascii_case(trimmed))
    }
}

/// Community programs that scope attendance to an enrollment window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    Buddying,
    Befriending,
}

impl ProgramKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Buddying => "Buddying",
            Self::Befriending => "Befriending",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "buddying" => Some(Self::Buddying),
            "befriending" => Some(Self::Befriending),
            _ => None,
        }
    }
}

/// Enrollment in a program. Missing dates fall back to the fiscal-year bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEnrollment {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl ProgramEnrollment {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiTier {
    Robust,
    Frail,
    Buddying,
    Befriending,
    Unclassified,
}

impl KpiTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Robust => "Robust",
            Self::Frail => "Frail",
            Self::Buddying => "Buddying",
            Self::Befriending => "Befriending",
            Self::Unclassified => "Unclassified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiSubgroup {
    Group1,
    Group2,
}

impl KpiSubgroup {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Group1 => "Group 1",
            Self::Group2 => "Group 2",
        }
    }
}

/// Tier plus optional subgroup, the unit the classifier reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Verdict {
    pub tier: KpiTier,
    pub subgroup: Option<KpiSubgroup>,
}

impl Verdict {
    pub const UNCLASSIFIED: Verdict = Verdict {
        tier: KpiTier::Unclassified,
        subgroup: None,
    };

    pub const fn new(tier: KpiTier, subgroup: Option<KpiSubgroup>) -> Self {
        Self { tier, subgroup }
    }

    pub fn label(&self) -> String {
        match (self.tier, self.subgroup) {
            (KpiTier::Frail, Some(KpiSubgroup::Group2)) => "Frail / Very Frail".to_string(),
            (tier, Some(subgroup)) => format!("{} / {}", tier.label(), subgroup.label()),
            (tier, None) => tier.label().to_string(),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.tier != KpiTier::Unclassified
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of days spanned, counting both ends. Zero for an empty window.
    pub fn days(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days() + 1
        }
    }

    pub fn overlaps(&self, other: &DateWindow) -> bool {
        !self.is_empty() && !other.is_empty() && self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub frailty_score: i32,
    #[serde(default)]
    pub social_risk_score: i32,
    pub age: i32,
    #[serde(default)]
    pub buddying: Option<ProgramEnrollment>,
    #[serde(default)]
    pub befriending: Option<ProgramEnrollment>,
    #[serde(default)]
    pub kpi_tier: Option<KpiTier>,
    #[serde(default)]
    pub kpi_subgroup: Option<KpiSubgroup>,
    /// Maintained by `links::resync`; never edit by hand.
    #[serde(default)]
    pub attended_events: BTreeSet<EventId>,
}

impl Patient {
    pub fn new(id: impl Into<String>, frailty_score: i32, age: i32) -> Self {
        Self {
            id: PatientId(id.into()),
            frailty_score,
            social_risk_score: 0,
            age,
            buddying: None,
            befriending: None,
            kpi_tier: None,
            kpi_subgroup: None,
            attended_events: BTreeSet::new(),
        }
    }

    pub fn enrollment(&self, program: ProgramKind) -> Option<&ProgramEnrollment> {
        match program {
            ProgramKind::Buddying => self.buddying.as_ref(),
            ProgramKind::Befriending => self.befriending.as_ref(),
        }
    }

    pub fn enrollment_mut(&mut self, program: ProgramKind) -> &mut ProgramEnrollment {
        let slot = match program {
            ProgramKind::Buddying => &mut self.buddying,
            ProgramKind::Befriending => &mut self.befriending,
        };
        slot.get_or_insert_with(ProgramEnrollment::default)
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.kpi_tier
            .map(|tier| Verdict::new(tier, self.kpi_subgroup))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Raw mode label as captured; matched case-insensitively against `EventMode` labels.
    pub mode: String,
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub capacity: u32,
    pub patients: Vec<PatientId>,
    #[serde(default)]
    pub purpose: String,
    #[serde(default = "default_attended")]
    pub attended: bool,
}

fn default_attended() -> bool {
    true
}

impl Event {
    pub fn references(&self, patient_id: &PatientId) -> bool {
        self.patients.iter().any(|id| id == patient_id)
    }

    /// Calendar date of the start timestamp, `None` when it cannot be parsed.
    pub fn started_on(&self) -> Option<NaiveDate> {
        parse_timestamp(&self.start).map(|dt| dt.date())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    #[serde(default)]
    pub status: String,
    pub timestamp: String,
    #[serde(default)]
    pub staff: String,
    #[serde(default)]
    pub referral_source: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub boundary: bool,
    pub patient: PatientId,
}

impl Encounter {
    pub fn occurred_on(&self) -> Option<NaiveDate> {
        parse_timestamp(&self.timestamp).map(|dt| dt.date())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    pub id: QuestionnaireId,
    pub patient: PatientId,
    #[serde(default)]
    pub completed_on: Option<NaiveDate>,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub remarks: String,
}

/// Per-record problem found while classifying or scanning a working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub reference: RecordRef,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    InvalidFrailtyScore { score: i32 },
    InvalidAge { age: i32 },
    UnparsableTimestamp { raw: String },
    DanglingReference { patient: PatientId },
}

impl Diagnostic {
    pub fn message(&self) -> String {
        match &self.kind {
            DiagnosticKind::InvalidFrailtyScore { score } => format!(
                "{}: frailty score {score} is outside 1-9; record left unclassified",
                self.reference
            ),
            DiagnosticKind::InvalidAge { age } => format!(
                "{}: age {age} is outside 0-130; record left unclassified",
                self.reference
            ),
            DiagnosticKind::UnparsableTimestamp { raw } => format!(
                "{}: timestamp '{raw}' could not be parsed; excluded from attendance counts",
                self.reference
            ),
            DiagnosticKind::DanglingReference { patient } => format!(
                "{}: references unknown patient {patient}",
                self.reference
            ),
        }
    }
}

/// The caller-owned set of records every engine operation works against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingSet {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
    #[serde(default)]
    pub questionnaires: Vec<QuestionnaireResponse>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patient(&self, id: &PatientId) -> Option<&Patient> {
        self.patients.iter().find(|patient| &patient.id == id)
    }

    pub fn events_for<'a>(&'a self, id: &'a PatientId) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |event| event.references(id))
    }

    pub fn encounters_for<'a>(
        &'a self,
        id: &'a PatientId,
    ) -> impl Iterator<Item = &'a Encounter> + 'a {
        self.encounters
            .iter()
            .filter(move |encounter| &encounter.patient == id)
    }

    pub fn patient_ids(&self) -> BTreeSet<&PatientId> {
        self.patients.iter().map(|patient| &patient.id).collect()
    }

    /// Removes an event. Callers resync links afterwards.
    pub fn remove_event(&mut self, id: &EventId) -> Option<Event> {
        let index = self.events.iter().position(|event| &event.id == id)?;
        Some(self.events.remove(index))
    }

    pub fn resync_links(&mut self) {
        super::links::resync(&mut self.patients, &self.events);
    }

    /// Every id already present in the set, across all record kinds.
    pub fn record_ids(&self) -> BTreeSet<String> {
        self.patients
            .iter()
            .map(|patient| patient.id.0.clone())
            .chain(self.events.iter().map(|event| event.id.0.clone()))
            .chain(self.encounters.iter().map(|encounter| encounter.id.0.clone()))
            .chain(self.questionnaires.iter().map(|response| response.id.0.clone()))
            .collect()
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    None
}
