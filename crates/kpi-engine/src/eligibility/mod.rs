//! Attendance-based KPI eligibility: counting, windowing, classification, link upkeep,
//! near-miss suggestions and scenario synthesis.

pub mod attendance;
pub mod classifier;
pub mod domain;
pub mod links;
pub mod scenario;
pub mod suggestions;
pub mod window;

#[cfg(test)]
mod tests;

pub use attendance::{AttendanceTally, ModePredicate};
pub use classifier::{
    ClassificationOutcome, Classifier, Metric, RuleId, RuleMiss, RuleTrace, ThresholdCheck,
};
pub use domain::{
    DateWindow, Diagnostic, DiagnosticKind, Encounter, EncounterId, Event, EventId, EventMode,
    KpiSubgroup, KpiTier, Patient, PatientId, ProgramEnrollment, ProgramKind,
    QuestionnaireId, QuestionnaireResponse, RecordRef, Verdict, WorkingSet,
};
pub use scenario::{
    AggregateRow, EntityKind, FieldOverride, FieldValue, GeneratedBundle, ScenarioSpec,
    ScenarioSynthesizer,
};
pub use suggestions::{Suggestion, SuggestionEngine, SuggestionKind};
