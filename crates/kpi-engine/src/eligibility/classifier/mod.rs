mod policy;
mod rules;

pub use policy::RuleTrace;
pub use rules::{Metric, RuleId, ThresholdCheck};

use super::attendance::ModePredicate;
use super::domain::{
    DateWindow, Diagnostic, DiagnosticKind, Encounter, Event, Patient, PatientId, Verdict, WorkingSet,
};
use crate::config::{ClassifierCutoffs, ThresholdConfig};
use policy::decide_outcome;
use rules::RuleContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Applies the ordered rule table to patients. Holds no per-run state, so the same inputs
/// always produce the same verdict.
#[derive(Debug, Clone)]
pub struct Classifier {
    thresholds: ThresholdConfig,
    cutoffs: ClassifierCutoffs,
    predicate: ModePredicate,
}

impl Classifier {
    pub fn new(thresholds: ThresholdConfig, cutoffs: ClassifierCutoffs) -> Self {
        Self {
            thresholds,
            cutoffs,
            predicate: ModePredicate::in_person(),
        }
    }

    pub fn with_predicate(mut self, predicate: ModePredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn cutoffs(&self) -> &ClassifierCutoffs {
        &self.cutoffs
    }

    pub fn predicate(&self) -> &ModePredicate {
        &self.predicate
    }

    /// Classify one patient without touching it.
    pub fn evaluate(
        &self,
        patient: &Patient,
        events: &[Event],
        encounters: &[Encounter],
    ) -> ClassificationOutcome {
        let ctx = RuleContext {
            patient,
            events,
            encounters,
            thresholds: &self.thresholds,
            cutoffs: &self.cutoffs,
            predicate: &self.predicate,
        };

        let outcome = decide_outcome(&ctx);
        for diagnostic in &outcome.diagnostics {
            warn!(patient = %patient.id, "{}", diagnostic.message());
        }
        debug!(
            patient = %patient.id,
            verdict = %outcome.verdict.label(),
            rule = ?outcome.rule,
            "classified patient"
        );
        outcome
    }

    /// Classify every patient in the working set and write tier/subgroup back onto it.
    pub fn classify_all(&self, working_set: &mut WorkingSet) -> Vec<ClassificationOutcome> {
        let WorkingSet {
            patients,
            events,
            encounters,
            ..
        } = working_set;
        let events: &[Event] = events;
        let encounters: &[Encounter] = encounters;

        let outcomes: Vec<ClassificationOutcome> = patients
            .iter_mut()
            .map(|patient| {
                let outcome = self.evaluate(patient, events, encounters);
                patient.kpi_tier = Some(outcome.verdict.tier);
                patient.kpi_subgroup = outcome.verdict.subgroup;
                outcome
            })
            .collect();

        let classified = outcomes
            .iter()
            .filter(|outcome| outcome.verdict.is_classified())
            .count();
        info!(
            patients = outcomes.len(),
            classified,
            unclassified = outcomes.len() - classified,
            "classification run complete"
        );

        outcomes
    }
}

/// Verdict plus the evidence trail behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub patient_id: PatientId,
    pub verdict: Verdict,
    /// Tier the deciding rule was testing for, even when its thresholds were missed.
    pub candidate: Option<Verdict>,
    pub rule: Option<RuleId>,
    pub window: Option<DateWindow>,
    pub checks: Vec<ThresholdCheck>,
    /// Program rules that applied, missed, and handed over to a later rule.
    #[serde(default)]
    pub missed: Vec<RuleMiss>,
    pub trail: Vec<RuleTrace>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMiss {
    pub rule: RuleId,
    pub candidate: Verdict,
    pub window: DateWindow,
    pub checks: Vec<ThresholdCheck>,
}

impl ClassificationOutcome {
    /// Checks the deciding rule failed.
    pub fn deficits(&self) -> impl Iterator<Item = &ThresholdCheck> {
        self.checks.iter().filter(|check| !check.met())
    }

    /// The deciding rule met every check.
    pub fn qualified(&self) -> bool {
        self.candidate.is_some() && self.candidate == Some(self.verdict)
    }

    pub fn has_invalid_input(&self) -> bool {
        self.diagnostics.iter().any(|diagnostic| {
            matches!(
                diagnostic.kind,
                DiagnosticKind::InvalidFrailtyScore { .. } | DiagnosticKind::InvalidAge { .. }
            )
        })
    }
}
