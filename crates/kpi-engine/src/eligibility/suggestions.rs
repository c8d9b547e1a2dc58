use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::{ClassificationOutcome, Classifier, ThresholdCheck};
use super::domain::{
    DateWindow, Diagnostic, DiagnosticKind, PatientId, RecordRef, Verdict, WorkingSet,
};
use crate::config::{FiscalYear, SuggestionConfig};

const DATA_QUALITY_PENALTY: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Shortfall,
    Surplus,
    InvalidInput,
    UnparsableTimestamp,
    DanglingReference,
}

impl SuggestionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Shortfall => "Shortfall",
            Self::Surplus => "Surplus",
            Self::InvalidInput => "Invalid Input",
            Self::UnparsableTimestamp => "Unparsable Timestamp",
            Self::DanglingReference => "Dangling Reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub reference: RecordRef,
    pub kind: SuggestionKind,
    pub message: String,
    pub confidence: f32,
}

/// Finds patients near a threshold and proposes the smallest edit that changes their
/// standing. Never mutates the working set.
#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    classifier: Classifier,
    margin: u32,
}

impl SuggestionEngine {
    pub fn new(classifier: Classifier, config: SuggestionConfig) -> Self {
        Self {
            classifier,
            margin: config.margin,
        }
    }

    pub fn margin(&self) -> u32 {
        self.margin
    }

    /// Suggestions for `working_set` with attendance counted over `window` instead of the
    /// configured fiscal year. Ordered by confidence, highest first.
    pub fn suggest(&self, working_set: &WorkingSet, window: DateWindow) -> Vec<Suggestion> {
        let mut thresholds = self.classifier.thresholds().clone();
        thresholds.fiscal_year = FiscalYear::from(window);
        let classifier = Classifier::new(thresholds, *self.classifier.cutoffs())
            .with_predicate(self.classifier.predicate().clone());

        let scan = scan_data_quality(working_set);
        let mut suggestions: Vec<Suggestion> = scan
            .diagnostics
            .iter()
            .map(|diagnostic| Suggestion {
                reference: diagnostic.reference.clone(),
                kind: match diagnostic.kind {
                    DiagnosticKind::DanglingReference { .. } => SuggestionKind::DanglingReference,
                    _ => SuggestionKind::UnparsableTimestamp,
                },
                message: diagnostic.message(),
                confidence: 1.0,
            })
            .collect();

        for patient in &working_set.patients {
            let outcome =
                classifier.evaluate(patient, &working_set.events, &working_set.encounters);
            let issues = scan.issues_by_patient.get(&patient.id).copied().unwrap_or(0);
            suggestions.extend(self.suggest_for(&outcome, issues));
        }

        suggestions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.reference.cmp(&b.reference))
                .then_with(|| a.kind.cmp(&b.kind))
        });

        debug!(
            suggestions = suggestions.len(),
            margin = self.margin,
            %window,
            "suggestion pass complete"
        );

        suggestions
    }

    fn suggest_for(&self, outcome: &ClassificationOutcome, issues: u32) -> Vec<Suggestion> {
        let reference = RecordRef::Patient(outcome.patient_id.clone());

        if outcome.has_invalid_input() {
            return outcome
                .diagnostics
                .iter()
                .map(|diagnostic| Suggestion {
                    reference: reference.clone(),
                    kind: SuggestionKind::InvalidInput,
                    message: diagnostic.message(),
                    confidence: 1.0,
                })
                .collect();
        }

        let mut suggestions: Vec<Suggestion> = outcome
            .missed
            .iter()
            .flat_map(|miss| self.shortfalls(&reference, miss.candidate, &miss.checks, miss.window, issues))
            .collect();

        let (Some(candidate), Some(window)) = (outcome.candidate, outcome.window) else {
            return suggestions;
        };

        if !outcome.qualified() {
            suggestions.extend(self.shortfalls(&reference, candidate, &outcome.checks, window, issues));
            return suggestions;
        }

        suggestions.extend(outcome.checks.iter().filter_map(|check| {
            let distance = check.surplus();
            (distance <= self.margin).then(|| Suggestion {
                reference: reference.clone(),
                kind: SuggestionKind::Surplus,
                message: describe(SuggestionKind::Surplus, candidate, check, window),
                confidence: self.confidence(distance, issues),
            })
        }));
        suggestions
    }

    /// Unmet checks within the margin. Met checks of a missed tier say nothing useful.
    fn shortfalls(
        &self,
        reference: &RecordRef,
        candidate: Verdict,
        checks: &[ThresholdCheck],
        window: DateWindow,
        issues: u32,
    ) -> Vec<Suggestion> {
        checks
            .iter()
            .filter(|check| !check.met() && check.shortfall() <= self.margin)
            .map(|check| Suggestion {
                reference: reference.clone(),
                kind: SuggestionKind::Shortfall,
                message: describe(SuggestionKind::Shortfall, candidate, check, window),
                confidence: self.confidence(check.shortfall(), issues),
            })
            .collect()
    }

    fn confidence(&self, distance: u32, issues: u32) -> f32 {
        let proximity = 1.0 - distance as f32 / (self.margin as f32 + 1.0);
        let penalty = DATA_QUALITY_PENALTY * issues as f32;
        (proximity - penalty).clamp(0.0, 1.0)
    }
}

fn describe(kind: SuggestionKind, candidate: Verdict, check: &ThresholdCheck, window: DateWindow) -> String {
    let metric = check.metric.label();
    match kind {
        SuggestionKind::Shortfall => format!(
            "{} needs {} {metric} between {window}; found {}. Add {} {metric} on or before {}.",
            candidate.label(),
            check.required,
            check.actual,
            check.shortfall(),
            window.end
        ),
        _ => format!(
            "{} holds with {} {metric} against a minimum of {} between {window}; {} to spare before the tier is lost.",
            candidate.label(),
            check.actual,
            check.required,
            check.surplus()
        ),
    }
}

struct DataQualityScan {
    diagnostics: Vec<Diagnostic>,
    issues_by_patient: BTreeMap<PatientId, u32>,
}

fn scan_data_quality(working_set: &WorkingSet) -> DataQualityScan {
    let known: BTreeSet<&PatientId> = working_set.patient_ids();
    let mut diagnostics = Vec::new();
    let mut issues_by_patient: BTreeMap<PatientId, u32> = BTreeMap::new();

    for event in &working_set.events {
        let reference = RecordRef::Event(event.id.clone());
        let mut flagged = false;

        if event.started_on().is_none() {
            diagnostics.push(Diagnostic {
                reference: reference.clone(),
                kind: DiagnosticKind::UnparsableTimestamp {
                    raw: event.start.clone(),
                },
            });
            flagged = true;
        }

        for patient in event.patients.iter().filter(|id| !known.contains(id)) {
            diagnostics.push(Diagnostic {
                reference: reference.clone(),
                kind: DiagnosticKind::DanglingReference {
                    patient: patient.clone(),
                },
            });
            flagged = true;
        }

        if flagged {
            for patient in event.patients.iter().filter(|id| known.contains(id)) {
                *issues_by_patient.entry(patient.clone()).or_default() += 1;
            }
        }
    }

    for encounter in &working_set.encounters {
        let reference = RecordRef::Encounter(encounter.id.clone());

        if !known.contains(&encounter.patient) {
            diagnostics.push(Diagnostic {
                reference,
                kind: DiagnosticKind::DanglingReference {
                    patient: encounter.patient.clone(),
                },
            });
            continue;
        }

        if encounter.occurred_on().is_none() {
            diagnostics.push(Diagnostic {
                reference,
                kind: DiagnosticKind::UnparsableTimestamp {
                    raw: encounter.timestamp.clone(),
                },
            });
            *issues_by_patient.entry(encounter.patient.clone()).or_default() += 1;
        }
    }

    DataQualityScan {
        diagnostics,
        issues_by_patient,
    }
}
