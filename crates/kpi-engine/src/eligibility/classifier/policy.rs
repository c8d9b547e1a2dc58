use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::super::domain::{Diagnostic, DiagnosticKind, Patient, RecordRef, Verdict};
use super::rules::{RuleContext, RuleEvaluation, RuleId, RULES};
use super::{ClassificationOutcome, RuleMiss};

const VALID_FRAILTY: std::ops::RangeInclusive<i32> = 1..=9;
const VALID_AGE: std::ops::RangeInclusive<i32> = 0..=130;

/// Audit line for every rule that applied to a patient, whether or not it decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule: RuleId,
    pub qualified: bool,
    pub notes: String,
}

impl RuleTrace {
    fn from_evaluation(evaluation: &RuleEvaluation) -> Self {
        let notes = evaluation
            .checks
            .iter()
            .map(|check| {
                format!(
                    "{} {} of {} required between {}",
                    check.actual,
                    check.metric.label(),
                    check.required,
                    evaluation.window
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            rule: evaluation.rule,
            qualified: evaluation.qualified(),
            notes: format!("{} -> {}: {notes}", evaluation.rule.label(), evaluation.candidate.label()),
        }
    }
}

pub(crate) fn input_diagnostics(patient: &Patient) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let reference = RecordRef::Patient(patient.id.clone());

    if !VALID_FRAILTY.contains(&patient.frailty_score) {
        diagnostics.push(Diagnostic {
            reference: reference.clone(),
            kind: DiagnosticKind::InvalidFrailtyScore {
                score: patient.frailty_score,
            },
        });
    }

    if !VALID_AGE.contains(&patient.age) {
        diagnostics.push(Diagnostic {
            reference,
            kind: DiagnosticKind::InvalidAge { age: patient.age },
        });
    }

    diagnostics
}

pub(crate) fn decide_outcome(ctx: &RuleContext<'_>) -> ClassificationOutcome {
    let patient_id = ctx.patient.id.clone();
    let diagnostics = input_diagnostics(ctx.patient);

    if !diagnostics.is_empty() {
        return ClassificationOutcome {
            patient_id,
            verdict: Verdict::UNCLASSIFIED,
            candidate: None,
            rule: None,
            window: None,
            checks: Vec::new(),
            missed: Vec::new(),
            trail: Vec::new(),
            diagnostics,
        };
    }

    let mut trail = Vec::new();
    let mut missed = Vec::new();
    let mut unparsable = BTreeSet::new();

    for rule in &RULES {
        let Some(evaluation) = (rule.evaluate)(ctx) else {
            continue;
        };

        trail.push(RuleTrace::from_evaluation(&evaluation));
        unparsable.extend(evaluation.tally.unparsable.iter().cloned());

        let qualified = evaluation.qualified();
        if !qualified && evaluation.falls_through {
            missed.push(RuleMiss {
                rule: evaluation.rule,
                candidate: evaluation.candidate,
                window: evaluation.window,
                checks: evaluation.checks,
            });
            continue;
        }

        return ClassificationOutcome {
            patient_id,
            verdict: if qualified {
                evaluation.candidate
            } else {
                Verdict::UNCLASSIFIED
            },
            candidate: Some(evaluation.candidate),
            rule: Some(rule.id),
            window: Some(evaluation.window),
            checks: evaluation.checks,
            missed,
            trail,
            diagnostics: timestamp_diagnostics(ctx, unparsable),
        };
    }

    ClassificationOutcome {
        patient_id,
        verdict: Verdict::UNCLASSIFIED,
        candidate: None,
        rule: None,
        window: None,
        checks: Vec::new(),
        missed,
        trail,
        diagnostics: timestamp_diagnostics(ctx, unparsable),
    }
}

fn timestamp_diagnostics(ctx: &RuleContext<'_>, unparsable: BTreeSet<RecordRef>) -> Vec<Diagnostic> {
    unparsable
        .into_iter()
        .map(|reference| {
            let raw = match &reference {
                RecordRef::Event(id) => ctx
                    .events
                    .iter()
                    .find(|event| &event.id == id)
                    .map(|event| event.start.clone()),
                RecordRef::Encounter(id) => ctx
                    .encounters
                    .iter()
                    .find(|encounter| &encounter.id == id)
                    .map(|encounter| encounter.timestamp.clone()),
                _ => None,
            }
            .unwrap_or_default();

            Diagnostic {
                reference,
                kind: DiagnosticKind::UnparsableTimestamp { raw },
            }
        })
        .collect()
}
