use serde::{Deserialize, Serialize};

use super::super::attendance::{self, AttendanceTally, ModePredicate};
use super::super::domain::{
    DateWindow, Encounter, Event, KpiSubgroup, KpiTier, Patient, ProgramKind, Verdict,
};
use super::super::window;
use crate::config::{ClassifierCutoffs, ThresholdConfig};

/// Rows of the classification table, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    Befriending,
    Buddying,
    FrailtyBand,
}

impl RuleId {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Befriending => "befriending program",
            Self::Buddying => "buddying program",
            Self::FrailtyBand => "frailty band",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InPersonEvents,
    Contacts,
}

impl Metric {
    pub const fn label(self) -> &'static str {
        match self {
            Self::InPersonEvents => "in-person event(s)",
            Self::Contacts => "contact(s)",
        }
    }
}

/// One `actual >= required` comparison made by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub metric: Metric,
    pub required: u32,
    pub actual: u32,
}

impl ThresholdCheck {
    pub fn met(&self) -> bool {
        self.actual >= self.required
    }

    pub fn shortfall(&self) -> u32 {
        self.required.saturating_sub(self.actual)
    }

    pub fn surplus(&self) -> u32 {
        self.actual.saturating_sub(self.required)
    }
}

/// What a rule concluded for a patient it applied to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuleEvaluation {
    pub rule: RuleId,
    pub candidate: Verdict,
    pub window: DateWindow,
    pub checks: Vec<ThresholdCheck>,
    pub tally: AttendanceTally,
    /// Whether a miss hands over to the next rule instead of ending evaluation.
    pub falls_through: bool,
}

impl RuleEvaluation {
    pub fn qualified(&self) -> bool {
        self.checks.iter().all(ThresholdCheck::met)
    }
}

pub(crate) struct RuleContext<'a> {
    pub patient: &'a Patient,
    pub events: &'a [Event],
    pub encounters: &'a [Encounter],
    pub thresholds: &'a ThresholdConfig,
    pub cutoffs: &'a ClassifierCutoffs,
    pub predicate: &'a ModePredicate,
}

impl RuleContext<'_> {
    fn in_person(&self, window: DateWindow) -> AttendanceTally {
        attendance::tally(&self.patient.id, self.events, window, self.predicate)
    }

    fn encounters(&self, window: DateWindow) -> AttendanceTally {
        attendance::tally_encounters(&self.patient.id, self.encounters, window)
    }

    fn social_risk_flag(&self) -> bool {
        self.patient.social_risk_score > self.cutoffs.social_risk_cutoff
    }
}

pub(crate) struct Rule {
    pub id: RuleId,
    pub evaluate: fn(&RuleContext<'_>) -> Option<RuleEvaluation>,
}

/// Evaluated top-down; the first rule that applies and either qualifies or refuses to fall
/// through decides the verdict.
pub(crate) const RULES: [Rule; 3] = [
    Rule {
        id: RuleId::Befriending,
        evaluate: befriending,
    },
    Rule {
        id: RuleId::Buddying,
        evaluate: buddying,
    },
    Rule {
        id: RuleId::FrailtyBand,
        evaluate: frailty_band,
    },
];

fn befriending(ctx: &RuleContext<'_>) -> Option<RuleEvaluation> {
    let window = window::resolve(ctx.patient, ProgramKind::Befriending, &ctx.thresholds.fiscal_year)?;

    let in_person = ctx.in_person(window);
    let encounters = ctx.encounters(window);
    let in_person_count = in_person.count;
    let tally = in_person.merge(encounters);

    Some(RuleEvaluation {
        rule: RuleId::Befriending,
        candidate: Verdict::new(KpiTier::Befriending, None),
        window,
        checks: vec![
            ThresholdCheck {
                metric: Metric::InPersonEvents,
                required: ctx.thresholds.befriending_min_in_person,
                actual: in_person_count,
            },
            ThresholdCheck {
                metric: Metric::Contacts,
                required: ctx.thresholds.befriending_min_contacts,
                actual: tally.count,
            },
        ],
        tally,
        falls_through: false,
    })
}

fn buddying(ctx: &RuleContext<'_>) -> Option<RuleEvaluation> {
    let window = window::resolve(ctx.patient, ProgramKind::Buddying, &ctx.thresholds.fiscal_year)?;
    let tally = ctx.in_person(window);

    Some(RuleEvaluation {
        rule: RuleId::Buddying,
        candidate: Verdict::new(KpiTier::Buddying, None),
        window,
        checks: vec![ThresholdCheck {
            metric: Metric::InPersonEvents,
            required: ctx.thresholds.buddying_min_in_person,
            actual: tally.count,
        }],
        tally,
        falls_through: true,
    })
}

fn frailty_band(ctx: &RuleContext<'_>) -> Option<RuleEvaluation> {
    let score = ctx.patient.frailty_score;
    let thresholds = ctx.thresholds;
    let social_risk = ctx.social_risk_flag();

    let (candidate, required) = match score {
        1..=3 => (
            Verdict::new(KpiTier::Robust, Some(KpiSubgroup::Group1)),
            thresholds.robust_min_in_person,
        ),
        4..=5 if social_risk => (
            Verdict::new(KpiTier::Robust, Some(KpiSubgroup::Group2)),
            thresholds.robust_min_in_person,
        ),
        4..=5 => (
            Verdict::new(KpiTier::Robust, Some(KpiSubgroup::Group1)),
            ctx.cutoffs.robust_relaxed_min_in_person,
        ),
        6..=9 if score >= ctx.cutoffs.very_frail_score || social_risk => (
            Verdict::new(KpiTier::Frail, Some(KpiSubgroup::Group2)),
            thresholds.frail_min_in_person,
        ),
        6..=9 => (
            Verdict::new(KpiTier::Frail, Some(KpiSubgroup::Group1)),
            thresholds.frail_min_in_person,
        ),
        _ => return None,
    };

    let window = thresholds.fiscal_year.window();
    let tally = ctx.in_person(window);

    Some(RuleEvaluation {
        rule: RuleId::FrailtyBand,
        candidate,
        window,
        checks: vec![ThresholdCheck {
            metric: Metric::InPersonEvents,
            required,
            actual: tally.count,
        }],
        tally,
        falls_through: false,
    })
}
