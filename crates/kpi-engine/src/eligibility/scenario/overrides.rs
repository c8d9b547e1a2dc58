use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::super::domain::{Encounter, Event, Patient, ProgramKind, QuestionnaireResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    Event,
    Encounter,
    Questionnaire,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Event => "event",
            Self::Encounter => "encounter",
            Self::Questionnaire => "questionnaire",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "patient" | "patients" | "resident" => Some(Self::Patient),
            "event" | "events" => Some(Self::Event),
            "encounter" | "encounters" | "contact" => Some(Self::Encounter),
            "questionnaire" | "questionnaires" => Some(Self::Questionnaire),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Signed whole number that must fit an `i32`.
    Integer,
    /// Non-negative whole number that must fit a `u32`.
    Count,
    Text,
    Date,
    Flag,
}

impl FieldType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Count => "count",
            Self::Text => "text",
            Self::Date => "date",
            Self::Flag => "flag",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Flag(bool),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    fn fits(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (FieldValue::Integer(value), FieldType::Integer) => i32::try_from(*value).is_ok(),
            (FieldValue::Integer(value), FieldType::Count) => u32::try_from(*value).is_ok(),
            (FieldValue::Text(_), FieldType::Text)
            | (FieldValue::Date(_), FieldType::Date)
            | (FieldValue::Flag(_), FieldType::Flag) => true,
            _ => false,
        }
    }

    /// Parse a raw string into the shape `field_type` expects.
    pub fn parse_as(raw: &str, field_type: FieldType) -> Option<Self> {
        let trimmed = raw.trim();
        let value = match field_type {
            FieldType::Integer | FieldType::Count => FieldValue::Integer(trimmed.parse().ok()?),
            FieldType::Text => FieldValue::Text(trimmed.to_string()),
            FieldType::Date => {
                FieldValue::Date(NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?)
            }
            FieldType::Flag => FieldValue::Flag(parse_flag(trimmed)?),
        };
        value.fits(field_type).then_some(value)
    }
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub entity: EntityKind,
    pub name: &'static str,
    pub field_type: FieldType,
}

const fn field(entity: EntityKind, name: &'static str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        entity,
        name,
        field_type,
    }
}

/// Every field an override may target. Identifiers and cross-references are deliberately
/// absent so overrides cannot break bundle links.
pub const FIELD_REGISTRY: &[FieldSpec] = &[
    field(EntityKind::Patient, "frailty_score", FieldType::Integer),
    field(EntityKind::Patient, "social_risk_score", FieldType::Integer),
    field(EntityKind::Patient, "age", FieldType::Integer),
    field(EntityKind::Patient, "buddying_start", FieldType::Date),
    field(EntityKind::Patient, "buddying_end", FieldType::Date),
    field(EntityKind::Patient, "befriending_start", FieldType::Date),
    field(EntityKind::Patient, "befriending_end", FieldType::Date),
    field(EntityKind::Event, "mode", FieldType::Text),
    field(EntityKind::Event, "start", FieldType::Text),
    field(EntityKind::Event, "end", FieldType::Text),
    field(EntityKind::Event, "duration_minutes", FieldType::Count),
    field(EntityKind::Event, "venue", FieldType::Text),
    field(EntityKind::Event, "capacity", FieldType::Count),
    field(EntityKind::Event, "purpose", FieldType::Text),
    field(EntityKind::Event, "attended", FieldType::Flag),
    field(EntityKind::Encounter, "status", FieldType::Text),
    field(EntityKind::Encounter, "timestamp", FieldType::Text),
    field(EntityKind::Encounter, "staff", FieldType::Text),
    field(EntityKind::Encounter, "referral_source", FieldType::Text),
    field(EntityKind::Encounter, "purpose", FieldType::Text),
    field(EntityKind::Encounter, "boundary", FieldType::Flag),
    field(EntityKind::Questionnaire, "completed_on", FieldType::Date),
    field(EntityKind::Questionnaire, "score", FieldType::Integer),
    field(EntityKind::Questionnaire, "remarks", FieldType::Text),
];

pub fn lookup(entity: EntityKind, name: &str) -> Option<&'static FieldSpec> {
    FIELD_REGISTRY
        .iter()
        .find(|spec| spec.entity == entity && spec.name == name)
}

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("override '{0}' must look like entity.field=value")]
    Malformed(String),
    #[error("unknown entity kind '{0}'")]
    UnknownEntity(String),
    #[error("{entity} has no overridable field '{field}'")]
    UnknownField { entity: EntityKind, field: String },
    #[error("{entity}.{field} expects a {} value, got {value:?}", .expected.label())]
    TypeMismatch {
        entity: EntityKind,
        field: &'static str,
        expected: FieldType,
        value: FieldValue,
    },
    #[error("{entity}.{field} expects a {} value, could not read '{raw}'", .expected.label())]
    InvalidValue {
        entity: EntityKind,
        field: &'static str,
        expected: FieldType,
        raw: String,
    },
}

/// A validated `(entity kind, field, value)` triple applied after generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOverride {
    entity: EntityKind,
    field: &'static str,
    value: FieldValue,
}

impl FieldOverride {
    pub fn new(entity: EntityKind, field: &str, value: FieldValue) -> Result<Self, OverrideError> {
        let spec = lookup(entity, field).ok_or_else(|| OverrideError::UnknownField {
            entity,
            field: field.to_string(),
        })?;

        if !value.fits(spec.field_type) {
            return Err(OverrideError::TypeMismatch {
                entity,
                field: spec.name,
                expected: spec.field_type,
                value,
            });
        }

        Ok(Self {
            entity,
            field: spec.name,
            value,
        })
    }

    /// Parse `entity.field=value`, typing the value from the registry.
    pub fn parse(raw: &str) -> Result<Self, OverrideError> {
        let (target, value) = raw
            .split_once('=')
            .ok_or_else(|| OverrideError::Malformed(raw.to_string()))?;
        let (entity, field) = target
            .trim()
            .split_once('.')
            .ok_or_else(|| OverrideError::Malformed(raw.to_string()))?;

        let entity = EntityKind::from_label(entity)
            .ok_or_else(|| OverrideError::UnknownEntity(entity.trim().to_string()))?;
        let field = field.trim();
        let spec = lookup(entity, field).ok_or_else(|| OverrideError::UnknownField {
            entity,
            field: field.to_string(),
        })?;

        let value = FieldValue::parse_as(value, spec.field_type).ok_or_else(|| {
            OverrideError::InvalidValue {
                entity,
                field: spec.name,
                expected: spec.field_type,
                raw: value.to_string(),
            }
        })?;

        Ok(Self {
            entity,
            field: spec.name,
            value,
        })
    }

    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub(crate) fn apply<T: Overridable>(&self, target: &mut T) {
        if self.entity == T::KIND {
            target.set_field(self.field, &self.value);
        }
    }
}

impl fmt::Display for FieldOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}={:?}", self.entity, self.field, self.value)
    }
}

/// Records an override can be applied to. Field names arrive pre-validated against
/// [`FIELD_REGISTRY`].
pub(crate) trait Overridable {
    const KIND: EntityKind;

    fn set_field(&mut self, field: &str, value: &FieldValue);
}

fn unmatched(kind: EntityKind, field: &str, value: &FieldValue) {
    warn!(entity = %kind, field, ?value, "override did not match a settable field");
}

impl Overridable for Patient {
    const KIND: EntityKind = EntityKind::Patient;

    fn set_field(&mut self, field: &str, value: &FieldValue) {
        match (field, value) {
            ("frailty_score", FieldValue::Integer(v)) => {
                self.frailty_score = i32::try_from(*v).unwrap_or(self.frailty_score)
            }
            ("social_risk_score", FieldValue::Integer(v)) => {
                self.social_risk_score = i32::try_from(*v).unwrap_or(self.social_risk_score)
            }
            ("age", FieldValue::Integer(v)) => self.age = i32::try_from(*v).unwrap_or(self.age),
            ("buddying_start", FieldValue::Date(d)) => {
                self.enrollment_mut(ProgramKind::Buddying).start = Some(*d)
            }
            ("buddying_end", FieldValue::Date(d)) => {
                self.enrollment_mut(ProgramKind::Buddying).end = Some(*d)
            }
            ("befriending_start", FieldValue::Date(d)) => {
                self.enrollment_mut(ProgramKind::Befriending).start = Some(*d)
            }
            ("befriending_end", FieldValue::Date(d)) => {
                self.enrollment_mut(ProgramKind::Befriending).end = Some(*d)
            }
            _ => unmatched(Self::KIND, field, value),
        }
    }
}

impl Overridable for Event {
    const KIND: EntityKind = EntityKind::Event;

    fn set_field(&mut self, field: &str, value: &FieldValue) {
        match (field, value) {
            ("mode", FieldValue::Text(v)) => self.mode = v.clone(),
            ("start", FieldValue::Text(v)) => self.start = v.clone(),
            ("end", FieldValue::Text(v)) => self.end = v.clone(),
            ("duration_minutes", FieldValue::Integer(v)) => {
                self.duration_minutes = u32::try_from(*v).unwrap_or(self.duration_minutes)
            }
            ("venue", FieldValue::Text(v)) => self.venue = v.clone(),
            ("capacity", FieldValue::Integer(v)) => {
                self.capacity = u32::try_from(*v).unwrap_or(self.capacity)
            }
            ("purpose", FieldValue::Text(v)) => self.purpose = v.clone(),
            ("attended", FieldValue::Flag(v)) => self.attended = *v,
            _ => unmatched(Self::KIND, field, value),
        }
    }
}

impl Overridable for Encounter {
    const KIND: EntityKind = EntityKind::Encounter;

    fn set_field(&mut self, field: &str, value: &FieldValue) {
        match (field, value) {
            ("status", FieldValue::Text(v)) => self.status = v.clone(),
            ("timestamp", FieldValue::Text(v)) => self.timestamp = v.clone(),
            ("staff", FieldValue::Text(v)) => self.staff = v.clone(),
            ("referral_source", FieldValue::Text(v)) => self.referral_source = v.clone(),
            ("purpose", FieldValue::Text(v)) => self.purpose = v.clone(),
            ("boundary", FieldValue::Flag(v)) => self.boundary = *v,
            _ => unmatched(Self::KIND, field, value),
        }
    }
}

impl Overridable for QuestionnaireResponse {
    const KIND: EntityKind = EntityKind::Questionnaire;

    fn set_field(&mut self, field: &str, value: &FieldValue) {
        match (field, value) {
            ("completed_on", FieldValue::Date(d)) => self.completed_on = Some(*d),
            ("score", FieldValue::Integer(v)) => self.score = i32::try_from(*v).unwrap_or(self.score),
            ("remarks", FieldValue::Text(v)) => self.remarks = v.clone(),
            _ => unmatched(Self::KIND, field, value),
        }
    }
}
