//! Scenario synthesis: declarative test scenarios in, linked records out.

mod export;
mod overrides;
mod parser;
mod spec;
mod synthesizer;

pub use export::{write_bundle, CategoryExport, ExportError, ExportManifest};
pub use overrides::{
    lookup, EntityKind, FieldOverride, FieldSpec, FieldType, FieldValue, OverrideError,
    FIELD_REGISTRY,
};
pub use parser::{parse_csv, parse_json};
pub use spec::{AggregateRow, GeneratedBundle, ScenarioSpec};
pub use synthesizer::{generate, ScenarioSynthesizer};

use super::domain::WorkingSet;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read scenario sheet: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read scenario json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scenario io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("row {row}: column '{column}' has unreadable value '{value}'")]
    InvalidCell {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("scenario #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
    #[error("generated id '{0}' is already in use")]
    IdCollision(String),
}

impl WorkingSet {
    /// Add a generated bundle's records and rebuild attendance links.
    pub fn absorb(&mut self, bundle: GeneratedBundle) {
        self.patients.extend(bundle.patients);
        self.events.extend(bundle.events);
        self.encounters.extend(bundle.encounters);
        self.questionnaires.extend(bundle.questionnaires);
        self.resync_links();
    }
}
