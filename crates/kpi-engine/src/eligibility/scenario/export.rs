use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::spec::GeneratedBundle;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write aggregate rows to {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Record count and written file for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryExport {
    pub count: usize,
    pub path: Option<PathBuf>,
}

/// What a bundle export wrote, for the downstream converter to pick up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub residents: CategoryExport,
    pub volunteers: CategoryExport,
    pub events: CategoryExport,
    pub encounters: CategoryExport,
    pub questionnaires: CategoryExport,
    pub organizations: CategoryExport,
    pub locations: CategoryExport,
    pub aggregate_rows: CategoryExport,
}

impl ExportManifest {
    pub fn total_records(&self) -> usize {
        [
            &self.residents,
            &self.volunteers,
            &self.events,
            &self.encounters,
            &self.questionnaires,
            &self.organizations,
            &self.locations,
        ]
        .iter()
        .map(|category| category.count)
        .sum()
    }
}

/// Write each non-empty category of `bundle` into `dir`, followed by `manifest.json`.
///
/// Staff, referral sources and venues carry no records of their own, so their categories are
/// the distinct names found on encounters and events.
pub fn write_bundle(bundle: &GeneratedBundle, dir: &Path) -> Result<ExportManifest, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let volunteers: Vec<&str> = bundle
        .encounters
        .iter()
        .map(|encounter| encounter.staff.as_str())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let organizations: Vec<&str> = bundle
        .encounters
        .iter()
        .map(|encounter| encounter.referral_source.as_str())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let locations: Vec<&str> = bundle
        .events
        .iter()
        .map(|event| event.venue.as_str())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let manifest = ExportManifest {
        residents: write_json(dir, "residents.json", &bundle.patients)?,
        volunteers: write_json(dir, "volunteers.json", &volunteers)?,
        events: write_json(dir, "events.json", &bundle.events)?,
        encounters: write_json(dir, "encounters.json", &bundle.encounters)?,
        questionnaires: write_json(dir, "questionnaires.json", &bundle.questionnaires)?,
        organizations: write_json(dir, "organizations.json", &organizations)?,
        locations: write_json(dir, "locations.json", &locations)?,
        aggregate_rows: write_rows(dir, bundle)?,
    };

    let manifest_path = dir.join("manifest.json");
    write_pretty(&manifest_path, &manifest)?;

    info!(
        dir = %dir.display(),
        records = manifest.total_records(),
        "bundle exported"
    );

    Ok(manifest)
}

fn write_json<T: Serialize>(
    dir: &Path,
    file_name: &str,
    records: &[T],
) -> Result<CategoryExport, ExportError> {
    let count = records.len();
    if count == 0 {
        return Ok(CategoryExport::default());
    }

    let path = dir.join(file_name);
    write_pretty(&path, records)?;
    debug!(path = %path.display(), count, "wrote category");

    Ok(CategoryExport {
        count,
        path: Some(path),
    })
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ExportError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_rows(dir: &Path, bundle: &GeneratedBundle) -> Result<CategoryExport, ExportError> {
    if bundle.aggregate_rows.is_empty() {
        return Ok(CategoryExport::default());
    }

    let path = dir.join("aggregate_rows.csv");
    let csv_error = |source| ExportError::Csv {
        path: path.clone(),
        source,
    };

    let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
    for row in &bundle.aggregate_rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(CategoryExport {
        count: bundle.aggregate_rows.len(),
        path: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FiscalYear;
    use crate::eligibility::scenario::{ScenarioSpec, ScenarioSynthesizer};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kpi-engine-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_every_populated_category() {
        let mut spec = ScenarioSpec::new("export");
        spec.attendance_count = Some(3);
        spec.contact_log_count = Some(2);
        let bundle = ScenarioSynthesizer::new(FiscalYear::starting(2024))
            .generate(&[spec])
            .expect("bundle generates");

        let dir = scratch_dir("export");
        let manifest = write_bundle(&bundle, &dir).expect("bundle exports");

        assert_eq!(manifest.residents.count, 1);
        assert_eq!(manifest.events.count, 3);
        assert_eq!(manifest.encounters.count, 2);
        assert_eq!(manifest.questionnaires.count, 1);
        assert_eq!(manifest.volunteers.count, 1);
        assert_eq!(manifest.organizations.count, 1);
        assert_eq!(manifest.locations.count, 1);
        assert_eq!(manifest.aggregate_rows.count, 1);
        assert!(manifest
            .events
            .path
            .as_ref()
            .is_some_and(|path| path.exists()));
        assert!(dir.join("manifest.json").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn skips_empty_categories() {
        let dir = scratch_dir("empty");
        let manifest = write_bundle(&GeneratedBundle::default(), &dir).expect("empty bundle exports");

        assert_eq!(manifest, ExportManifest::default());
        assert!(!dir.join("events.json").exists());
        assert!(dir.join("manifest.json").exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
