use std::env;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::eligibility::domain::DateWindow;

/// Distinguishes runtime behavior for different stages of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the engine and its CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub thresholds: ThresholdConfig,
    pub cutoffs: ClassifierCutoffs,
    pub suggestions: SuggestionConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let default_year = FiscalYear::containing(Local::now().date_naive());
        let fiscal_year = FiscalYear::new(
            read_date("KPI_FISCAL_YEAR_START")?.unwrap_or(default_year.start),
            read_date("KPI_FISCAL_YEAR_END")?.unwrap_or(default_year.end),
        )?;

        let thresholds = ThresholdConfig {
            robust_min_in_person: read_count("KPI_ROBUST_MIN_IN_PERSON", 2)?,
            frail_min_in_person: read_count("KPI_FRAIL_MIN_IN_PERSON", 6)?,
            buddying_min_in_person: read_count("KPI_BUDDYING_MIN_IN_PERSON", 6)?,
            befriending_min_in_person: read_count("KPI_BEFRIENDING_MIN_IN_PERSON", 12)?,
            befriending_min_contacts: read_count("KPI_BEFRIENDING_MIN_CONTACTS", 52)?,
            fiscal_year,
        };

        let defaults = ClassifierCutoffs::default();
        let cutoffs = ClassifierCutoffs {
            very_frail_score: read_signed("KPI_VERY_FRAIL_SCORE", defaults.very_frail_score)?,
            social_risk_cutoff: read_signed("KPI_SOCIAL_RISK_CUTOFF", defaults.social_risk_cutoff)?,
            robust_relaxed_min_in_person: read_count(
                "KPI_ROBUST_RELAXED_MIN_IN_PERSON",
                defaults.robust_relaxed_min_in_person,
            )?,
        };

        let suggestions = SuggestionConfig {
            margin: read_count("KPI_SUGGESTION_MARGIN", SuggestionConfig::default().margin)?,
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            thresholds,
            cutoffs,
            suggestions,
            telemetry: TelemetryConfig { log_level },
        })
    }
}

/// Reporting period attendance is counted against. Defaults to 1 April – 31 March.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYear {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalYear {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedFiscalYear { start, end });
        }
        Ok(Self { start, end })
    }

    /// The April-to-March year beginning in `year`.
    pub fn starting(year: i32) -> Self {
        let start = NaiveDate::from_ymd_opt(year, 4, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(year + 1, 3, 31).unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }

    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= 4 {
            Self::starting(date.year())
        } else {
            Self::starting(date.year() - 1)
        }
    }

    pub fn window(&self) -> DateWindow {
        DateWindow::new(self.start, self.end)
    }
}

impl From<DateWindow> for FiscalYear {
    fn from(window: DateWindow) -> Self {
        Self {
            start: window.start,
            end: window.end,
        }
    }
}

/// Named attendance minimums per tier plus the fiscal-year bounds they apply to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub robust_min_in_person: u32,
    pub frail_min_in_person: u32,
    pub buddying_min_in_person: u32,
    pub befriending_min_in_person: u32,
    pub befriending_min_contacts: u32,
    pub fiscal_year: FiscalYear,
}

impl ThresholdConfig {
    /// Observed production minimums for the given fiscal year.
    pub fn standard(fiscal_year: FiscalYear) -> Self {
        Self {
            robust_min_in_person: 2,
            frail_min_in_person: 6,
            buddying_min_in_person: 6,
            befriending_min_in_person: 12,
            befriending_min_contacts: 52,
            fiscal_year,
        }
    }

    /// Validate thresholds read from an untyped source such as a JSON file.
    pub fn from_raw(raw: RawThresholdConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            robust_min_in_person: non_negative("robust_min_in_person", raw.robust_min_in_person)?,
            frail_min_in_person: non_negative("frail_min_in_person", raw.frail_min_in_person)?,
            buddying_min_in_person: non_negative(
                "buddying_min_in_person",
                raw.buddying_min_in_person,
            )?,
            befriending_min_in_person: non_negative(
                "befriending_min_in_person",
                raw.befriending_min_in_person,
            )?,
            befriending_min_contacts: non_negative(
                "befriending_min_contacts",
                raw.befriending_min_contacts,
            )?,
            fiscal_year: FiscalYear::new(raw.fiscal_year_start, raw.fiscal_year_end)?,
        })
    }

    /// Read a JSON threshold document from disk.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let raw: RawThresholdConfig = serde_json::from_reader(BufReader::new(file))?;
        Self::from_raw(raw)
    }
}

/// Unvalidated threshold document; signed so negative values can be reported instead of
/// failing inside the deserializer.
#[derive(Debug, Clone, Deserialize)]
pub struct RawThresholdConfig {
    pub robust_min_in_person: i64,
    pub frail_min_in_person: i64,
    pub buddying_min_in_person: i64,
    pub befriending_min_in_person: i64,
    pub befriending_min_contacts: i64,
    pub fiscal_year_start: NaiveDate,
    pub fiscal_year_end: NaiveDate,
}

/// Cutoffs routing the Robust and Frail bands into their second subgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierCutoffs {
    /// Frailty scores at or above this value are "Very Frail".
    pub very_frail_score: i32,
    /// Social-risk scores strictly above this value set the social-risk flag.
    pub social_risk_cutoff: i32,
    /// Minimum for frailty 4-5 patients routed to Robust Group 1.
    pub robust_relaxed_min_in_person: u32,
}

impl Default for ClassifierCutoffs {
    fn default() -> Self {
        Self {
            very_frail_score: 7,
            social_risk_cutoff: 3,
            robust_relaxed_min_in_person: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// How far from a threshold (in events or contacts) a patient may be and still get a
    /// suggestion.
    pub margin: u32,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self { margin: 2 }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    NonNumeric { name: String, value: String },
    Negative { name: String, value: i64 },
    OutOfRange { name: String, value: i64 },
    InvalidDate { name: String, value: String },
    InvertedFiscalYear { start: NaiveDate, end: NaiveDate },
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonNumeric { name, value } => {
                write!(f, "{name} must be a whole number (found '{value}')")
            }
            ConfigError::Negative { name, value } => {
                write!(f, "{name} must not be negative (found {value})")
            }
            ConfigError::OutOfRange { name, value } => {
                write!(f, "{name} is out of range (found {value})")
            }
            ConfigError::InvalidDate { name, value } => {
                write!(f, "{name} must be a YYYY-MM-DD date (found '{value}')")
            }
            ConfigError::InvertedFiscalYear { start, end } => {
                write!(f, "fiscal year start {start} is after its end {end}")
            }
            ConfigError::Io(err) => write!(f, "failed to read threshold file: {err}"),
            ConfigError::Json(err) => write!(f, "invalid threshold file: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

fn read_signed(name: &str, default: i32) -> Result<i32, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::NonNumeric {
            name: name.to_string(),
            value: raw.clone(),
        })?;
    i32::try_from(value).map_err(|_| ConfigError::OutOfRange {
        name: name.to_string(),
        value,
    })
}

fn read_count(name: &str, default: u32) -> Result<u32, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::NonNumeric {
            name: name.to_string(),
            value: raw.clone(),
        })?;
    non_negative(name, value)
}

fn read_date(name: &str) -> Result<Option<NaiveDate>, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ConfigError::InvalidDate {
            name: name.to_string(),
            value: raw,
        })
}

fn non_negative(name: &str, value: i64) -> Result<u32, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Negative {
            name: name.to_string(),
            value,
        });
    }
    u32::try_from(value).map_err(|_| ConfigError::OutOfRange {
        name: name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARS: [&str; 13] = [
        "APP_ENV",
        "APP_LOG_LEVEL",
        "KPI_ROBUST_MIN_IN_PERSON",
        "KPI_FRAIL_MIN_IN_PERSON",
        "KPI_BUDDYING_MIN_IN_PERSON",
        "KPI_BEFRIENDING_MIN_IN_PERSON",
        "KPI_BEFRIENDING_MIN_CONTACTS",
        "KPI_FISCAL_YEAR_START",
        "KPI_FISCAL_YEAR_END",
        "KPI_VERY_FRAIL_SCORE",
        "KPI_SOCIAL_RISK_CUTOFF",
        "KPI_ROBUST_RELAXED_MIN_IN_PERSON",
        "KPI_SUGGESTION_MARGIN",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in VARS {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_observed_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.thresholds.robust_min_in_person, 2);
        assert_eq!(config.thresholds.frail_min_in_person, 6);
        assert_eq!(config.thresholds.buddying_min_in_person, 6);
        assert_eq!(config.thresholds.befriending_min_in_person, 12);
        assert_eq!(config.thresholds.befriending_min_contacts, 52);
        assert_eq!(config.thresholds.fiscal_year.start.month(), 4);
        assert_eq!(config.thresholds.fiscal_year.start.day(), 1);
        assert_eq!(config.thresholds.fiscal_year.end.month(), 3);
        assert_eq!(config.thresholds.fiscal_year.end.day(), 31);
        assert_eq!(config.cutoffs, ClassifierCutoffs::default());
        assert_eq!(config.suggestions.margin, 2);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn load_rejects_negative_threshold() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KPI_FRAIL_MIN_IN_PERSON", "-1");
        match AppConfig::load() {
            Err(ConfigError::Negative { name, value }) => {
                assert_eq!(name, "KPI_FRAIL_MIN_IN_PERSON");
                assert_eq!(value, -1);
            }
            other => panic!("expected negative threshold error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn load_rejects_non_numeric_threshold() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KPI_BEFRIENDING_MIN_CONTACTS", "fifty-two");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::NonNumeric { .. })
        ));
        reset_env();
    }

    #[test]
    fn load_rejects_inverted_fiscal_year() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KPI_FISCAL_YEAR_START", "2025-04-01");
        env::set_var("KPI_FISCAL_YEAR_END", "2025-03-31");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvertedFiscalYear { .. })
        ));
        reset_env();
    }

    #[test]
    fn fiscal_year_containing_wraps_at_april() {
        let march = NaiveDate::from_ymd_opt(2025, 3, 31).expect("valid date");
        let april = NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date");
        assert_eq!(FiscalYear::containing(march), FiscalYear::starting(2024));
        assert_eq!(FiscalYear::containing(april), FiscalYear::starting(2025));
        assert_eq!(FiscalYear::starting(2024).window().days(), 365);
    }

    #[test]
    fn raw_thresholds_reject_negative_values() {
        let raw: RawThresholdConfig = serde_json::from_str(
            r#"{
                "robust_min_in_person": 2,
                "frail_min_in_person": 6,
                "buddying_min_in_person": -6,
                "befriending_min_in_person": 12,
                "befriending_min_contacts": 52,
                "fiscal_year_start": "2024-04-01",
                "fiscal_year_end": "2025-03-31"
            }"#,
        )
        .expect("raw thresholds parse");
        match ThresholdConfig::from_raw(raw) {
            Err(ConfigError::Negative { name, .. }) => assert_eq!(name, "buddying_min_in_person"),
            other => panic!("expected negative threshold error, got {other:?}"),
        }
    }

    #[test]
    fn threshold_file_must_exist() {
        let missing = std::env::temp_dir().join("kpi-engine-missing-thresholds.json");
        assert!(matches!(
            ThresholdConfig::from_path(&missing),
            Err(ConfigError::Io(_))
        ));
    }
}
