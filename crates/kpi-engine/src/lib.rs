//! Eligibility classification and scenario synthesis for community-care KPI reporting.
//!
//! The engine works against a caller-owned [`eligibility::WorkingSet`]: synthesize records,
//! resync patient/event links, classify every patient into a KPI tier, then ask the
//! suggestion engine which patients sit close to a threshold.

pub mod config;
pub mod eligibility;
pub mod error;
pub mod telemetry;
