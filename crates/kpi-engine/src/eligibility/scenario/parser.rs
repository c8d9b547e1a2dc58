use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::super::domain::ProgramKind;
use super::overrides::parse_flag;
use super::spec::ScenarioSpec;
use super::ScenarioError;

/// Read scenario rows from a CSV sheet with one scenario per row.
///
/// Blank cells leave the field unset. Cells that cannot be read are reported with their
/// 1-based data row and column header.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<ScenarioSpec>, ScenarioError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut scenarios = Vec::new();

    for (index, record) in csv_reader.deserialize::<ScenarioRow>().enumerate() {
        let row = record?;
        scenarios.push(row.into_spec(index + 1)?);
    }

    Ok(scenarios)
}

pub fn parse_json<R: Read>(reader: R) -> Result<Vec<ScenarioSpec>, ScenarioError> {
    Ok(serde_json::from_reader(reader)?)
}

#[derive(Debug, Deserialize)]
struct ScenarioRow {
    #[serde(rename = "Scenario", default, deserialize_with = "empty_string_as_none")]
    scenario: Option<String>,
    #[serde(rename = "Seniors", default, deserialize_with = "empty_string_as_none")]
    seniors: Option<String>,
    #[serde(rename = "Frailty Score", default, deserialize_with = "empty_string_as_none")]
    frailty_score: Option<String>,
    #[serde(rename = "Event Mode", default, deserialize_with = "empty_string_as_none")]
    event_mode: Option<String>,
    #[serde(rename = "Session Date", default, deserialize_with = "empty_string_as_none")]
    session_date: Option<String>,
    #[serde(rename = "Attendance", default, deserialize_with = "empty_string_as_none")]
    attendance: Option<String>,
    #[serde(rename = "Boundary", default, deserialize_with = "empty_string_as_none")]
    boundary: Option<String>,
    #[serde(rename = "Contact Purpose", default, deserialize_with = "empty_string_as_none")]
    contact_purpose: Option<String>,
    #[serde(rename = "Contact Date", default, deserialize_with = "empty_string_as_none")]
    contact_date: Option<String>,
    #[serde(rename = "Age", default, deserialize_with = "empty_string_as_none")]
    age: Option<String>,
    #[serde(rename = "Remarks", default, deserialize_with = "empty_string_as_none")]
    remarks: Option<String>,
    #[serde(rename = "Contact Logs", default, deserialize_with = "empty_string_as_none")]
    contact_logs: Option<String>,
    #[serde(rename = "Social Risk", default, deserialize_with = "empty_string_as_none")]
    social_risk: Option<String>,
    #[serde(rename = "Program", default, deserialize_with = "empty_string_as_none")]
    program: Option<String>,
    #[serde(rename = "Program Start", default, deserialize_with = "empty_string_as_none")]
    program_start: Option<String>,
    #[serde(rename = "Program End", default, deserialize_with = "empty_string_as_none")]
    program_end: Option<String>,
}

impl ScenarioRow {
    fn into_spec(self, row: usize) -> Result<ScenarioSpec, ScenarioError> {
        let cell = Cell { row };
        Ok(ScenarioSpec {
            scenario_id: self.scenario,
            seniors: cell.parse("Seniors", self.seniors)?,
            frailty_score: cell.parse("Frailty Score", self.frailty_score)?,
            event_mode: self.event_mode,
            session_date: cell.date("Session Date", self.session_date)?,
            attendance_count: cell.parse("Attendance", self.attendance)?,
            boundary: cell.with("Boundary", self.boundary, parse_flag)?,
            contact_purpose: self.contact_purpose,
            contact_date: cell.date("Contact Date", self.contact_date)?,
            age: cell.parse("Age", self.age)?,
            remarks: self.remarks,
            contact_log_count: cell.parse("Contact Logs", self.contact_logs)?,
            social_risk_score: cell.parse("Social Risk", self.social_risk)?,
            program: cell.with("Program", self.program, ProgramKind::from_label)?,
            program_start: cell.date("Program Start", self.program_start)?,
            program_end: cell.date("Program End", self.program_end)?,
        })
    }
}

struct Cell {
    row: usize,
}

impl Cell {
    fn with<T>(
        &self,
        column: &'static str,
        raw: Option<String>,
        convert: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ScenarioError> {
        raw.map(|value| {
            convert(&value).ok_or(ScenarioError::InvalidCell {
                row: self.row,
                column,
                value,
            })
        })
        .transpose()
    }

    fn parse<T: std::str::FromStr>(
        &self,
        column: &'static str,
        raw: Option<String>,
    ) -> Result<Option<T>, ScenarioError> {
        self.with(column, raw, |value| value.trim().parse().ok())
    }

    fn date(&self, column: &'static str, raw: Option<String>) -> Result<Option<NaiveDate>, ScenarioError> {
        self.with(column, raw, |value| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SHEET: &str = "\
Scenario,Seniors,Frailty Score,Event Mode,Session Date,Attendance,Boundary,Contact Purpose,Contact Date,Age,Remarks,Contact Logs,Program,Program Start,Program End
robust-boundary,1,2,In-Person,2024-05-06,2,no,Wellbeing check,2024-05-06,72,exact minimum,,,,
befriending,1,4,Home Visit,2024-06-01,13,yes,Befriending call,2024-06-01,81,,47,befriending,2024-06-01,2024-08-31
";

    #[test]
    fn parses_rows_with_blank_cells() {
        let scenarios = parse_csv(Cursor::new(SHEET)).expect("sheet parses");
        assert_eq!(scenarios.len(), 2);

        let robust = &scenarios[0];
        assert_eq!(robust.identifier(), Some("robust-boundary"));
        assert_eq!(robust.frailty_score, Some(2));
        assert_eq!(robust.attendance_count, Some(2));
        assert_eq!(robust.boundary, Some(false));
        assert_eq!(robust.contact_log_count, None);
        assert_eq!(robust.program, None);

        let befriending = &scenarios[1];
        assert_eq!(befriending.program, Some(ProgramKind::Befriending));
        assert_eq!(befriending.contact_log_count, Some(47));
        assert_eq!(
            befriending.program_end,
            NaiveDate::from_ymd_opt(2024, 8, 31)
        );
    }

    #[test]
    fn reports_unreadable_cells_with_position() {
        let sheet = "Scenario,Attendance\nbad,many\n";
        match parse_csv(Cursor::new(sheet)) {
            Err(ScenarioError::InvalidCell { row, column, value }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "Attendance");
                assert_eq!(value, "many");
            }
            other => panic!("expected invalid cell error, got {other:?}"),
        }
    }
}
