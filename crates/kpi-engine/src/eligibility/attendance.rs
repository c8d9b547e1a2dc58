use super::domain::{DateWindow, Encounter, Event, EventMode, PatientId, RecordRef};

/// Selects events by exact, case-insensitive membership of their mode label in a fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModePredicate {
    labels: Vec<String>,
}

impl ModePredicate {
    /// The in-person-like modes that count towards attendance thresholds.
    pub fn in_person() -> Self {
        Self::from_labels(
            EventMode::ordered()
                .into_iter()
                .filter(|mode| mode.is_in_person())
                .map(EventMode::label),
        )
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|label| label.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, mode: &str) -> bool {
        let mode = mode.trim().to_ascii_lowercase();
        self.labels.iter().any(|label| *label == mode)
    }
}

impl Default for ModePredicate {
    fn default() -> Self {
        Self::in_person()
    }
}

/// Count of qualifying records plus the records skipped for unparsable timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceTally {
    pub count: u32,
    pub unparsable: Vec<RecordRef>,
}

impl AttendanceTally {
    pub fn merge(mut self, other: AttendanceTally) -> Self {
        self.count += other.count;
        self.unparsable.extend(other.unparsable);
        self
    }
}

/// Attended events referencing `patient_id` whose mode matches `predicate` and whose start
/// date falls inside `window`.
pub fn count(
    patient_id: &PatientId,
    events: &[Event],
    window: DateWindow,
    predicate: &ModePredicate,
) -> u32 {
    tally(patient_id, events, window, predicate).count
}

/// Like [`count`], but also reports matching events whose start could not be parsed.
pub fn tally(
    patient_id: &PatientId,
    events: &[Event],
    window: DateWindow,
    predicate: &ModePredicate,
) -> AttendanceTally {
    let mut tally = AttendanceTally::default();

    for event in events {
        if !event.attended || !event.references(patient_id) || !predicate.matches(&event.mode) {
            continue;
        }

        match event.started_on() {
            Some(date) if window.contains(date) => tally.count += 1,
            Some(_) => {}
            None => tally.unparsable.push(RecordRef::Event(event.id.clone())),
        }
    }

    tally
}

/// Encounters for `patient_id` dated inside `window`.
pub fn count_encounters(patient_id: &PatientId, encounters: &[Encounter], window: DateWindow) -> u32 {
    tally_encounters(patient_id, encounters, window).count
}

/// Encounters for `patient_id` inside `window`. Encounters never count as in-person events,
/// only as contacts.
pub fn tally_encounters(
    patient_id: &PatientId,
    encounters: &[Encounter],
    window: DateWindow,
) -> AttendanceTally {
    let mut tally = AttendanceTally::default();

    for encounter in encounters.iter().filter(|e| &e.patient == patient_id) {
        match encounter.occurred_on() {
            Some(date) if window.contains(date) => tally.count += 1,
            Some(_) => {}
            None => tally
                .unparsable
                .push(RecordRef::Encounter(encounter.id.clone())),
        }
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::domain::EventId;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn event(id: &str, mode: &str, start: &str, patients: &[&str]) -> Event {
        Event {
            id: EventId(id.to_string()),
            mode: mode.to_string(),
            start: start.to_string(),
            end: String::new(),
            duration_minutes: 60,
            venue: "Hall".to_string(),
            capacity: 10,
            patients: patients
                .iter()
                .map(|id| PatientId(id.to_string()))
                .collect(),
            purpose: "Exercise".to_string(),
            attended: true,
        }
    }

    #[test]
    fn counts_only_in_person_events_inside_inclusive_window() {
        let patient = PatientId("p1".to_string());
        let window = DateWindow::new(date(2024, 4, 1), date(2025, 3, 31));
        let events = vec![
            event("e1", "In-Person", "2024-04-01T10:00:00", &["p1"]),
            event("e2", "in-person", "2025-03-31", &["p1", "p2"]),
            event("e3", "Telephone", "2024-05-01", &["p1"]),
            event("e4", "In-Person", "2025-04-01", &["p1"]),
            event("e5", "In-Person", "2024-06-01", &["p2"]),
        ];

        assert_eq!(
            count(&patient, &events, window, &ModePredicate::in_person()),
            2
        );
    }

    #[test]
    fn skips_unattended_events() {
        let patient = PatientId("p1".to_string());
        let window = DateWindow::new(date(2024, 4, 1), date(2025, 3, 31));
        let mut missed = event("e1", "In-Person", "2024-05-01", &["p1"]);
        missed.attended = false;

        assert_eq!(
            count(&patient, &[missed], window, &ModePredicate::in_person()),
            0
        );
    }

    #[test]
    fn unparsable_timestamps_are_excluded_and_reported() {
        let patient = PatientId("p1".to_string());
        let window = DateWindow::new(date(2024, 4, 1), date(2025, 3, 31));
        let events = vec![
            event("e1", "Home Visit", "2024-07-01", &["p1"]),
            event("e2", "Home Visit", "01/07/2024", &["p1"]),
        ];

        let tally = tally(&patient, &events, window, &ModePredicate::in_person());
        assert_eq!(tally.count, 1);
        assert_eq!(
            tally.unparsable,
            vec![RecordRef::Event(EventId("e2".to_string()))]
        );
    }

    #[test]
    fn membership_is_exact_not_substring() {
        let predicate = ModePredicate::from_labels(["In-Person"]);
        assert!(predicate.matches("IN-PERSON"));
        assert!(!predicate.matches("In-Person (virtual)"));
        assert!(!predicate.matches(""));
    }

    #[test]
    fn encounters_count_by_date_and_patient() {
        let encounter = |id: &str, patient: &str, timestamp: &str| Encounter {
            id: crate::eligibility::domain::EncounterId(id.to_string()),
            status: "finished".to_string(),
            timestamp: timestamp.to_string(),
            staff: String::new(),
            referral_source: String::new(),
            purpose: String::new(),
            boundary: false,
            patient: PatientId(patient.to_string()),
        };
        let encounters = vec![
            encounter("c1", "p1", "2024-06-01T09:00:00"),
            encounter("c2", "p1", "2024-09-01T09:00:00"),
            encounter("c3", "p2", "2024-06-02T09:00:00"),
            encounter("c4", "p1", "yesterday"),
        ];
        let window = DateWindow::new(date(2024, 6, 1), date(2024, 8, 31));

        assert_eq!(count_encounters(&PatientId("p1".to_string()), &encounters, window), 1);
        let tally = tally_encounters(&PatientId("p1".to_string()), &encounters, window);
        assert_eq!(
            tally.unparsable,
            vec![RecordRef::Encounter(crate::eligibility::domain::EncounterId("c4".to_string()))]
        );
    }
}
