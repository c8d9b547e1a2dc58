use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::domain::{Event, EventId, Patient, PatientId};

/// Recompute every patient's attended-event set from the event list.
///
/// Always a total replacement: the result depends only on `events`, so the call is
/// idempotent and insensitive to event order. References to unknown patients are ignored
/// here; the suggestion engine reports them.
pub fn resync(patients: &mut [Patient], events: &[Event]) {
    let mut index: BTreeMap<&PatientId, BTreeSet<EventId>> = BTreeMap::new();
    for event in events {
        for patient_id in &event.patients {
            index
                .entry(patient_id)
                .or_default()
                .insert(event.id.clone());
        }
    }

    for patient in patients.iter_mut() {
        patient.attended_events = index.get(&patient.id).cloned().unwrap_or_default();
    }

    let known: BTreeSet<&PatientId> = patients.iter().map(|patient| &patient.id).collect();
    let dangling = index.keys().filter(|id| !known.contains(*id)).count();
    debug!(
        patients = patients.len(),
        events = events.len(),
        dangling,
        "resynced attended-event links"
    );
}
