use super::domain::{DateWindow, Patient, ProgramKind};
use crate::config::FiscalYear;

/// Resolve the attendance window for a program-scoped tier.
///
/// Returns `[enrollment start, min(enrollment end, fiscal-year end)]`, substituting the
/// fiscal-year bounds for missing dates. `None` when the patient is not enrolled or the
/// window is empty or lies entirely outside the fiscal year.
pub fn resolve(patient: &Patient, program: ProgramKind, fiscal_year: &FiscalYear) -> Option<DateWindow> {
    let enrollment = patient.enrollment(program)?;

    let start = enrollment.start.unwrap_or(fiscal_year.start);
    let end = enrollment
        .end
        .map_or(fiscal_year.end, |end| end.min(fiscal_year.end));
    let window = DateWindow::new(start, end);

    if window.is_empty() || !window.overlaps(&fiscal_year.window()) {
        return None;
    }

    Some(window)
}
