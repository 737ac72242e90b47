use ulid::Ulid;

use crate::model::*;

/// Active appointments on `calendar` that overlap `span`, skipping `exclude`
/// (the appointment being moved never conflicts with itself).
pub fn overlapping_active<'a>(
    calendar: &'a AgentCalendar,
    span: &'a Span,
    exclude: Option<Ulid>,
) -> impl Iterator<Item = &'a Appointment> {
    calendar
        .overlapping(span)
        .filter(move |a| a.is_active() && Some(a.id) != exclude)
}

/// First conflicting appointment id, if any. The store calls this under the
/// calendar's write lock so check and write are one atomic step.
pub fn first_conflict(calendar: &AgentCalendar, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    overlapping_active(calendar, span, exclude).next().map(|a| a.id)
}
