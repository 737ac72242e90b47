//! Business rules, free of I/O. Every function takes "now" explicitly.

use crate::limits::*;
use crate::model::*;
use crate::validator::FieldErrors;

use super::{NewAppointment, SchedulingError};

fn check_duration(v: &mut FieldErrors, minutes: u32) {
    v.check(minutes > 0, "duration_minutes", "must be positive");
    v.check(minutes <= MAX_DURATION_MINUTES, "duration_minutes", "must not exceed 8 hours");
}

/// Start times must sit in 1970..=9999.
pub(super) fn check_scheduled_at(v: &mut FieldErrors, scheduled_at: Ms) {
    v.check(
        (0..=MAX_SCHEDULED_AT).contains(&scheduled_at),
        "scheduled_at",
        "must be between 1970 and 9999",
    );
}

/// Validate a booking request, collecting every field error.
/// Returns the effective duration.
pub fn validate_new(req: &NewAppointment, now: Ms) -> Result<u32, FieldErrors> {
    let duration = req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);

    let mut v = FieldErrors::new();
    v.check(req.property_id > 0, "property_id", "must be provided");
    v.check(req.user_id > 0, "user_id", "must be provided");
    v.check(req.agent_id > 0, "agent_id", "must be provided");
    v.check(req.scheduled_at > now, "scheduled_at", "must be in the future");
    check_scheduled_at(&mut v, req.scheduled_at);
    check_duration(&mut v, duration);
    v.check(
        req.notes.chars().count() <= MAX_NOTES_LEN,
        "notes",
        "must not exceed 1000 characters",
    );
    v.into_result()?;
    Ok(duration)
}

/// Fail-fast reschedule checks, in priority order. Returns the effective duration.
pub fn validate_reschedule(
    current: &Appointment,
    new_scheduled_at: Ms,
    new_duration_minutes: Option<u32>,
    now: Ms,
) -> Result<u32, SchedulingError> {
    if current.reschedule_count >= MAX_RESCHEDULES {
        return Err(SchedulingError::MaxReschedulesReached { limit: MAX_RESCHEDULES });
    }
    if !current.is_active() {
        return Err(SchedulingError::NotEditable { status: current.status });
    }
    if new_scheduled_at <= now {
        return Err(SchedulingError::InvalidScheduleTime {
            field: "scheduled_at",
            message: "must be in the future",
        });
    }
    if new_scheduled_at > MAX_SCHEDULED_AT {
        return Err(SchedulingError::InvalidScheduleTime {
            field: "scheduled_at",
            message: "must be between 1970 and 9999",
        });
    }
    if new_scheduled_at == current.scheduled_at {
        return Err(SchedulingError::InvalidScheduleTime {
            field: "scheduled_at",
            message: "new time must be different from current time",
        });
    }
    // Measured against the slot being left, not the new one.
    if now >= current.scheduled_at - MIN_RESCHEDULE_NOTICE_MS {
        return Err(SchedulingError::InvalidScheduleTime {
            field: "scheduled_at",
            message: "must reschedule at least 2 hours before appointment",
        });
    }

    let duration = new_duration_minutes.unwrap_or(current.duration_minutes);
    let mut v = FieldErrors::new();
    check_duration(&mut v, duration);
    v.into_result()?;
    Ok(duration)
}

/// Forward-only lifecycle: pending → confirmed → completed, cancellable
/// until terminal.
pub fn check_transition(from: Status, to: Status) -> Result<(), SchedulingError> {
    if to == Status::Pending {
        return Err(FieldErrors::single("status", "must be confirmed, cancelled or completed").into());
    }
    if from.is_terminal() {
        return Err(SchedulingError::NotEditable { status: from });
    }
    match (from, to) {
        (Status::Pending, Status::Confirmed)
        | (Status::Pending, Status::Cancelled)
        | (Status::Confirmed, Status::Cancelled)
        | (Status::Confirmed, Status::Completed) => Ok(()),
        _ => Err(SchedulingError::InvalidTransition { from, to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const NOW: Ms = 1_000 * H;

    fn request() -> NewAppointment {
        NewAppointment {
            property_id: 3,
            user_id: 5,
            agent_id: 7,
            scheduled_at: NOW + 24 * H,
            duration_minutes: None,
            notes: String::new(),
        }
    }

    fn scheduled(at: Ms) -> Appointment {
        test_appointment(7, at, 60)
    }

    #[test]
    fn new_defaults_duration() {
        assert_eq!(validate_new(&request(), NOW), Ok(60));
    }

    #[test]
    fn new_collects_every_field() {
        let req = NewAppointment {
            property_id: 0,
            user_id: 0,
            agent_id: 0,
            scheduled_at: NOW,
            duration_minutes: Some(481),
            notes: "x".repeat(1001),
        };
        let errors = validate_new(&req, NOW).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert_eq!(errors.get("scheduled_at"), Some("must be in the future"));
        assert_eq!(errors.get("duration_minutes"), Some("must not exceed 8 hours"));
        assert_eq!(errors.get("agent_id"), Some("must be provided"));
        assert_eq!(errors.get("notes"), Some("must not exceed 1000 characters"));
    }

    #[test]
    fn new_rejects_unrepresentable_times() {
        let mut req = request();
        req.scheduled_at = i64::MAX - 1000;
        assert_eq!(
            validate_new(&req, NOW).unwrap_err().get("scheduled_at"),
            Some("must be between 1970 and 9999")
        );
        req.scheduled_at = MAX_SCHEDULED_AT;
        assert!(validate_new(&req, NOW).is_ok());
    }

    #[test]
    fn reschedule_rejects_unrepresentable_times() {
        let a = scheduled(NOW + 24 * H);
        let err = validate_reschedule(&a, MAX_SCHEDULED_AT + 1, None, NOW).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidScheduleTime { message: "must be between 1970 and 9999", .. }
        ));
    }

    #[test]
    fn new_duration_bounds() {
        let mut req = request();
        req.duration_minutes = Some(0);
        assert_eq!(
            validate_new(&req, NOW).unwrap_err().get("duration_minutes"),
            Some("must be positive")
        );
        req.duration_minutes = Some(480);
        assert_eq!(validate_new(&req, NOW), Ok(480));
    }

    #[test]
    fn notes_limit_counts_characters() {
        let mut req = request();
        req.notes = "é".repeat(1000);
        assert!(validate_new(&req, NOW).is_ok());
    }

    #[test]
    fn reschedule_limit_checked_first() {
        let mut a = scheduled(NOW + 24 * H);
        a.reschedule_count = 3;
        a.status = Status::Cancelled;
        // Even an otherwise invalid request reports the limit.
        let err = validate_reschedule(&a, NOW - H, Some(0), NOW).unwrap_err();
        assert!(matches!(err, SchedulingError::MaxReschedulesReached { limit: 3 }));
    }

    #[test]
    fn reschedule_requires_active_status() {
        let mut a = scheduled(NOW + 24 * H);
        a.status = Status::Completed;
        let err = validate_reschedule(&a, NOW + 48 * H, None, NOW).unwrap_err();
        assert!(matches!(err, SchedulingError::NotEditable { status: Status::Completed }));
    }

    #[test]
    fn reschedule_time_rules_in_order() {
        let a = scheduled(NOW + 24 * H);

        let err = validate_reschedule(&a, NOW, None, NOW).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidScheduleTime { message: "must be in the future", .. }));

        let err = validate_reschedule(&a, a.scheduled_at, None, NOW).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidScheduleTime { message: "new time must be different from current time", .. }
        ));

        let soon = scheduled(NOW + 2 * H);
        let err = validate_reschedule(&soon, NOW + 48 * H, None, NOW).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidScheduleTime {
                message: "must reschedule at least 2 hours before appointment",
                ..
            }
        ));

        let ok = scheduled(NOW + 2 * H + 1);
        assert_eq!(validate_reschedule(&ok, NOW + 48 * H, None, NOW).unwrap(), 60);
    }

    #[test]
    fn reschedule_duration_checked_last() {
        let a = scheduled(NOW + 24 * H);
        let err = validate_reschedule(&a, NOW + 48 * H, Some(500), NOW).unwrap_err();
        let SchedulingError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("duration_minutes"), Some("must not exceed 8 hours"));
        assert_eq!(validate_reschedule(&a, NOW + 48 * H, Some(15), NOW).unwrap(), 15);
    }

    #[test]
    fn transitions() {
        use Status::*;
        assert!(check_transition(Pending, Confirmed).is_ok());
        assert!(check_transition(Pending, Cancelled).is_ok());
        assert!(check_transition(Confirmed, Completed).is_ok());
        assert!(check_transition(Confirmed, Cancelled).is_ok());

        assert!(matches!(
            check_transition(Pending, Completed),
            Err(SchedulingError::InvalidTransition { from: Pending, to: Completed })
        ));
        assert!(matches!(
            check_transition(Confirmed, Confirmed),
            Err(SchedulingError::InvalidTransition { .. })
        ));
        assert!(matches!(
            check_transition(Cancelled, Confirmed),
            Err(SchedulingError::NotEditable { status: Cancelled })
        ));
        assert!(matches!(
            check_transition(Completed, Cancelled),
            Err(SchedulingError::NotEditable { status: Completed })
        ));
        assert!(matches!(
            check_transition(Confirmed, Pending),
            Err(SchedulingError::Validation(_))
        ));
    }
}
