use ulid::Ulid;

use crate::model::Status;
use crate::store::StoreError;
use crate::validator::FieldErrors;

#[derive(Debug)]
pub enum SchedulingError {
    Validation(FieldErrors),
    ScheduleConflict { conflicting_id: Ulid },
    MaxReschedulesReached { limit: u32 },
    NotEditable { status: Status },
    InvalidScheduleTime { field: &'static str, message: &'static str },
    InvalidTransition { from: Status, to: Status },
    /// The caller's version is stale. Re-read and retry.
    EditConflict(Ulid),
    NotFound(Ulid),
    /// The store did not answer in time. The write may still have committed.
    Timeout { operation: &'static str },
    Storage(StoreError),
}

impl SchedulingError {
    pub fn http_status(&self) -> u16 {
        match self {
            SchedulingError::Validation(_)
            | SchedulingError::ScheduleConflict { .. }
            | SchedulingError::MaxReschedulesReached { .. }
            | SchedulingError::NotEditable { .. }
            | SchedulingError::InvalidScheduleTime { .. }
            | SchedulingError::InvalidTransition { .. } => 422,
            SchedulingError::EditConflict(_) => 409,
            SchedulingError::NotFound(_) => 404,
            SchedulingError::Timeout { .. } | SchedulingError::Storage(_) => 500,
        }
    }

    /// Field → message map for 422 responses. Empty for other kinds.
    pub fn field_errors(&self) -> FieldErrors {
        match self {
            SchedulingError::Validation(errors) => errors.clone(),
            SchedulingError::ScheduleConflict { .. } => {
                FieldErrors::single("scheduled_at", "this time slot is already booked")
            }
            SchedulingError::MaxReschedulesReached { limit } => FieldErrors::single(
                "reschedule_count",
                format!("maximum reschedule limit ({limit}) reached"),
            ),
            SchedulingError::NotEditable { status } => {
                FieldErrors::single("status", format!("cannot be edited while {status}"))
            }
            SchedulingError::InvalidScheduleTime { field, message } => {
                FieldErrors::single(*field, *message)
            }
            SchedulingError::InvalidTransition { from, to } => {
                FieldErrors::single("status", format!("cannot change status from {from} to {to}"))
            }
            SchedulingError::EditConflict(_)
            | SchedulingError::NotFound(_)
            | SchedulingError::Timeout { .. }
            | SchedulingError::Storage(_) => FieldErrors::new(),
        }
    }

    /// Message safe to show a client. Infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            SchedulingError::EditConflict(_) => {
                "unable to update the record due to an edit conflict, please try again".into()
            }
            SchedulingError::NotFound(_) => {
                "the requested resource could not be found".into()
            }
            SchedulingError::Timeout { .. } | SchedulingError::Storage(_) => {
                "the server encountered a problem and could not process your request".into()
            }
            _ => self.field_errors().to_string(),
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SchedulingError::Validation(_) => "validation",
            SchedulingError::ScheduleConflict { .. } => "schedule_conflict",
            SchedulingError::MaxReschedulesReached { .. } => "max_reschedules",
            SchedulingError::NotEditable { .. } => "not_editable",
            SchedulingError::InvalidScheduleTime { .. } => "invalid_schedule_time",
            SchedulingError::InvalidTransition { .. } => "invalid_transition",
            SchedulingError::EditConflict(_) => "edit_conflict",
            SchedulingError::NotFound(_) => "not_found",
            SchedulingError::Timeout { .. } => "timeout",
            SchedulingError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::Validation(errors) => write!(f, "validation failed: {errors}"),
            SchedulingError::ScheduleConflict { conflicting_id } => {
                write!(f, "time slot conflicts with appointment {conflicting_id}")
            }
            SchedulingError::MaxReschedulesReached { limit } => {
                write!(f, "maximum reschedule limit ({limit}) reached")
            }
            SchedulingError::NotEditable { status } => {
                write!(f, "cannot modify a {status} appointment")
            }
            SchedulingError::InvalidScheduleTime { field, message } => {
                write!(f, "{field}: {message}")
            }
            SchedulingError::InvalidTransition { from, to } => {
                write!(f, "cannot change status from {from} to {to}")
            }
            SchedulingError::EditConflict(id) => write!(f, "edit conflict on appointment {id}"),
            SchedulingError::NotFound(id) => write!(f, "appointment not found: {id}"),
            SchedulingError::Timeout { operation } => write!(f, "store timed out during {operation}"),
            SchedulingError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for SchedulingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulingError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SchedulingError {
    fn from(e: StoreError) -> Self {
        SchedulingError::Storage(e)
    }
}

impl From<FieldErrors> for SchedulingError {
    fn from(errors: FieldErrors) -> Self {
        SchedulingError::Validation(errors)
    }
}
