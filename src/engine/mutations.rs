use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::notify::Notification;
use crate::store::{InsertOutcome, RescheduleWrite, WriteOutcome};

use super::policy::{check_transition, validate_new, validate_reschedule};
use super::{record, NewAppointment, Scheduler, SchedulingError};

impl Scheduler {
    /// Book a viewing. Validation errors are collected per field; the
    /// conflict check and the insert are one atomic store call.
    pub async fn create(&self, req: NewAppointment) -> Result<Appointment, SchedulingError> {
        let start = Instant::now();
        let result = self.try_create(req).await;
        record("create", start, &result);
        result
    }

    async fn try_create(&self, req: NewAppointment) -> Result<Appointment, SchedulingError> {
        let now = self.now();
        let duration_minutes = validate_new(&req, now)?;

        let appointment = Appointment {
            id: Ulid::new(),
            property_id: req.property_id,
            user_id: req.user_id,
            agent_id: req.agent_id,
            scheduled_at: req.scheduled_at,
            duration_minutes,
            status: Status::Pending,
            notes: req.notes,
            reschedule_count: 0,
            original_scheduled_at: None,
            last_rescheduled_at: None,
            created_at: now,
            version: 1,
        };

        match self
            .store_call("insert", self.store.insert_if_free(appointment))
            .await?
        {
            InsertOutcome::Inserted(a) => {
                info!(appointment_id = %a.id, agent_id = a.agent_id, "appointment booked");
                self.dispatch(Notification::created(&a));
                Ok(a)
            }
            InsertOutcome::Conflict(conflicting_id) => {
                debug!(agent_id = req.agent_id, %conflicting_id, "booking rejected: slot taken");
                Err(SchedulingError::ScheduleConflict { conflicting_id })
            }
        }
    }

    /// Move an appointment. `new_duration_minutes` defaults to the current
    /// duration. Fails with `EditConflict` unless `expected_version` is current.
    pub async fn reschedule(
        &self,
        id: Ulid,
        new_scheduled_at: Ms,
        new_duration_minutes: Option<u32>,
        expected_version: u64,
    ) -> Result<Appointment, SchedulingError> {
        let start = Instant::now();
        let result = self
            .try_reschedule(id, new_scheduled_at, new_duration_minutes, expected_version)
            .await;
        record("reschedule", start, &result);
        result
    }

    async fn try_reschedule(
        &self,
        id: Ulid,
        new_scheduled_at: Ms,
        new_duration_minutes: Option<u32>,
        expected_version: u64,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.now();
        let current = self.load(id).await?;
        let duration_minutes =
            validate_reschedule(&current, new_scheduled_at, new_duration_minutes, now)?;
        // Validated against this snapshot, so it must be the one the caller saw.
        if current.version != expected_version {
            return Err(SchedulingError::EditConflict(id));
        }

        let write = RescheduleWrite {
            scheduled_at: new_scheduled_at,
            duration_minutes,
            rescheduled_at: now,
        };
        let outcome = self
            .store_call(
                "reschedule",
                self.store.reschedule_if_version(id, expected_version, write),
            )
            .await?;
        let updated = resolve(id, outcome)?;
        info!(
            appointment_id = %id,
            agent_id = updated.agent_id,
            reschedule_count = updated.reschedule_count,
            "appointment rescheduled"
        );
        self.dispatch(Notification::rescheduled(current.scheduled_at, &updated));
        Ok(updated)
    }

    /// Move an appointment along its lifecycle.
    pub async fn update_status(
        &self,
        id: Ulid,
        status: Status,
        expected_version: u64,
    ) -> Result<Appointment, SchedulingError> {
        let start = Instant::now();
        let result = self.try_update_status(id, status, expected_version).await;
        record("update_status", start, &result);
        result
    }

    async fn try_update_status(
        &self,
        id: Ulid,
        status: Status,
        expected_version: u64,
    ) -> Result<Appointment, SchedulingError> {
        let current = self.load(id).await?;
        check_transition(current.status, status)?;
        if current.version != expected_version {
            return Err(SchedulingError::EditConflict(id));
        }

        let outcome = self
            .store_call(
                "update_status",
                self.store.set_status_if_version(id, expected_version, status),
            )
            .await?;
        let updated = resolve(id, outcome)?;
        info!(
            appointment_id = %id,
            agent_id = updated.agent_id,
            "appointment {} -> {}",
            current.status,
            updated.status
        );
        self.dispatch(Notification::status_changed(&updated));
        Ok(updated)
    }

    pub async fn cancel(&self, id: Ulid, expected_version: u64) -> Result<Appointment, SchedulingError> {
        self.update_status(id, Status::Cancelled, expected_version).await
    }

    /// Hard delete regardless of status. Not version-guarded, not notified.
    pub async fn delete(&self, id: Ulid) -> Result<Appointment, SchedulingError> {
        let start = Instant::now();
        let result = match self.store_call("delete", self.store.delete(id)).await {
            Ok(Some(removed)) => {
                info!(appointment_id = %id, agent_id = removed.agent_id, "appointment deleted");
                Ok(removed)
            }
            Ok(None) => Err(SchedulingError::NotFound(id)),
            Err(e) => Err(e),
        };
        record("delete", start, &result);
        result
    }

    pub(super) async fn load(&self, id: Ulid) -> Result<Appointment, SchedulingError> {
        self.store_call("get", self.store.get(id))
            .await?
            .ok_or(SchedulingError::NotFound(id))
    }
}

/// Map a conditional-write outcome onto the caller-facing error kinds.
fn resolve(id: Ulid, outcome: WriteOutcome) -> Result<Appointment, SchedulingError> {
    match outcome {
        WriteOutcome::Applied(a) => Ok(a),
        WriteOutcome::Missing => Err(SchedulingError::NotFound(id)),
        WriteOutcome::VersionMismatch { current } => {
            debug!(appointment_id = %id, current, "version mismatch");
            Err(SchedulingError::EditConflict(id))
        }
        WriteOutcome::Conflict(conflicting_id) => {
            Err(SchedulingError::ScheduleConflict { conflicting_id })
        }
    }
}
