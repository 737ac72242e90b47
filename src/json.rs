use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::*;

/// Client-facing shape of an appointment: RFC3339 instants, snake_case fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentJson {
    pub id: Ulid,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: Status,
    pub notes: String,
    pub reschedule_count: u32,
    pub original_scheduled_at: Option<DateTime<Utc>>,
    pub last_rescheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&Appointment> for AppointmentJson {
    fn from(a: &Appointment) -> Self {
        Self {
            id: a.id,
            property_id: a.property_id,
            user_id: a.user_id,
            agent_id: a.agent_id,
            scheduled_at: to_utc(a.scheduled_at),
            duration_minutes: a.duration_minutes,
            status: a.status,
            notes: a.notes.clone(),
            reschedule_count: a.reschedule_count,
            original_scheduled_at: a.original_scheduled_at.map(to_utc),
            last_rescheduled_at: a.last_rescheduled_at.map(to_utc),
            created_at: to_utc(a.created_at),
            version: a.version,
        }
    }
}

pub fn to_utc(ms: Ms) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub fn from_rfc3339(s: &str) -> Result<Ms, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.timestamp_millis())
}

pub fn to_json(appointment: &Appointment) -> serde_json::Result<String> {
    serde_json::to_string(&AppointmentJson::from(appointment))
}
