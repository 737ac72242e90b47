use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MAX_DURATION_MS;

/// Unix milliseconds, UTC. The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

pub type AgentId = u64;
pub type UserId = u64;
pub type PropertyId = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn from_minutes(start: Ms, minutes: u32) -> Self {
        Self::new(start, start.saturating_add(minutes as Ms * MINUTE_MS))
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Confirmed,
        Status::Cancelled,
        Status::Completed,
    ];

    /// Active appointments occupy the agent's calendar.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Pending | Status::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Cancelled | Status::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Confirmed => "confirmed",
            Status::Cancelled => "cancelled",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A booked property viewing between a user and the agent owning the property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub scheduled_at: Ms,
    pub duration_minutes: u32,
    pub status: Status,
    pub notes: String,
    pub reschedule_count: u32,
    pub original_scheduled_at: Option<Ms>,
    pub last_rescheduled_at: Option<Ms>,
    pub created_at: Ms,
    /// Optimistic-concurrency token. Starts at 1, bumped by every mutation.
    pub version: u64,
}

impl Appointment {
    pub fn span(&self) -> Span {
        Span::from_minutes(self.scheduled_at, self.duration_minutes)
    }

    pub fn ends_at(&self) -> Ms {
        self.span().end
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// One agent's appointments, every status included.
#[derive(Debug, Clone)]
pub struct AgentCalendar {
    pub agent_id: AgentId,
    /// Sorted by `scheduled_at`.
    pub appointments: Vec<Appointment>,
}

impl AgentCalendar {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            appointments: Vec::new(),
        }
    }

    /// Insert maintaining sort order by `scheduled_at`.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.scheduled_at <= appointment.scheduled_at);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get(&self, id: &Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == *id)
    }

    /// Appointments (any status) whose span overlaps the query window.
    /// No appointment is longer than `MAX_DURATION_MS`, so everything starting
    /// at or before `query.start - MAX_DURATION_MS` has already ended.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let left = self
            .appointments
            .partition_point(|a| a.scheduled_at <= query.start.saturating_sub(MAX_DURATION_MS));
        let right = self
            .appointments
            .partition_point(|a| a.scheduled_at < query.end);
        self.appointments[left..right.max(left)]
            .iter()
            .filter(move |a| a.span().overlaps(query))
    }

    /// Apply a committed event. The caller holds the write lock.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::AppointmentBooked(appointment) => self.insert(appointment.clone()),
            Event::AppointmentRescheduled {
                id,
                scheduled_at,
                duration_minutes,
                rescheduled_at,
                ..
            } => {
                // Re-insert: the sort key changes.
                if let Some(mut a) = self.remove(*id) {
                    a.original_scheduled_at = a.original_scheduled_at.or(Some(a.scheduled_at));
                    a.scheduled_at = *scheduled_at;
                    a.duration_minutes = *duration_minutes;
                    a.reschedule_count += 1;
                    a.last_rescheduled_at = Some(*rescheduled_at);
                    a.version += 1;
                    self.insert(a);
                }
            }
            Event::StatusChanged { id, status, .. } => {
                if let Some(a) = self.appointments.iter_mut().find(|a| a.id == *id) {
                    a.status = *status;
                    a.version += 1;
                }
            }
            Event::AppointmentDeleted { id, .. } => {
                self.remove(*id);
            }
        }
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked(Appointment),
    AppointmentRescheduled {
        id: Ulid,
        agent_id: AgentId,
        scheduled_at: Ms,
        duration_minutes: u32,
        rescheduled_at: Ms,
    },
    StatusChanged {
        id: Ulid,
        agent_id: AgentId,
        status: Status,
    },
    AppointmentDeleted {
        id: Ulid,
        agent_id: AgentId,
    },
}

impl Event {
    pub fn agent_id(&self) -> AgentId {
        match self {
            Event::AppointmentBooked(a) => a.agent_id,
            Event::AppointmentRescheduled { agent_id, .. }
            | Event::StatusChanged { agent_id, .. }
            | Event::AppointmentDeleted { agent_id, .. } => *agent_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub total: u64,
    pub pending: u64,
    pub confirmed: u64,
    pub completed: u64,
    pub cancelled: u64,
}

impl AgentStats {
    pub fn tally<'a>(appointments: impl IntoIterator<Item = &'a Appointment>) -> Self {
        let mut stats = Self::default();
        for a in appointments {
            stats.total += 1;
            match a.status {
                Status::Pending => stats.pending += 1,
                Status::Confirmed => stats.confirmed += 1,
                Status::Completed => stats.completed += 1,
                Status::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
pub(crate) fn test_appointment(agent_id: AgentId, scheduled_at: Ms, minutes: u32) -> Appointment {
    Appointment {
        id: Ulid::new(),
        property_id: 1,
        user_id: 1,
        agent_id,
        scheduled_at,
        duration_minutes: minutes,
        status: Status::Pending,
        notes: String::new(),
        reschedule_count: 0,
        original_scheduled_at: None,
        last_rescheduled_at: None,
        created_at: 0,
        version: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_from_minutes() {
        let s = Span::from_minutes(1_000, 30);
        assert_eq!(s.duration_ms(), 30 * MINUTE_MS);
    }

    #[test]
    fn status_parse_and_display() {
        for st in Status::ALL {
            assert_eq!(st.as_str().parse::<Status>().unwrap(), st);
        }
        assert!("archived".parse::<Status>().is_err());
        assert!(Status::Confirmed.is_active());
        assert!(Status::Completed.is_terminal());
        assert!(!Status::Pending.is_terminal());
    }

    #[test]
    fn calendar_ordering() {
        let mut cal = AgentCalendar::new(7);
        cal.insert(test_appointment(7, 3 * H, 60));
        cal.insert(test_appointment(7, H, 60));
        cal.insert(test_appointment(7, 2 * H, 60));
        let starts: Vec<Ms> = cal.appointments.iter().map(|a| a.scheduled_at).collect();
        assert_eq!(starts, vec![H, 2 * H, 3 * H]);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut cal = AgentCalendar::new(7);
        cal.insert(test_appointment(7, H, 60));
        assert!(cal.remove(Ulid::new()).is_none());
        assert_eq!(cal.appointments.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut cal = AgentCalendar::new(7);
        cal.insert(test_appointment(7, 0, 60)); // [0h, 1h)
        cal.insert(test_appointment(7, 10 * H, 60)); // overlaps
        cal.insert(test_appointment(7, 20 * H, 60)); // after the query
        let hits: Vec<_> = cal.overlapping(&Span::new(10 * H + 1, 12 * H)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].scheduled_at, 10 * H);
    }

    #[test]
    fn overlapping_at_the_edges_of_time() {
        let mut cal = AgentCalendar::new(7);
        cal.insert(test_appointment(7, H, 60));
        assert_eq!(cal.overlapping(&Span::new(i64::MIN, i64::MIN + 10)).count(), 0);
        assert_eq!(cal.overlapping(&Span::new(i64::MIN, 2 * H)).count(), 1);
        assert_eq!(Span::from_minutes(i64::MAX - MINUTE_MS, 60).end, i64::MAX);
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut cal = AgentCalendar::new(7);
        cal.insert(test_appointment(7, H, 60));
        assert_eq!(cal.overlapping(&Span::new(2 * H, 3 * H)).count(), 0);
        assert_eq!(cal.overlapping(&Span::new(0, H)).count(), 0);
    }

    #[test]
    fn overlapping_finds_longest_appointment_starting_early() {
        let mut cal = AgentCalendar::new(7);
        // 8h appointment starting at 0 still covers 7h59m.
        cal.insert(test_appointment(7, 0, 480));
        let q = Span::new(8 * H - MINUTE_MS, 9 * H);
        assert_eq!(cal.overlapping(&q).count(), 1);
        let q = Span::new(8 * H, 9 * H);
        assert_eq!(cal.overlapping(&q).count(), 0);
    }

    #[test]
    fn apply_reschedule_sets_original_once() {
        let mut cal = AgentCalendar::new(7);
        let a = test_appointment(7, 10 * H, 60);
        let id = a.id;
        cal.apply(&Event::AppointmentBooked(a));
        for (i, at) in [12 * H, 14 * H].into_iter().enumerate() {
            cal.apply(&Event::AppointmentRescheduled {
                id,
                agent_id: 7,
                scheduled_at: at,
                duration_minutes: 30,
                rescheduled_at: i as Ms,
            });
        }
        let a = cal.get(&id).unwrap();
        assert_eq!(a.scheduled_at, 14 * H);
        assert_eq!(a.original_scheduled_at, Some(10 * H));
        assert_eq!(a.last_rescheduled_at, Some(1));
        assert_eq!(a.reschedule_count, 2);
        assert_eq!(a.version, 3);
        assert_eq!(a.duration_minutes, 30);
    }

    #[test]
    fn apply_status_bumps_version() {
        let mut cal = AgentCalendar::new(7);
        let a = test_appointment(7, H, 60);
        let id = a.id;
        cal.apply(&Event::AppointmentBooked(a));
        cal.apply(&Event::StatusChanged { id, agent_id: 7, status: Status::Confirmed });
        let a = cal.get(&id).unwrap();
        assert_eq!(a.status, Status::Confirmed);
        assert_eq!(a.version, 2);
        cal.apply(&Event::AppointmentDeleted { id, agent_id: 7 });
        assert!(cal.get(&id).is_none());
    }

    #[test]
    fn stats_tally() {
        let mut a = test_appointment(7, H, 60);
        let mut b = test_appointment(7, 2 * H, 60);
        let c = test_appointment(7, 3 * H, 60);
        a.status = Status::Cancelled;
        b.status = Status::Confirmed;
        let stats = AgentStats::tally([&a, &b, &c]);
        assert_eq!(
            stats,
            AgentStats { total: 3, pending: 1, confirmed: 1, completed: 0, cancelled: 1 }
        );
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::AppointmentBooked(test_appointment(7, H, 45));
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
