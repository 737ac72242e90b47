mod wal_store;

pub use wal_store::WalStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug)]
pub enum StoreError {
    Wal(String),
    Closed,
    TaskFailed(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::Closed => write!(f, "store is shut down"),
            StoreError::TaskFailed(e) => write!(f, "store task failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result of a conflict-checked insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Appointment),
    Conflict(Ulid),
}

/// Result of a version-guarded write. Only `Applied` changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied(Appointment),
    Missing,
    VersionMismatch { current: u64 },
    Conflict(Ulid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescheduleWrite {
    pub scheduled_at: Ms,
    pub duration_minutes: u32,
    pub rescheduled_at: Ms,
}

/// Persistence behind the scheduler. Conditional writes are atomic: the
/// conflict check, the version check and the write happen as one step, so
/// callers never need their own locking.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    /// Ids of active appointments of `agent_id` overlapping `span`.
    async fn find_conflicts(
        &self,
        agent_id: AgentId,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Ulid>, StoreError>;

    async fn insert_if_free(&self, appointment: Appointment) -> Result<InsertOutcome, StoreError>;

    async fn reschedule_if_version(
        &self,
        id: Ulid,
        expected_version: u64,
        write: RescheduleWrite,
    ) -> Result<WriteOutcome, StoreError>;

    /// Version-guarded status change. No conflict check: a status change
    /// never makes a slot busier than it was.
    async fn set_status_if_version(
        &self,
        id: Ulid,
        expected_version: u64,
        status: Status,
    ) -> Result<WriteOutcome, StoreError>;

    /// Returns the removed appointment, `None` if it did not exist.
    async fn delete(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;

    async fn appointments_for_agent(
        &self,
        agent_id: AgentId,
        status: Option<Status>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn appointments_for_user(&self, user_id: UserId) -> Result<Vec<Appointment>, StoreError>;

    async fn agent_stats(&self, agent_id: AgentId) -> Result<AgentStats, StoreError>;
}
