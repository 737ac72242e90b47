use std::time::Instant;

use ulid::Ulid;

use crate::filters::{paginate, Filters, Metadata};
use crate::limits::MAX_DURATION_MINUTES;
use crate::model::*;
use crate::validator::FieldErrors;

use super::policy::check_scheduled_at;
use super::{record, Scheduler, SchedulingError};

impl Scheduler {
    pub async fn get(&self, id: Ulid) -> Result<Appointment, SchedulingError> {
        let start = Instant::now();
        let result = self.load(id).await;
        record("get", start, &result);
        result
    }

    /// One page of an agent's calendar, optionally narrowed to one status.
    pub async fn list_for_agent(
        &self,
        agent_id: AgentId,
        status: Option<Status>,
        filters: &Filters,
    ) -> Result<(Vec<Appointment>, Metadata), SchedulingError> {
        let start = Instant::now();
        let result = async {
            let sort = filters.validate()?;
            let all = self
                .store_call("list_for_agent", self.store.appointments_for_agent(agent_id, status))
                .await?;
            Ok::<_, SchedulingError>(paginate(all, sort, filters))
        }
        .await;
        record("list_for_agent", start, &result);
        result
    }

    pub async fn list_for_user(
        &self,
        user_id: UserId,
        filters: &Filters,
    ) -> Result<(Vec<Appointment>, Metadata), SchedulingError> {
        let start = Instant::now();
        let result = async {
            let sort = filters.validate()?;
            let all = self
                .store_call("list_for_user", self.store.appointments_for_user(user_id))
                .await?;
            Ok::<_, SchedulingError>(paginate(all, sort, filters))
        }
        .await;
        record("list_for_user", start, &result);
        result
    }

    /// Counts by status. Unknown agents have all-zero stats.
    pub async fn agent_stats(&self, agent_id: AgentId) -> Result<AgentStats, SchedulingError> {
        let start = Instant::now();
        let result = self
            .store_call("agent_stats", self.store.agent_stats(agent_id))
            .await;
        record("agent_stats", start, &result);
        result
    }

    /// Active appointments of `agent_id` that would collide with the window.
    /// Read-only; a later write re-checks atomically.
    pub async fn find_conflicts(
        &self,
        agent_id: AgentId,
        scheduled_at: Ms,
        duration_minutes: u32,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Ulid>, SchedulingError> {
        let mut v = FieldErrors::new();
        check_scheduled_at(&mut v, scheduled_at);
        v.check(duration_minutes > 0, "duration_minutes", "must be positive");
        v.check(
            duration_minutes <= MAX_DURATION_MINUTES,
            "duration_minutes",
            "must not exceed 8 hours",
        );
        v.into_result()?;

        let span = Span::from_minutes(scheduled_at, duration_minutes);
        self.store_call("find_conflicts", self.store.find_conflicts(agent_id, span, exclude))
            .await
    }
}
