use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::conflict::{first_conflict, overlapping_active};
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{AppointmentStore, InsertOutcome, RescheduleWrite, StoreError, WriteOutcome};

pub type SharedCalendar = Arc<RwLock<AgentCalendar>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    debug!("WAL writer stopped: {}", wal.path().display());
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Store ────────────────────────────────────────────────

/// In-memory calendars per agent, made durable by the WAL.
///
/// Every mutation takes the owning agent's calendar write lock, checks,
/// appends one event to the WAL and applies it only once the append is
/// flushed. Mutations run on their own task, so a caller that stops
/// waiting cannot interrupt a write halfway.
#[derive(Clone)]
pub struct WalStore {
    inner: Arc<Inner>,
}

struct Inner {
    calendars: DashMap<AgentId, SharedCalendar>,
    /// Reverse lookup: appointment id → owning agent.
    appointment_agent: DashMap<Ulid, AgentId>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by mutations and exclusively by compaction, so a snapshot
    /// never misses an append that lands in the old file.
    commit_gate: RwLock<()>,
}

impl WalStore {
    /// Replay the WAL at `path` and start its writer task. Must be called
    /// inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut calendars: HashMap<AgentId, AgentCalendar> = HashMap::new();
        let appointment_agent = DashMap::new();
        for event in &events {
            let agent_id = event.agent_id();
            calendars
                .entry(agent_id)
                .or_insert_with(|| AgentCalendar::new(agent_id))
                .apply(event);
            index_event(&appointment_agent, event);
        }
        info!(
            "replayed {} events for {} agents from {}",
            events.len(),
            calendars.len(),
            path.display()
        );

        let calendars: DashMap<_, _> = calendars
            .into_iter()
            .map(|(id, cal)| (id, Arc::new(RwLock::new(cal))))
            .collect();
        metrics::gauge!(observability::AGENTS_ACTIVE).set(calendars.len() as f64);

        Ok(Self {
            inner: Arc::new(Inner {
                calendars,
                appointment_agent,
                wal_tx,
                commit_gate: RwLock::new(()),
            }),
        })
    }

    /// Rewrite the WAL as one `AppointmentBooked` per live appointment.
    /// Blocks mutations for the duration.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.inner.commit_gate.write().await;
        let calendars: Vec<SharedCalendar> = self
            .inner
            .calendars
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut events = Vec::new();
        for cal in calendars {
            let guard = cal.read().await;
            events.extend(guard.appointments.iter().cloned().map(Event::AppointmentBooked));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.inner
            .wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        let result = rx
            .await
            .map_err(|_| StoreError::Closed)?
            .map_err(|e| StoreError::Wal(e.to_string()));

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL, "status" => status).increment(1);
        if result.is_ok() {
            info!("compacted WAL to {count} events");
        }
        result
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    fn calendar(&self, agent_id: AgentId) -> Option<SharedCalendar> {
        self.inner.calendar(agent_id)
    }

    fn calendar_for(&self, id: &Ulid) -> Option<SharedCalendar> {
        self.inner.calendar_for(id)
    }
}

/// Run a mutation on its own task so it completes even if the caller is dropped.
async fn detached<T, F>(fut: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
}

fn index_event(index: &DashMap<Ulid, AgentId>, event: &Event) {
    match event {
        Event::AppointmentBooked(a) => {
            index.insert(a.id, a.agent_id);
        }
        Event::AppointmentDeleted { id, .. } => {
            index.remove(id);
        }
        Event::AppointmentRescheduled { .. } | Event::StatusChanged { .. } => {}
    }
}

impl Inner {
    fn calendar_or_create(&self, agent_id: AgentId) -> SharedCalendar {
        let cal = self
            .calendars
            .entry(agent_id)
            .or_insert_with(|| Arc::new(RwLock::new(AgentCalendar::new(agent_id))))
            .value()
            .clone();
        metrics::gauge!(observability::AGENTS_ACTIVE).set(self.calendars.len() as f64);
        cal
    }

    fn calendar(&self, agent_id: AgentId) -> Option<SharedCalendar> {
        self.calendars.get(&agent_id).map(|e| e.value().clone())
    }

    fn calendar_for(&self, id: &Ulid) -> Option<SharedCalendar> {
        let agent_id = *self.appointment_agent.get(id)?.value();
        self.calendar(agent_id)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await
            .map_err(|_| StoreError::Closed)?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// WAL-append, then apply to the locked calendar and the id index.
    async fn persist_and_apply(&self, cal: &mut AgentCalendar, event: &Event) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        cal.apply(event);
        index_event(&self.appointment_agent, event);
        Ok(())
    }

    async fn insert_if_free(&self, appointment: Appointment) -> Result<InsertOutcome, StoreError> {
        let _gate = self.commit_gate.read().await;
        let cal = self.calendar_or_create(appointment.agent_id);
        let mut guard = cal.write().await;

        if let Some(existing) = first_conflict(&guard, &appointment.span(), None) {
            return Ok(InsertOutcome::Conflict(existing));
        }
        let event = Event::AppointmentBooked(appointment.clone());
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(InsertOutcome::Inserted(appointment))
    }

    async fn reschedule_if_version(
        &self,
        id: Ulid,
        expected_version: u64,
        write: RescheduleWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let _gate = self.commit_gate.read().await;
        let Some(cal) = self.calendar_for(&id) else {
            return Ok(WriteOutcome::Missing);
        };
        let mut guard = cal.write().await;
        let Some(current) = guard.get(&id) else {
            return Ok(WriteOutcome::Missing);
        };
        if current.version != expected_version {
            return Ok(WriteOutcome::VersionMismatch { current: current.version });
        }
        let agent_id = current.agent_id;
        let span = Span::from_minutes(write.scheduled_at, write.duration_minutes);
        if let Some(existing) = first_conflict(&guard, &span, Some(id)) {
            return Ok(WriteOutcome::Conflict(existing));
        }

        let event = Event::AppointmentRescheduled {
            id,
            agent_id,
            scheduled_at: write.scheduled_at,
            duration_minutes: write.duration_minutes,
            rescheduled_at: write.rescheduled_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard
            .get(&id)
            .cloned()
            .map_or(WriteOutcome::Missing, WriteOutcome::Applied))
    }

    async fn set_status_if_version(
        &self,
        id: Ulid,
        expected_version: u64,
        status: Status,
    ) -> Result<WriteOutcome, StoreError> {
        let _gate = self.commit_gate.read().await;
        let Some(cal) = self.calendar_for(&id) else {
            return Ok(WriteOutcome::Missing);
        };
        let mut guard = cal.write().await;
        let Some(current) = guard.get(&id) else {
            return Ok(WriteOutcome::Missing);
        };
        if current.version != expected_version {
            return Ok(WriteOutcome::VersionMismatch { current: current.version });
        }

        let event = Event::StatusChanged {
            id,
            agent_id: current.agent_id,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard
            .get(&id)
            .cloned()
            .map_or(WriteOutcome::Missing, WriteOutcome::Applied))
    }

    async fn delete(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        let _gate = self.commit_gate.read().await;
        let Some(cal) = self.calendar_for(&id) else {
            return Ok(None);
        };
        let mut guard = cal.write().await;
        let Some(removed) = guard.get(&id).cloned() else {
            return Ok(None);
        };

        let event = Event::AppointmentDeleted {
            id,
            agent_id: removed.agent_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(Some(removed))
    }
}

#[async_trait]
impl AppointmentStore for WalStore {
    async fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        let Some(cal) = self.calendar_for(&id) else {
            return Ok(None);
        };
        let guard = cal.read().await;
        Ok(guard.get(&id).cloned())
    }

    async fn find_conflicts(
        &self,
        agent_id: AgentId,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Ulid>, StoreError> {
        let Some(cal) = self.calendar(agent_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        Ok(overlapping_active(&guard, &span, exclude).map(|a| a.id).collect())
    }

    async fn insert_if_free(&self, appointment: Appointment) -> Result<InsertOutcome, StoreError> {
        let inner = self.inner.clone();
        detached(async move { inner.insert_if_free(appointment).await }).await
    }

    async fn reschedule_if_version(
        &self,
        id: Ulid,
        expected_version: u64,
        write: RescheduleWrite,
    ) -> Result<WriteOutcome, StoreError> {
        let inner = self.inner.clone();
        detached(async move { inner.reschedule_if_version(id, expected_version, write).await }).await
    }

    async fn set_status_if_version(
        &self,
        id: Ulid,
        expected_version: u64,
        status: Status,
    ) -> Result<WriteOutcome, StoreError> {
        let inner = self.inner.clone();
        detached(async move { inner.set_status_if_version(id, expected_version, status).await }).await
    }

    async fn delete(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        let inner = self.inner.clone();
        detached(async move { inner.delete(id).await }).await
    }

    async fn appointments_for_agent(
        &self,
        agent_id: AgentId,
        status: Option<Status>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let Some(cal) = self.calendar(agent_id) else {
            return Ok(Vec::new());
        };
        let guard = cal.read().await;
        Ok(guard
            .appointments
            .iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .cloned()
            .collect())
    }

    async fn appointments_for_user(&self, user_id: UserId) -> Result<Vec<Appointment>, StoreError> {
        let calendars: Vec<SharedCalendar> = self
            .inner
            .calendars
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let per_agent = futures::future::join_all(calendars.iter().map(|cal| async move {
            let guard = cal.read().await;
            guard
                .appointments
                .iter()
                .filter(|a| a.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>()
        }))
        .await;
        Ok(per_agent.into_iter().flatten().collect())
    }

    async fn agent_stats(&self, agent_id: AgentId) -> Result<AgentStats, StoreError> {
        let Some(cal) = self.calendar(agent_id) else {
            return Ok(AgentStats::default());
        };
        let guard = cal.read().await;
        Ok(AgentStats::tally(&guard.appointments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn open(dir: &tempfile::TempDir) -> WalStore {
        WalStore::open(&dir.path().join("appointments.wal")).unwrap()
    }

    fn appointment(agent_id: AgentId, start: Ms, minutes: u32) -> Appointment {
        test_appointment(agent_id, start, minutes)
    }

    async fn insert(store: &WalStore, a: &Appointment) {
        let outcome = store.insert_if_free(a.clone()).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(a.clone()));
    }

    #[tokio::test]
    async fn insert_rejects_overlap_for_same_agent_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let first = appointment(7, 10 * H, 60);
        insert(&store, &first).await;

        let clash = appointment(7, 10 * H + 30 * MINUTE_MS, 30);
        assert_eq!(
            store.insert_if_free(clash).await.unwrap(),
            InsertOutcome::Conflict(first.id)
        );

        // Different agent, same slot.
        insert(&store, &appointment(8, 10 * H, 60)).await;
        // Adjacent.
        insert(&store, &appointment(7, 11 * H, 30)).await;
    }

    #[tokio::test]
    async fn cancelled_slot_is_free_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = appointment(7, 10 * H, 60);
        insert(&store, &a).await;

        let outcome = store.set_status_if_version(a.id, 1, Status::Cancelled).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Applied(ref b) if b.version == 2));
        insert(&store, &appointment(7, 10 * H, 60)).await;
    }

    #[tokio::test]
    async fn version_mismatch_leaves_record_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = appointment(7, 10 * H, 60);
        insert(&store, &a).await;

        let write = RescheduleWrite { scheduled_at: 12 * H, duration_minutes: 60, rescheduled_at: 1 };
        assert_eq!(
            store.reschedule_if_version(a.id, 5, write).await.unwrap(),
            WriteOutcome::VersionMismatch { current: 1 }
        );
        assert_eq!(store.get(a.id).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn reschedule_excludes_itself_but_not_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = appointment(7, 10 * H, 60);
        let b = appointment(7, 12 * H, 60);
        insert(&store, &a).await;
        insert(&store, &b).await;

        // Shift by 30 minutes, overlapping its own old slot.
        let write = RescheduleWrite {
            scheduled_at: 10 * H + 30 * MINUTE_MS,
            duration_minutes: 60,
            rescheduled_at: 1,
        };
        let WriteOutcome::Applied(moved) = store.reschedule_if_version(a.id, 1, write).await.unwrap() else {
            panic!("expected applied");
        };
        assert_eq!(moved.original_scheduled_at, Some(10 * H));
        assert_eq!(moved.reschedule_count, 1);
        assert_eq!(moved.version, 2);

        let write = RescheduleWrite { scheduled_at: 12 * H, duration_minutes: 30, rescheduled_at: 2 };
        assert_eq!(
            store.reschedule_if_version(a.id, 2, write).await.unwrap(),
            WriteOutcome::Conflict(b.id)
        );
    }

    #[tokio::test]
    async fn missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let id = Ulid::new();
        assert_eq!(store.get(id).await.unwrap(), None);
        assert_eq!(store.delete(id).await.unwrap(), None);
        assert_eq!(
            store.set_status_if_version(id, 1, Status::Confirmed).await.unwrap(),
            WriteOutcome::Missing
        );
        assert_eq!(store.agent_stats(99).await.unwrap(), AgentStats::default());
        assert!(store.appointments_for_agent(99, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_from_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = appointment(7, 10 * H, 60);
        insert(&store, &a).await;

        assert_eq!(store.delete(a.id).await.unwrap(), Some(a.clone()));
        assert_eq!(store.get(a.id).await.unwrap(), None);
        assert_eq!(store.delete(a.id).await.unwrap(), None);
        assert!(store.find_conflicts(7, a.span(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listings_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let mut a = appointment(7, 10 * H, 60);
        a.user_id = 42;
        let b = appointment(7, 12 * H, 60);
        let mut c = appointment(8, 10 * H, 60);
        c.user_id = 42;
        for x in [&a, &b, &c] {
            insert(&store, x).await;
        }
        store.set_status_if_version(b.id, 1, Status::Confirmed).await.unwrap();

        let confirmed = store.appointments_for_agent(7, Some(Status::Confirmed)).await.unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].id, b.id);
        assert_eq!(store.appointments_for_agent(7, None).await.unwrap().len(), 2);

        let mut mine: Vec<_> = store
            .appointments_for_user(42)
            .await
            .unwrap()
            .into_iter()
            .map(|x| x.id)
            .collect();
        mine.sort();
        let mut expected = vec![a.id, c.id];
        expected.sort();
        assert_eq!(mine, expected);

        let stats = store.agent_stats(7).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.confirmed, 1);
    }

    #[tokio::test]
    async fn reopen_replays_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let a = appointment(7, 10 * H, 60);
        let gone = appointment(7, 20 * H, 60);
        let expected = {
            let store = open(&dir);
            insert(&store, &a).await;
            insert(&store, &gone).await;
            let write = RescheduleWrite { scheduled_at: 14 * H, duration_minutes: 45, rescheduled_at: 9 };
            store.reschedule_if_version(a.id, 1, write).await.unwrap();
            store.set_status_if_version(a.id, 2, Status::Confirmed).await.unwrap();
            store.delete(gone.id).await.unwrap();
            store.get(a.id).await.unwrap().unwrap()
        };

        let store = open(&dir);
        assert_eq!(store.get(a.id).await.unwrap(), Some(expected.clone()));
        assert_eq!(expected.version, 3);
        assert_eq!(expected.original_scheduled_at, Some(10 * H));
        assert_eq!(store.get(gone.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn bookings_after_a_torn_tail_survive_the_next_restart() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appointments.wal");
        let first = appointment(7, 10 * H, 60);
        let second = appointment(7, 12 * H, 60);
        {
            let store = open(&dir);
            insert(&store, &first).await;
        }
        // Crash mid-write: a few bytes of a length prefix.
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[9, 0, 0])
            .unwrap();
        {
            let store = open(&dir);
            insert(&store, &second).await;
        }

        let store = open(&dir);
        assert_eq!(store.get(first.id).await.unwrap(), Some(first.clone()));
        assert_eq!(store.get(second.id).await.unwrap(), Some(second.clone()));
        assert_eq!(store.appointments_for_agent(7, None).await.unwrap().len(), 2);
        // The slot stays taken.
        let clash = appointment(7, 12 * H + 30 * 60_000, 30);
        assert_eq!(
            store.insert_if_free(clash).await.unwrap(),
            InsertOutcome::Conflict(second.id)
        );
    }

    #[tokio::test]
    async fn compaction_preserves_state_and_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let a = appointment(7, 10 * H, 60);
        let b = appointment(8, 10 * H, 60);
        {
            let store = open(&dir);
            insert(&store, &a).await;
            insert(&store, &b).await;
            store.set_status_if_version(a.id, 1, Status::Confirmed).await.unwrap();
            store.delete(b.id).await.unwrap();
            assert_eq!(store.appends_since_compact().await.unwrap(), 4);

            store.compact().await.unwrap();
            assert_eq!(store.appends_since_compact().await.unwrap(), 0);

            // Still writable after the swap.
            insert(&store, &appointment(7, 12 * H, 60)).await;
            assert_eq!(store.appends_since_compact().await.unwrap(), 1);
        }

        let replay = Wal::replay(&dir.path().join("appointments.wal")).unwrap();
        assert_eq!(replay.events.len(), 2);

        let store = open(&dir);
        let a_back = store.get(a.id).await.unwrap().unwrap();
        assert_eq!(a_back.status, Status::Confirmed);
        assert_eq!(a_back.version, 2);
        assert_eq!(store.get(b.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_inserts_same_slot_one_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_if_free(appointment(7, 10 * H, 60)).await.unwrap()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if matches!(h.await.unwrap(), InsertOutcome::Inserted(_)) {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.appointments_for_agent(7, None).await.unwrap().len(), 1);
    }
}
