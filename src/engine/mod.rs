mod error;
mod mutations;
mod policy;
mod queries;

pub use error::SchedulingError;
pub use policy::{check_transition, validate_new, validate_reschedule};

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::compactor::{run_compactor, COMPACT_CHECK_INTERVAL};
use crate::config::SchedulerConfig;
use crate::model::*;
use crate::notify::{Notification, Notifier};
use crate::observability;
use crate::store::{AppointmentStore, StoreError, WalStore};

/// A booking request as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub scheduled_at: Ms,
    /// Defaults to 60 minutes.
    pub duration_minutes: Option<u32>,
    pub notes: String,
}

/// Entry point for every appointment operation. Holds no locks of its own;
/// all atomicity comes from the store's conditional writes, so one
/// `Arc<Scheduler>` can be shared by any number of workers.
pub struct Scheduler {
    store: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            store_timeout,
        }
    }

    /// WAL-backed scheduler under `config.data_dir`, with the background
    /// compactor running and, if `config.metrics_port` is set, the Prometheus
    /// endpoint installed. Must be called inside a tokio runtime.
    pub fn open(config: &SchedulerConfig, notifier: Arc<dyn Notifier>) -> io::Result<Self> {
        observability::init(config.metrics_port).map_err(io::Error::other)?;
        std::fs::create_dir_all(&config.data_dir)?;
        let store = WalStore::open(&config.wal_path())?;
        tokio::spawn(run_compactor(
            store.clone(),
            config.compact_threshold,
            COMPACT_CHECK_INTERVAL,
        ));
        Ok(Self::new(
            Arc::new(store),
            notifier,
            Arc::new(SystemClock),
            config.store_timeout,
        ))
    }

    fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Run one store call under the configured timeout.
    async fn store_call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SchedulingError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.store_timeout, fut).await;
        metrics::histogram!(observability::STORE_CALL_DURATION_SECONDS, "operation" => operation)
            .record(start.elapsed().as_secs_f64());
        match result {
            Ok(r) => r.map_err(SchedulingError::from),
            Err(_) => {
                metrics::counter!(observability::STORE_TIMEOUTS_TOTAL, "operation" => operation)
                    .increment(1);
                warn!(operation, "store call timed out after {:?}", self.store_timeout);
                Err(SchedulingError::Timeout { operation })
            }
        }
    }

    /// Fire-and-forget: the write has committed, delivery can't undo it.
    fn dispatch(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&notification).await {
                let kind = notification.event_type.as_str();
                metrics::counter!(observability::NOTIFICATION_FAILURES_TOTAL, "event_type" => kind)
                    .increment(1);
                warn!(
                    appointment_id = %notification.appointment_id,
                    agent_id = notification.agent_id,
                    "notification failed: {e}"
                );
            }
        });
    }
}

/// Record outcome and latency of a top-level operation.
fn record<T>(operation: &'static str, start: Instant, result: &Result<T, SchedulingError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(observability::OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
