use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::*;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    Created,
    Rescheduled,
    StatusChanged,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Created => "created",
            NotificationKind::Rescheduled => "rescheduled",
            NotificationKind::StatusChanged => "statusChanged",
        }
    }
}

/// Emitted after a write commits. Delivery is the notifier's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub agent_id: AgentId,
    pub appointment_id: Ulid,
    pub event_type: NotificationKind,
    pub old_scheduled_at: Option<Ms>,
    pub new_scheduled_at: Option<Ms>,
    pub reschedule_count: u32,
    pub status: Status,
}

impl Notification {
    pub fn created(a: &Appointment) -> Self {
        Self {
            agent_id: a.agent_id,
            appointment_id: a.id,
            event_type: NotificationKind::Created,
            old_scheduled_at: None,
            new_scheduled_at: Some(a.scheduled_at),
            reschedule_count: a.reschedule_count,
            status: a.status,
        }
    }

    pub fn rescheduled(old_scheduled_at: Ms, a: &Appointment) -> Self {
        Self {
            agent_id: a.agent_id,
            appointment_id: a.id,
            event_type: NotificationKind::Rescheduled,
            old_scheduled_at: Some(old_scheduled_at),
            new_scheduled_at: Some(a.scheduled_at),
            reschedule_count: a.reschedule_count,
            status: a.status,
        }
    }

    pub fn status_changed(a: &Appointment) -> Self {
        Self {
            agent_id: a.agent_id,
            appointment_id: a.id,
            event_type: NotificationKind::StatusChanged,
            old_scheduled_at: None,
            new_scheduled_at: None,
            reschedule_count: a.reschedule_count,
            status: a.status,
        }
    }
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Consumer of committed appointment events (mailer, push, webhooks...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Broadcast hub with one channel per agent, for in-process subscribers.
pub struct NotifyHub {
    channels: DashMap<AgentId, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to an agent's notifications. Creates the channel if needed.
    pub fn subscribe(&self, agent_id: AgentId) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(agent_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, notification: &Notification) {
        if let Some(sender) = self.channels.get(&notification.agent_id) {
            let _ = sender.send(notification.clone());
        }
    }

    pub fn remove(&self, agent_id: &AgentId) {
        self.channels.remove(agent_id);
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.send(notification);
        Ok(())
    }
}

/// Writes one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(n).map_err(|e| NotifyError(e.to_string()))?;
        tracing::info!(
            agent_id = n.agent_id,
            appointment_id = %n.appointment_id,
            event = %payload,
            "appointment notification"
        );
        Ok(())
    }
}
