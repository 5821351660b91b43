use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use sqlx::MySqlPool;
use tokio::sync::broadcast;

use crate::model::{attendance::AttendanceRecord, employee::Employee, role::Role};
use crate::utils::day_bounds::DayCalendar;

pub const EVENT_CREATED: &str = "attendance:created";
pub const EVENT_UPDATED: &str = "attendance:updated";
pub const EVENT_LIST_UPDATED: &str = "attendances:list-updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Admins,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, audience: Audience, title: &str, body: &str) -> anyhow::Result<()>;
}

pub trait RealtimePublisher: Send + Sync {
    fn publish(&self, event: &str, payload: serde_json::Value);
}

/// How a record was touched by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// New row from a scan.
    Created,
    /// New row written by an administrator.
    CreatedManually,
    /// New row carrying a justification.
    Justified,
    Updated,
}

/// Stores one notification row per admin user.
pub struct MySqlNotificationSink {
    pool: MySqlPool,
}

impl MySqlNotificationSink {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for MySqlNotificationSink {
    async fn notify(&self, audience: Audience, title: &str, body: &str) -> anyhow::Result<()> {
        let role = match audience {
            Audience::Admins => Role::Admin,
        };
        let recipients: Vec<u64> = sqlx::query_scalar("SELECT id FROM users WHERE role_id = ?")
            .bind(role.id())
            .fetch_all(&self.pool)
            .await?;

        let inserts = recipients.iter().map(|user_id| {
            sqlx::query(
                "INSERT INTO notifications (recipient_id, title, message, is_read, created_at) \
                 VALUES (?, ?, ?, FALSE, UTC_TIMESTAMP())",
            )
            .bind(user_id)
            .bind(title)
            .bind(body)
            .execute(&self.pool)
        });
        for result in futures::future::join_all(inserts).await {
            result?;
        }
        Ok(())
    }
}

/// Writes notifications to the log. Used when no database is configured.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, audience: Audience, title: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(?audience, title, body, "Notification");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

/// In-process realtime fan-out; socket gateways subscribe to it.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}

impl RealtimePublisher for BroadcastPublisher {
    fn publish(&self, event: &str, payload: serde_json::Value) {
        // send only fails when nobody is listening
        let _ = self.tx.send(RealtimeEvent {
            event: event.to_string(),
            payload,
        });
    }
}

/// Best-effort signalling after a record is persisted.
#[derive(Clone)]
pub struct EventFanout {
    notifier: Arc<dyn NotificationSink>,
    publisher: Arc<dyn RealtimePublisher>,
    calendar: DayCalendar,
}

impl EventFanout {
    pub fn new(
        notifier: Arc<dyn NotificationSink>,
        publisher: Arc<dyn RealtimePublisher>,
        calendar: DayCalendar,
    ) -> Self {
        Self {
            notifier,
            publisher,
            calendar,
        }
    }

    pub async fn announce(&self, record: &AttendanceRecord, change: Change, employee: &Employee) {
        let payload = json!({ "attendance": record, "employee": employee.display_name() });

        match change {
            Change::Created => {
                self.publisher.publish(EVENT_CREATED, payload);
                self.notify_admins(record, employee).await;
            }
            Change::CreatedManually | Change::Justified | Change::Updated => {
                self.publisher.publish(EVENT_UPDATED, payload);
            }
        }
        self.publisher.publish(
            EVENT_LIST_UPDATED,
            json!({ "employee_id": record.employee_id }),
        );
    }

    async fn notify_admins(&self, record: &AttendanceRecord, employee: &Employee) {
        let clock_in = record
            .entry_time
            .map(|t| self.calendar.local(t).format("%H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let body = format!(
            "{} registered attendance.\nEntry time: {}\nMethod: QR scan",
            employee.display_name(),
            clock_in
        );
        if let Err(e) = self
            .notifier
            .notify(Audience::Admins, "New attendance registered", &body)
            .await
        {
            tracing::warn!(error = %e, employee_id = record.employee_id, "Admin notification failed");
        }
    }
}
