//! Threshold notifications emitted after committed stock mutations.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use invledger_core::{AdminId, ProductId};

use crate::bus::EventBus;
use crate::envelope::EventEnvelope;
use crate::event::Event;

/// Payload: a product's stock dropped to (or below) its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdReached {
    pub product_id: ProductId,
    pub admin_id: AdminId,
    pub product_name: String,
    pub stock: i64,
    pub threshold: i64,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ThresholdReached {
    pub fn new(
        product_id: ProductId,
        admin_id: AdminId,
        product_name: impl Into<String>,
        stock: i64,
        threshold: i64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let product_name = product_name.into();
        let message = format!(
            "stock for '{product_name}' is {stock}, at or below its threshold of {threshold}"
        );
        Self {
            product_id,
            admin_id,
            product_name,
            stock,
            threshold,
            message,
            occurred_at,
        }
    }
}

/// Outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    StockThresholdReached(ThresholdReached),
}

impl Notification {
    pub fn product_id(&self) -> ProductId {
        match self {
            Notification::StockThresholdReached(n) => n.product_id,
        }
    }

    pub fn admin_id(&self) -> AdminId {
        match self {
            Notification::StockThresholdReached(n) => n.admin_id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Notification::StockThresholdReached(n) => &n.message,
        }
    }
}

impl Event for Notification {
    fn event_type(&self) -> &'static str {
        match self {
            Notification::StockThresholdReached(_) => "STOCK_THRESHOLD_REACHED",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Notification::StockThresholdReached(n) => n.occurred_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget sink for notifications.
///
/// Callers log delivery failures and move on; a failure here never rolls back the
/// stock mutation that produced the notification.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

impl<S> NotificationSink for std::sync::Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        (**self).notify(notification)
    }
}

/// Sink that publishes enveloped notifications on an `EventBus`.
#[derive(Debug)]
pub struct BusNotificationSink<B> {
    bus: B,
}

impl<B> BusNotificationSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> NotificationSink for BusNotificationSink<B>
where
    B: EventBus<EventEnvelope<Notification>>,
{
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let envelope = EventEnvelope::new(
            notification.admin_id(),
            notification.product_id(),
            notification.event_type(),
            notification.occurred_at(),
            notification,
        );
        tracing::debug!(
            event_type = envelope.event_type(),
            product_id = %envelope.product_id(),
            "publishing notification"
        );
        self.bus
            .publish(envelope)
            .map_err(|e| NotificationError::Delivery(format!("{e:?}")))
    }
}

/// Sink that drops everything (notifications disabled).
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    inner: Mutex<Vec<Notification>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.inner.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.inner
            .lock()
            .map_err(|_| NotificationError::Delivery("recording sink poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::in_memory_bus::InMemoryEventBus;

    fn sample() -> Notification {
        Notification::StockThresholdReached(ThresholdReached::new(
            ProductId::new(),
            AdminId::new(),
            "Widget",
            5,
            10,
            Utc::now(),
        ))
    }

    #[test]
    fn bus_sink_wraps_notification_in_envelope() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<Notification>>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let sink = BusNotificationSink::new(bus.clone());

        let n = sample();
        sink.notify(n.clone()).unwrap();

        let env = sub.try_recv().unwrap();
        assert_eq!(env.event_type(), "STOCK_THRESHOLD_REACHED");
        assert_eq!(env.product_id(), n.product_id());
        assert_eq!(env.admin_id(), n.admin_id());
        assert_eq!(env.payload(), &n);
    }

    #[test]
    fn serialized_form_carries_type_tag() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "STOCK_THRESHOLD_REACHED");
        assert!(json["message"].as_str().unwrap().contains("Widget"));
    }
}
