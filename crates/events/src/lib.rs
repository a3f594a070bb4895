//! Ledger-adjacent events and the notification fan-out.
//!
//! Notifications are side effects of committed stock mutations. They travel over
//! an `EventBus` and are never part of the ledger transaction.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::{
    BusNotificationSink, NoopNotificationSink, Notification, NotificationError, NotificationSink,
    RecordingNotificationSink, ThresholdReached,
};
