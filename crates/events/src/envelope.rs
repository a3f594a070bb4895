use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use invledger_core::{AdminId, ProductId};

/// Envelope for an outbound event, carrying tenant + product routing metadata.
///
/// Notes:
/// - **Multi-tenancy**: `admin_id` is the owning admin of the product; consumers
///   fan out per admin (dashboards, email digests).
/// - `payload` is the typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    admin_id: AdminId,
    product_id: ProductId,
    event_type: String,
    emitted_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        admin_id: AdminId,
        product_id: ProductId,
        event_type: impl Into<String>,
        emitted_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            admin_id,
            product_id,
            event_type: event_type.into(),
            emitted_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn admin_id(&self) -> AdminId {
        self.admin_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn emitted_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
