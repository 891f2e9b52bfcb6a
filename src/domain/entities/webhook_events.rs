use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::webhook_events;

/// Append-only record of an inbound notification. Mutated once:
/// unprocessed -> processed, or unprocessed -> failed-with-reason.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable, PartialEq)]
#[diesel(table_name = webhook_events)]
pub struct WebhookEventEntity {
    pub id: Uuid,
    pub gateway_transaction_id: String,
    pub raw_payload: serde_json::Value,
    pub processed: bool,
    pub outcome: Option<String>,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct InsertWebhookEventEntity {
    pub id: Uuid,
    pub gateway_transaction_id: String,
    pub raw_payload: serde_json::Value,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
}
