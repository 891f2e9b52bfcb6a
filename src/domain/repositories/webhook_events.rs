use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity};

#[async_trait]
#[automock]
pub trait WebhookEventRepository {
    /// The dedup gate: inserts keyed by the unique gateway transaction id,
    /// or fetches the row a concurrent (or earlier) delivery already won
    /// with. The bool is true when this call inserted.
    async fn insert_or_fetch(
        &self,
        entity: InsertWebhookEventEntity,
    ) -> Result<(WebhookEventEntity, bool)>;

    async fn find_by_id(&self, event_id: Uuid) -> Result<Option<WebhookEventEntity>>;

    async fn mark_processed(&self, event_id: Uuid, outcome: &str) -> Result<()>;

    /// Records a failure reason while leaving the event unprocessed.
    async fn record_failure(&self, event_id: Uuid, reason: &str) -> Result<()>;
}
