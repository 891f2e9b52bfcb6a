use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity};
use crate::domain::repositories::webhook_events::WebhookEventRepository;
use crate::infrastructure::postgres::postgres_connection::PgPoolSquad;
use crate::infrastructure::postgres::schema::webhook_events;

pub struct WebhookEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl WebhookEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl WebhookEventRepository for WebhookEventPostgres {
    async fn insert_or_fetch(
        &self,
        entity: InsertWebhookEventEntity,
    ) -> Result<(WebhookEventEntity, bool)> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The unique constraint on gateway_transaction_id is the mutual
        // exclusion gate for concurrent duplicate deliveries.
        let inserted = diesel::insert_into(webhook_events::table)
            .values(&entity)
            .on_conflict(webhook_events::gateway_transaction_id)
            .do_nothing()
            .returning(WebhookEventEntity::as_select())
            .get_result::<WebhookEventEntity>(&mut conn)
            .optional()?;

        if let Some(event) = inserted {
            return Ok((event, true));
        }

        let existing = webhook_events::table
            .filter(
                webhook_events::gateway_transaction_id.eq(&entity.gateway_transaction_id),
            )
            .select(WebhookEventEntity::as_select())
            .first::<WebhookEventEntity>(&mut conn)?;

        Ok((existing, false))
    }

    async fn find_by_id(&self, event_id: Uuid) -> Result<Option<WebhookEventEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let event = webhook_events::table
            .find(event_id)
            .select(WebhookEventEntity::as_select())
            .first::<WebhookEventEntity>(&mut conn)
            .optional()?;

        Ok(event)
    }

    async fn mark_processed(&self, event_id: Uuid, outcome: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::update(webhook_events::table.find(event_id))
            .set((
                webhook_events::processed.eq(true),
                webhook_events::outcome.eq(Some(outcome)),
                webhook_events::error_message.eq::<Option<String>>(None),
                webhook_events::processed_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn record_failure(&self, event_id: Uuid, reason: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::update(webhook_events::table.find(event_id))
            .set(webhook_events::error_message.eq(Some(reason)))
            .execute(&mut conn)?;

        Ok(())
    }
}
