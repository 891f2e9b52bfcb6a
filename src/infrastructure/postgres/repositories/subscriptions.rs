use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::domain::repositories::subscriptions::{SubscriptionRepository, VersionConflict};
use crate::infrastructure::postgres::postgres_connection::PgPoolSquad;
use crate::infrastructure::postgres::schema::subscriptions;

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_current_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn reconcile_upsert(
        &self,
        entity: UpsertSubscriptionEntity,
        expected_version: Option<i64>,
    ) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let now = Utc::now();

        let subscription = conn.transaction::<SubscriptionEntity, anyhow::Error, _>(|conn| {
            // Row lock so the version check and the write are one unit.
            let existing: Option<SubscriptionEntity> = subscriptions::table
                .filter(subscriptions::user_id.eq(entity.user_id))
                .select(SubscriptionEntity::as_select())
                .for_update()
                .first::<SubscriptionEntity>(conn)
                .optional()?;

            match (existing, expected_version) {
                (None, None) => {
                    let inserted = diesel::insert_into(subscriptions::table)
                        .values((
                            &entity,
                            subscriptions::version.eq(1_i64),
                            subscriptions::created_at.eq(now),
                            subscriptions::updated_at.eq(now),
                        ))
                        .returning(SubscriptionEntity::as_select())
                        .get_result::<SubscriptionEntity>(conn)
                        .map_err(|err| match err {
                            // A concurrent first activation won the insert
                            // race; the caller recomputes against its row.
                            diesel::result::Error::DatabaseError(
                                DatabaseErrorKind::UniqueViolation,
                                _,
                            ) => anyhow::Error::new(VersionConflict {
                                user_id: entity.user_id,
                            }),
                            other => anyhow::Error::new(other),
                        })?;
                    Ok(inserted)
                }
                (Some(row), Some(expected)) if row.version == expected => {
                    let updated = diesel::update(subscriptions::table.find(row.id))
                        .set((
                            &entity,
                            subscriptions::version.eq(expected + 1),
                            subscriptions::updated_at.eq(now),
                        ))
                        .returning(SubscriptionEntity::as_select())
                        .get_result::<SubscriptionEntity>(conn)?;
                    Ok(updated)
                }
                _ => Err(anyhow::Error::new(VersionConflict {
                    user_id: entity.user_id,
                })),
            }
        })?;

        Ok(subscription)
    }
}
