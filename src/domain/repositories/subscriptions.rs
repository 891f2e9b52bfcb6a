use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};

/// Raised by the compare-and-swap upsert when the persisted version no
/// longer matches the one the mutation was computed against. Never retried
/// as transient; callers recompute from fresh state.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("subscription version conflict for user {user_id}")]
pub struct VersionConflict {
    pub user_id: Uuid,
}

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    async fn find_current_by_user_id(&self, user_id: Uuid)
    -> Result<Option<SubscriptionEntity>>;

    /// Keyed upsert by `user_id`. `expected_version: None` inserts a fresh
    /// row and fails if one already exists; `Some(v)` updates the existing
    /// row only while its version is still `v`, bumping it. Mismatches fail
    /// with [`VersionConflict`].
    async fn reconcile_upsert(
        &self,
        entity: UpsertSubscriptionEntity,
        expected_version: Option<i64>,
    ) -> Result<SubscriptionEntity>;
}
