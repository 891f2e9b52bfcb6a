use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::plan_catalog::PlanCatalog;
use crate::application::retry::RetryableWriter;
use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::domain::repositories::plans::PlanRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::domain::value_objects::subscriptions::{CurrentSubscriptionDto, PlanDto};

const MAX_RECOMPUTES: u32 = 2;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("no active subscription")]
    NoActiveSubscription,
    #[error("insufficient leads: requested {requested}, available {available}")]
    InsufficientLeads { requested: i64, available: i64 },
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::NoActiveSubscription => StatusCode::NOT_FOUND,
            SubscriptionError::InsufficientLeads { .. } => StatusCode::CONFLICT,
            SubscriptionError::InvalidQuantity => StatusCode::BAD_REQUEST,
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type SubscriptionResult<T> = std::result::Result<T, SubscriptionError>;

/// Catalog queries plus the lead consumption/grant arithmetic that runs
/// outside the webhook path. All writes go through the same versioned
/// upsert the reconciliation uses.
pub struct SubscriptionUseCase<P, S>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
{
    catalog: Arc<PlanCatalog<P>>,
    subscription_repo: Arc<S>,
    writer: RetryableWriter,
}

/// Access outlives cancellation until the period end; it never outlives
/// expiry.
fn has_lead_access(subscription: &SubscriptionEntity, now: chrono::DateTime<Utc>) -> bool {
    match SubscriptionStatus::from_str(&subscription.status) {
        Some(SubscriptionStatus::Active) => true,
        Some(SubscriptionStatus::Cancelled) => subscription.current_period_end > now,
        _ => false,
    }
}

fn write_from(current: &SubscriptionEntity) -> UpsertSubscriptionEntity {
    UpsertSubscriptionEntity {
        id: current.id,
        user_id: current.user_id,
        plan_id: current.plan_id,
        status: current.status.clone(),
        leads_balance: current.leads_balance,
        leads_bonus: current.leads_bonus,
        current_period_start: current.current_period_start,
        current_period_end: current.current_period_end,
        gateway_transaction_id: current.gateway_transaction_id.clone(),
        gateway_subscription_id: current.gateway_subscription_id.clone(),
        cancelled_at: current.cancelled_at,
        cancellation_reason: current.cancellation_reason.clone(),
    }
}

impl<P, S> SubscriptionUseCase<P, S>
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(
        catalog: Arc<PlanCatalog<P>>,
        subscription_repo: Arc<S>,
        writer: RetryableWriter,
    ) -> Self {
        Self {
            catalog,
            subscription_repo,
            writer,
        }
    }

    pub async fn list_plans(&self) -> SubscriptionResult<Vec<PlanDto>> {
        let plans = self.catalog.list_active_plans().await?;
        info!(plan_count = plans.len(), "subscriptions: active plans loaded");
        Ok(plans.into_iter().map(PlanDto::from).collect())
    }

    pub async fn get_current_subscription(
        &self,
        user_id: Uuid,
    ) -> SubscriptionResult<Option<CurrentSubscriptionDto>> {
        let subscription = self
            .subscription_repo
            .find_current_by_user_id(user_id)
            .await?;
        Ok(subscription.map(CurrentSubscriptionDto::from))
    }

    /// Consumes leads from the balance first, then from the bonus pool.
    /// Never lets either number go negative.
    pub async fn consume_leads(
        &self,
        user_id: Uuid,
        quantity: i64,
    ) -> SubscriptionResult<CurrentSubscriptionDto> {
        if quantity <= 0 {
            return Err(SubscriptionError::InvalidQuantity);
        }

        let mut recomputes = 0u32;
        loop {
            let current = self
                .subscription_repo
                .find_current_by_user_id(user_id)
                .await?
                .ok_or(SubscriptionError::NoActiveSubscription)?;

            let now = Utc::now();
            if !has_lead_access(&current, now) {
                warn!(
                    %user_id,
                    status = %current.status,
                    "subscriptions: consumption without lead access"
                );
                return Err(SubscriptionError::NoActiveSubscription);
            }

            let available = current.leads_balance + current.leads_bonus;
            if available < quantity {
                return Err(SubscriptionError::InsufficientLeads {
                    requested: quantity,
                    available,
                });
            }

            let from_balance = current.leads_balance.min(quantity);
            let mut entity = write_from(&current);
            entity.leads_balance = current.leads_balance - from_balance;
            entity.leads_bonus = current.leads_bonus - (quantity - from_balance);

            match self.versioned_write("leads consume", entity, current.version).await {
                Ok(subscription) => {
                    info!(
                        %user_id,
                        quantity,
                        leads_balance = subscription.leads_balance,
                        leads_bonus = subscription.leads_bonus,
                        "subscriptions: leads consumed"
                    );
                    return Ok(CurrentSubscriptionDto::from(subscription));
                }
                Err(retry) if retry && recomputes < MAX_RECOMPUTES => {
                    recomputes += 1;
                    continue;
                }
                Err(_) => {
                    return Err(SubscriptionError::Internal(anyhow::anyhow!(
                        "leads consume write failed for user {user_id}"
                    )));
                }
            }
        }
    }

    /// Administrative bonus grant, the only balance increase not tied to a
    /// processed webhook.
    pub async fn grant_bonus_leads(
        &self,
        user_id: Uuid,
        quantity: i64,
    ) -> SubscriptionResult<CurrentSubscriptionDto> {
        if quantity <= 0 {
            return Err(SubscriptionError::InvalidQuantity);
        }

        let mut recomputes = 0u32;
        loop {
            let current = self
                .subscription_repo
                .find_current_by_user_id(user_id)
                .await?
                .ok_or(SubscriptionError::NoActiveSubscription)?;

            let mut entity = write_from(&current);
            entity.leads_bonus = current.leads_bonus.saturating_add(quantity);

            match self.versioned_write("leads grant", entity, current.version).await {
                Ok(subscription) => {
                    info!(
                        %user_id,
                        quantity,
                        leads_bonus = subscription.leads_bonus,
                        "subscriptions: bonus leads granted"
                    );
                    return Ok(CurrentSubscriptionDto::from(subscription));
                }
                Err(retry) if retry && recomputes < MAX_RECOMPUTES => {
                    recomputes += 1;
                    continue;
                }
                Err(_) => {
                    return Err(SubscriptionError::Internal(anyhow::anyhow!(
                        "leads grant write failed for user {user_id}"
                    )));
                }
            }
        }
    }

    /// Err(true) means a version conflict worth recomputing; Err(false) is
    /// terminal for this call.
    async fn versioned_write(
        &self,
        label: &'static str,
        entity: UpsertSubscriptionEntity,
        expected_version: i64,
    ) -> Result<SubscriptionEntity, bool> {
        let repo = Arc::clone(&self.subscription_repo);
        let result = self
            .writer
            .write(label, move || {
                let repo = Arc::clone(&repo);
                let entity = entity.clone();
                async move { repo.reconcile_upsert(entity, Some(expected_version)).await }
            })
            .await;

        match result {
            Ok(subscription) => Ok(subscription),
            Err(failure) if failure.is_version_conflict() => {
                warn!(label, "subscriptions: concurrent mutation, recomputing");
                Err(true)
            }
            Err(failure) => {
                warn!(label, error = %failure, "subscriptions: write failed");
                Err(false)
            }
        }
    }
}
