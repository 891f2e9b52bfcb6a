use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::plans::PlanEntity;
use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::domain::value_objects::enums::{
    catalog_kinds::CatalogKind, subscription_statuses::SubscriptionStatus,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanDto {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub kind: CatalogKind,
    pub price_cents: i32,
    pub leads_included: i64,
}

impl From<PlanEntity> for PlanDto {
    fn from(value: PlanEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            display_name: value.display_name,
            kind: value.kind,
            price_cents: value.price_cents,
            leads_included: value.leads_included,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrentSubscriptionDto {
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub leads_balance: i64,
    pub leads_bonus: i64,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionEntity> for CurrentSubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            plan_id: value.plan_id,
            status: SubscriptionStatus::from_str(&value.status)
                .unwrap_or(SubscriptionStatus::Pending),
            leads_balance: value.leads_balance,
            leads_bonus: value.leads_bonus,
            current_period_start: value.current_period_start,
            current_period_end: value.current_period_end,
            cancelled_at: value.cancelled_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeLeadsModel {
    pub user_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrantLeadsModel {
    pub user_id: Uuid,
    pub quantity: i64,
}
