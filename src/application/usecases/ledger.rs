use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::plans::PlanEntity;
use crate::domain::entities::subscriptions::{SubscriptionEntity, UpsertSubscriptionEntity};
use crate::domain::value_objects::enums::{
    catalog_kinds::CatalogKind, gateway_outcomes::GatewayOutcome,
    operation_types::OperationType, subscription_statuses::SubscriptionStatus,
};

/// Billing window granted by an approved activation or renewal.
pub const PERIOD_DAYS: i64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("no active subscription for user {user_id} to apply {operation}")]
    NoActiveSubscription {
        user_id: Uuid,
        operation: OperationType,
    },
    #[error("renewal plan {subject_id} does not match active plan {active_plan_id}")]
    PlanMismatch {
        subject_id: Uuid,
        active_plan_id: Uuid,
    },
    #[error("catalog entry {subject_id} is not a plan")]
    NotAPlan { subject_id: Uuid },
    #[error("catalog entry {subject_id} is not a lead package")]
    NotAPackage { subject_id: Uuid },
}

#[derive(Debug)]
pub struct TransitionInput<'a> {
    pub operation: OperationType,
    pub outcome: GatewayOutcome,
    pub user_id: Uuid,
    pub current: Option<&'a SubscriptionEntity>,
    pub catalog_entry: &'a PlanEntity,
    pub transaction_id: &'a str,
    pub gateway_subscription_id: Option<&'a str>,
    pub cancellation_reason: Option<&'a str>,
    pub now: DateTime<Utc>,
}

/// Outcome of the pure transition: either the full next state to persist
/// (with the version it was computed against), or a deliberate no-op.
#[derive(Debug, PartialEq)]
pub enum LedgerDecision {
    Apply {
        entity: UpsertSubscriptionEntity,
        expected_version: Option<i64>,
    },
    NoOp {
        reason: &'static str,
    },
}

fn is_active(subscription: &SubscriptionEntity) -> bool {
    subscription.status == SubscriptionStatus::Active.as_str()
}

fn active_subscription<'a>(
    input: &TransitionInput<'a>,
) -> Result<&'a SubscriptionEntity, LedgerError> {
    input
        .current
        .filter(|subscription| is_active(subscription))
        .ok_or(LedgerError::NoActiveSubscription {
            user_id: input.user_id,
            operation: input.operation,
        })
}

fn require_plan(input: &TransitionInput<'_>) -> Result<(), LedgerError> {
    if input.catalog_entry.kind != CatalogKind::Plan {
        return Err(LedgerError::NotAPlan {
            subject_id: input.catalog_entry.id,
        });
    }
    Ok(())
}

/// Carries the unchanged fields of the current row into the next state.
fn write_from(current: &SubscriptionEntity, input: &TransitionInput<'_>) -> UpsertSubscriptionEntity {
    UpsertSubscriptionEntity {
        id: current.id,
        user_id: current.user_id,
        plan_id: current.plan_id,
        status: current.status.clone(),
        leads_balance: current.leads_balance,
        leads_bonus: current.leads_bonus,
        current_period_start: current.current_period_start,
        current_period_end: current.current_period_end,
        gateway_transaction_id: Some(input.transaction_id.to_string()),
        gateway_subscription_id: input
            .gateway_subscription_id
            .map(str::to_string)
            .or_else(|| current.gateway_subscription_id.clone()),
        cancelled_at: current.cancelled_at,
        cancellation_reason: current.cancellation_reason.clone(),
    }
}

/// Computes the next subscription state for a validated, decoded event.
/// Pure: all reads happen before the call, the write happens after it.
pub fn transition(input: TransitionInput<'_>) -> Result<LedgerDecision, LedgerError> {
    // Re-applying the transaction that produced the current state must be
    // a no-op, whatever the operation. This covers a crash between the
    // ledger write and the processed-mark on the event.
    if let Some(current) = input.current {
        if current.gateway_transaction_id.as_deref() == Some(input.transaction_id) {
            return Ok(LedgerDecision::NoOp {
                reason: "transaction already applied to this subscription",
            });
        }
    }

    if input.operation != OperationType::Cancellation
        && matches!(
            input.outcome,
            GatewayOutcome::Declined | GatewayOutcome::Refunded
        )
    {
        return Ok(LedgerDecision::NoOp {
            reason: "declined or refunded payment leaves the ledger untouched",
        });
    }

    match input.operation {
        OperationType::New => {
            require_plan(&input)?;

            if let Some(current) = input.current.filter(|current| is_active(current)) {
                if current.plan_id == input.catalog_entry.id {
                    return Ok(LedgerDecision::NoOp {
                        reason: "duplicate checkout for already-active plan",
                    });
                }
            }

            let entity = UpsertSubscriptionEntity {
                id: input
                    .current
                    .map(|current| current.id)
                    .unwrap_or_else(Uuid::new_v4),
                user_id: input.user_id,
                plan_id: input.catalog_entry.id,
                status: SubscriptionStatus::Active.to_string(),
                leads_balance: input.catalog_entry.leads_included,
                // Bonus leads are purchased independently of any plan and
                // survive re-activation.
                leads_bonus: input.current.map(|current| current.leads_bonus).unwrap_or(0),
                current_period_start: input.now,
                current_period_end: input.now + Duration::days(PERIOD_DAYS),
                gateway_transaction_id: Some(input.transaction_id.to_string()),
                gateway_subscription_id: input.gateway_subscription_id.map(str::to_string),
                cancelled_at: None,
                cancellation_reason: None,
            };

            Ok(LedgerDecision::Apply {
                entity,
                expected_version: input.current.map(|current| current.version),
            })
        }
        OperationType::Renewal => {
            require_plan(&input)?;
            let current = active_subscription(&input)?;

            if current.plan_id != input.catalog_entry.id {
                return Err(LedgerError::PlanMismatch {
                    subject_id: input.catalog_entry.id,
                    active_plan_id: current.plan_id,
                });
            }

            let period_start = if current.current_period_end > input.now {
                current.current_period_end
            } else {
                input.now
            };

            let mut entity = write_from(current, &input);
            // Additive: unused balance carries over across renewals.
            entity.leads_balance = current
                .leads_balance
                .saturating_add(input.catalog_entry.leads_included);
            entity.current_period_start = period_start;
            entity.current_period_end = period_start + Duration::days(PERIOD_DAYS);

            Ok(LedgerDecision::Apply {
                entity,
                expected_version: Some(current.version),
            })
        }
        OperationType::Upgrade => {
            require_plan(&input)?;
            let current = active_subscription(&input)?;

            let mut entity = write_from(current, &input);
            entity.plan_id = input.catalog_entry.id;
            // Never punish an upgrade by truncating unused balance.
            entity.leads_balance = current
                .leads_balance
                .max(input.catalog_entry.leads_included);

            Ok(LedgerDecision::Apply {
                entity,
                expected_version: Some(current.version),
            })
        }
        OperationType::Downgrade => {
            require_plan(&input)?;
            let current = active_subscription(&input)?;

            let mut entity = write_from(current, &input);
            entity.plan_id = input.catalog_entry.id;
            entity.leads_balance = current
                .leads_balance
                .min(input.catalog_entry.leads_included);

            Ok(LedgerDecision::Apply {
                entity,
                expected_version: Some(current.version),
            })
        }
        OperationType::PackagePurchase => {
            if input.catalog_entry.kind != CatalogKind::LeadPackage {
                return Err(LedgerError::NotAPackage {
                    subject_id: input.catalog_entry.id,
                });
            }
            let current = active_subscription(&input)?;

            let mut entity = write_from(current, &input);
            // Independent top-up: plan and period stay untouched.
            entity.leads_bonus = current
                .leads_bonus
                .saturating_add(input.catalog_entry.leads_included);

            Ok(LedgerDecision::Apply {
                entity,
                expected_version: Some(current.version),
            })
        }
        OperationType::Cancellation => {
            let current = active_subscription(&input)?;

            let mut entity = write_from(current, &input);
            // "No more billing", not "immediate revocation": balance and
            // period end stay as they are until the expiry sweep runs.
            entity.status = SubscriptionStatus::Cancelled.to_string();
            entity.cancelled_at = Some(input.now);
            entity.cancellation_reason = Some(
                input
                    .cancellation_reason
                    .unwrap_or("gateway cancellation notice")
                    .to_string(),
            );

            Ok(LedgerDecision::Apply {
                entity,
                expected_version: Some(current.version),
            })
        }
    }
}
