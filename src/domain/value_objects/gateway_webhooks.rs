use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::enums::gateway_outcomes::GatewayOutcome;

/// Inbound gateway notification, parsed strictly at the ingestion boundary.
/// Unknown fields are not modeled here; the full payload is preserved
/// opaquely on the stored webhook event for audit and replay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayNotification {
    pub transaction_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub status: String,
    pub item: GatewayItem,
    pub customer: Option<GatewayCustomer>,
    /// The gateway-side recurring subscription code, when one exists.
    pub subscription_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayItem {
    pub product_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayCustomer {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// What happened to a notification, reported back to the caller and to the
/// operator tooling. Every disposition other than the reject path answers
/// HTTP 200.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "disposition")]
pub enum WebhookDisposition {
    /// A ledger mutation was applied and the event is processed.
    Applied { outcome: GatewayOutcome },
    /// Dedup hit: the transaction was already processed earlier.
    AlreadyProcessed,
    /// Validly evaluated, no ledger effect (declined, refunded, defensive
    /// no-op). Processed.
    NoEffect { outcome: GatewayOutcome },
    /// Left unprocessed on purpose: pending outcome or exhausted write
    /// retries. A redelivery or replay re-evaluates it.
    Deferred { reason: String },
    /// Terminal failure recorded on the event; needs operator replay.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookReceipt {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub disposition: WebhookDisposition,
}

impl WebhookReceipt {
    pub fn processed(&self) -> bool {
        matches!(
            self.disposition,
            WebhookDisposition::Applied { .. }
                | WebhookDisposition::AlreadyProcessed
                | WebhookDisposition::NoEffect { .. }
        )
    }
}
