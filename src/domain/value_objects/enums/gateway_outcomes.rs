use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Internal outcome a raw gateway status maps to. Anything outside this set
/// is an `UnknownStatus` failure carrying the raw token for triage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    Approved,
    Declined,
    Pending,
    Refunded,
}

impl GatewayOutcome {
    /// Maps both the symbolic statuses and the gateway's numeric code
    /// strings. Matching is case-insensitive on the trimmed token.
    pub fn from_gateway_status(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "paid" | "completed" | "3" | "4" => Some(GatewayOutcome::Approved),
            "declined" | "denied" | "failed" | "7" => Some(GatewayOutcome::Declined),
            "pending" | "waiting_payment" | "in_analysis" | "1" | "2" => {
                Some(GatewayOutcome::Pending)
            }
            "refunded" | "returned" | "6" => Some(GatewayOutcome::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOutcome::Approved => "approved",
            GatewayOutcome::Declined => "declined",
            GatewayOutcome::Pending => "pending",
            GatewayOutcome::Refunded => "refunded",
        }
    }
}

impl Display for GatewayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
