use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Checkout operations round-tripped through the gateway reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    New,
    Renewal,
    Upgrade,
    Downgrade,
    PackagePurchase,
    Cancellation,
}

impl OperationType {
    /// Ordered longest-first so `package_purchase` wins over a shorter
    /// token when matching the head of a delimiter-joined reference.
    pub const ALL: [OperationType; 6] = [
        OperationType::PackagePurchase,
        OperationType::Cancellation,
        OperationType::Downgrade,
        OperationType::Renewal,
        OperationType::Upgrade,
        OperationType::New,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::New => "new",
            OperationType::Renewal => "renewal",
            OperationType::Upgrade => "upgrade",
            OperationType::Downgrade => "downgrade",
            OperationType::PackagePurchase => "package_purchase",
            OperationType::Cancellation => "cancellation",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str() == value)
    }
}

impl Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
