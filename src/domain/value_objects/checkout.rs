use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::enums::operation_types::OperationType;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequestModel {
    pub user_id: Uuid,
    pub subject_id: Uuid,
    pub operation: OperationType,
}

/// The outbound checkout link plus the freshly minted reference the gateway
/// will echo back in its webhook. Nothing is persisted at build time.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckoutLink {
    pub checkout_url: String,
    pub reference: String,
}
