use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::value_objects::enums::operation_types::OperationType;

const DELIMITER: char = '_';

/// Constant namespace segment some legacy producers prepend to the token.
/// Decoding strips it; encoding never emits it.
const LEGACY_NAMESPACE: &str = "chk";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed reference: {0}")]
pub struct MalformedReference(pub String);

/// The opaque token round-tripped through the gateway, decoded back into
/// the operation it was minted for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub operation: OperationType,
    pub subject_id: Uuid,
    pub user_id: Uuid,
    /// Appended at encode time for uniqueness and debugging only; absent on
    /// the legacy 3-segment form and never used for business logic.
    pub issued_at_ms: Option<i64>,
}

impl Reference {
    pub fn encode(
        operation: OperationType,
        subject_id: Uuid,
        user_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
            operation.as_str(),
            subject_id,
            user_id,
            issued_at.timestamp_millis()
        )
    }

    /// Accepts the canonical 4-segment form, the same form behind a legacy
    /// namespace segment, and the timestamp-less 3-segment form. The
    /// operation token is matched longest-first because `package_purchase`
    /// contains the delimiter itself.
    pub fn decode(token: &str) -> Result<Self, MalformedReference> {
        let token = token.trim();
        if token.is_empty() {
            return Err(MalformedReference("empty token".to_string()));
        }

        let body = match token
            .strip_prefix(LEGACY_NAMESPACE)
            .and_then(|rest| rest.strip_prefix(DELIMITER))
        {
            Some(rest) => {
                warn!(token, "reference: legacy namespaced form seen");
                rest
            }
            None => token,
        };

        let (operation, rest) = OperationType::ALL
            .into_iter()
            .find_map(|operation| {
                body.strip_prefix(operation.as_str())
                    .and_then(|rest| rest.strip_prefix(DELIMITER))
                    .map(|rest| (operation, rest))
            })
            .ok_or_else(|| {
                MalformedReference(format!("unknown operation in token: {token}"))
            })?;

        let segments: Vec<&str> = rest.split(DELIMITER).collect();
        let (subject_raw, user_raw, issued_raw) = match segments.as_slice() {
            [subject, user, issued] => (*subject, *user, Some(*issued)),
            [subject, user] => (*subject, *user, None),
            _ => {
                return Err(MalformedReference(format!(
                    "expected subject, user and optional timestamp segments, got {} in: {token}",
                    segments.len()
                )));
            }
        };

        let subject_id = Uuid::parse_str(subject_raw)
            .map_err(|_| MalformedReference(format!("subject id is not a uuid: {subject_raw}")))?;
        let user_id = Uuid::parse_str(user_raw)
            .map_err(|_| MalformedReference(format!("user id is not a uuid: {user_raw}")))?;

        Ok(Self {
            operation,
            subject_id,
            user_id,
            issued_at_ms: issued_raw.and_then(|raw| raw.parse::<i64>().ok()),
        })
    }
}
