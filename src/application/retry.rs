use std::future::Future;
use std::time::Duration;

use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::repositories::subscriptions::VersionConflict;

/// Bounded-retry schedule for persistence writes. Injected from config so
/// tests can run with zero backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn no_backoff(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[derive(Debug, Error)]
pub enum WriteFailure {
    #[error("write '{label}' failed after {attempts} attempts: {cause}")]
    RetriesExhausted {
        label: &'static str,
        attempts: u32,
        cause: anyhow::Error,
    },
    #[error("write '{label}' rejected: {cause}")]
    NonRetryable {
        label: &'static str,
        cause: anyhow::Error,
    },
}

impl WriteFailure {
    pub fn is_version_conflict(&self) -> bool {
        match self {
            WriteFailure::NonRetryable { cause, .. } => {
                cause.downcast_ref::<VersionConflict>().is_some()
            }
            WriteFailure::RetriesExhausted { .. } => false,
        }
    }
}

/// Transient means the identical mutation may succeed if simply re-issued:
/// pool acquisition lag, dropped connections, serialization aborts.
/// Validation and conflict errors are never transient.
pub fn is_transient(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<VersionConflict>().is_some() {
        return false;
    }
    if err.downcast_ref::<diesel::r2d2::PoolError>().is_some() {
        return true;
    }
    if let Some(db_err) = err.downcast_ref::<diesel::result::Error>() {
        return matches!(
            db_err,
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
                | diesel::result::Error::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    _
                )
                | diesel::result::Error::BrokenTransactionManager
        );
    }
    false
}

/// Wraps a single logical write with bounded retries and linear backoff.
/// The mutation itself must be safe to re-issue (keyed upsert or unique
/// insert); this wrapper only decides whether re-issuing is worth it.
#[derive(Debug, Clone, Copy)]
pub struct RetryableWriter {
    policy: RetryPolicy,
}

impl RetryableWriter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn write<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T, WriteFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(label, attempt, "retryable write succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !is_transient(&err) => {
                    warn!(label, error = %err, "write rejected without retry");
                    return Err(WriteFailure::NonRetryable { label, cause: err });
                }
                Err(err) => {
                    if attempt >= self.policy.max_attempts {
                        error!(
                            label,
                            attempt,
                            error = %err,
                            "write retries exhausted"
                        );
                        return Err(WriteFailure::RetriesExhausted {
                            label,
                            attempts: attempt,
                            cause: err,
                        });
                    }

                    let delay = self.policy.backoff * attempt;
                    warn!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient write failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
