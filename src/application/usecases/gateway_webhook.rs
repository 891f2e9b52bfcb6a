use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::plan_catalog::PlanCatalog;
use crate::application::retry::{RetryableWriter, WriteFailure};
use crate::application::usecases::ledger::{self, LedgerDecision, TransitionInput};
use crate::domain::entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity};
use crate::domain::repositories::plans::PlanRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::webhook_events::WebhookEventRepository;
use crate::domain::value_objects::enums::gateway_outcomes::GatewayOutcome;
use crate::domain::value_objects::gateway_webhooks::{
    GatewayNotification, WebhookDisposition, WebhookReceipt,
};
use crate::domain::value_objects::references::Reference;
use crate::payments::gateway_client::GatewayClient;

/// How many times a version-conflicted mutation is recomputed from fresh
/// persisted state before the event is left for redelivery.
const MAX_RECOMPUTES: u32 = 2;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("unauthenticated webhook")]
    Unauthenticated,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing gateway transaction id")]
    MissingTransactionId,
    #[error("webhook event {0} not found")]
    EventNotFound(Uuid),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReconcileError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ReconcileError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ReconcileError::MalformedPayload(_) | ReconcileError::MissingTransactionId => {
                StatusCode::BAD_REQUEST
            }
            ReconcileError::EventNotFound(_) => StatusCode::NOT_FOUND,
            ReconcileError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

pub struct WebhookReconciliationUseCase<W, S, P>
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    webhook_repo: Arc<W>,
    subscription_repo: Arc<S>,
    catalog: Arc<PlanCatalog<P>>,
    gateway: Arc<GatewayClient>,
    writer: RetryableWriter,
}

impl<W, S, P> WebhookReconciliationUseCase<W, S, P>
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    pub fn new(
        webhook_repo: Arc<W>,
        subscription_repo: Arc<S>,
        catalog: Arc<PlanCatalog<P>>,
        gateway: Arc<GatewayClient>,
        writer: RetryableWriter,
    ) -> Self {
        Self {
            webhook_repo,
            subscription_repo,
            catalog,
            gateway,
            writer,
        }
    }

    /// Ingests an inbound gateway notification. Rejects before creating any
    /// durable record only for authentication and payload-shape problems;
    /// everything past that point is recorded first and replayable from the
    /// stored raw payload.
    pub async fn accept(
        &self,
        raw_payload: &[u8],
        signature_header: &str,
    ) -> ReconcileResult<WebhookReceipt> {
        self.gateway
            .verify_webhook_signature(raw_payload, signature_header)
            .map_err(|err| {
                warn!(error = %err, "gateway_webhook: signature verification failed");
                ReconcileError::Unauthenticated
            })?;

        let raw_value: serde_json::Value = serde_json::from_slice(raw_payload)
            .map_err(|err| ReconcileError::MalformedPayload(err.to_string()))?;
        let notification: GatewayNotification = serde_json::from_value(raw_value.clone())
            .map_err(|err| ReconcileError::MalformedPayload(err.to_string()))?;

        let transaction_id = notification
            .transaction_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ReconcileError::MissingTransactionId)?;

        info!(
            %transaction_id,
            status = %notification.status,
            reference = %notification.item.reference,
            "gateway_webhook: notification received"
        );

        let (event, inserted) = self
            .webhook_repo
            .insert_or_fetch(InsertWebhookEventEntity {
                id: Uuid::new_v4(),
                gateway_transaction_id: transaction_id.clone(),
                raw_payload: raw_value,
                processed: false,
                received_at: Utc::now(),
            })
            .await?;

        if !inserted && event.processed {
            info!(
                %transaction_id,
                event_id = %event.id,
                "gateway_webhook: duplicate delivery of a processed transaction"
            );
            return Ok(WebhookReceipt {
                event_id: event.id,
                disposition: WebhookDisposition::AlreadyProcessed,
            });
        }

        self.evaluate(&event, &notification).await
    }

    /// Operator-facing replay of a stored event from its raw payload. The
    /// signature was checked at ingestion time and is not re-checked.
    pub async fn replay(&self, event_id: Uuid) -> ReconcileResult<WebhookReceipt> {
        let event = self
            .webhook_repo
            .find_by_id(event_id)
            .await?
            .ok_or(ReconcileError::EventNotFound(event_id))?;

        if event.processed {
            return Ok(WebhookReceipt {
                event_id: event.id,
                disposition: WebhookDisposition::AlreadyProcessed,
            });
        }

        let notification: GatewayNotification =
            serde_json::from_value(event.raw_payload.clone())
                .map_err(|err| ReconcileError::MalformedPayload(err.to_string()))?;

        info!(%event_id, "gateway_webhook: operator replay");
        self.evaluate(&event, &notification).await
    }

    async fn evaluate(
        &self,
        event: &WebhookEventEntity,
        notification: &GatewayNotification,
    ) -> ReconcileResult<WebhookReceipt> {
        let outcome = match GatewayOutcome::from_gateway_status(&notification.status) {
            Some(outcome) => outcome,
            None => {
                return self
                    .fail(
                        event,
                        format!("unknown gateway status: {}", notification.status),
                    )
                    .await;
            }
        };

        if outcome == GatewayOutcome::Pending {
            // The terminal status arrives as a redelivery of the same
            // transaction id, which dedup lets through while the event is
            // unprocessed.
            info!(event_id = %event.id, "gateway_webhook: pending outcome, leaving event open");
            return Ok(WebhookReceipt {
                event_id: event.id,
                disposition: WebhookDisposition::Deferred {
                    reason: "pending gateway outcome".to_string(),
                },
            });
        }

        let reference = match Reference::decode(&notification.item.reference) {
            Ok(reference) => reference,
            Err(err) => return self.fail(event, err.to_string()).await,
        };

        let catalog_entry = match self.catalog.find_active_by_id(reference.subject_id).await? {
            Some(entry) => entry,
            None => {
                return self
                    .fail(
                        event,
                        format!("unknown plan or package: {}", reference.subject_id),
                    )
                    .await;
            }
        };

        let mut recomputes = 0u32;
        let applied = loop {
            let current = self
                .subscription_repo
                .find_current_by_user_id(reference.user_id)
                .await?;

            let decision = match ledger::transition(TransitionInput {
                operation: reference.operation,
                outcome,
                user_id: reference.user_id,
                current: current.as_ref(),
                catalog_entry: &catalog_entry,
                transaction_id: &event.gateway_transaction_id,
                gateway_subscription_id: notification.subscription_code.as_deref(),
                cancellation_reason: None,
                now: Utc::now(),
            }) {
                Ok(decision) => decision,
                Err(err) => return self.fail(event, err.to_string()).await,
            };

            match decision {
                LedgerDecision::NoOp { reason } => {
                    info!(
                        event_id = %event.id,
                        user_id = %reference.user_id,
                        reason,
                        "gateway_webhook: no ledger effect"
                    );
                    break false;
                }
                LedgerDecision::Apply {
                    entity,
                    expected_version,
                } => {
                    let repo = Arc::clone(&self.subscription_repo);
                    let result = self
                        .writer
                        .write("subscription reconcile", move || {
                            let repo = Arc::clone(&repo);
                            let entity = entity.clone();
                            async move { repo.reconcile_upsert(entity, expected_version).await }
                        })
                        .await;

                    match result {
                        Ok(subscription) => {
                            info!(
                                event_id = %event.id,
                                user_id = %reference.user_id,
                                plan_id = %subscription.plan_id,
                                leads_balance = subscription.leads_balance,
                                leads_bonus = subscription.leads_bonus,
                                status = %subscription.status,
                                "gateway_webhook: ledger mutation applied"
                            );
                            break true;
                        }
                        Err(failure) if failure.is_version_conflict() => {
                            if recomputes < MAX_RECOMPUTES {
                                recomputes += 1;
                                warn!(
                                    event_id = %event.id,
                                    user_id = %reference.user_id,
                                    recomputes,
                                    "gateway_webhook: concurrent mutation, recomputing from fresh state"
                                );
                                continue;
                            }
                            return self.defer(event, failure.to_string()).await;
                        }
                        Err(failure @ WriteFailure::RetriesExhausted { .. }) => {
                            return self.defer(event, failure.to_string()).await;
                        }
                        Err(failure) => {
                            return self.fail(event, failure.to_string()).await;
                        }
                    }
                }
            }
        };

        let repo = Arc::clone(&self.webhook_repo);
        let event_id = event.id;
        let mark = self
            .writer
            .write("webhook mark processed", move || {
                let repo = Arc::clone(&repo);
                async move { repo.mark_processed(event_id, outcome.as_str()).await }
            })
            .await;

        match mark {
            Ok(()) => Ok(WebhookReceipt {
                event_id: event.id,
                disposition: if applied {
                    WebhookDisposition::Applied { outcome }
                } else {
                    WebhookDisposition::NoEffect { outcome }
                },
            }),
            Err(failure) => {
                // The ledger write (if any) already landed; re-evaluation is
                // safe because the transaction id is recorded on the row.
                error!(
                    event_id = %event.id,
                    error = %failure,
                    "gateway_webhook: processed-mark failed, event stays open"
                );
                Ok(WebhookReceipt {
                    event_id: event.id,
                    disposition: WebhookDisposition::Deferred {
                        reason: failure.to_string(),
                    },
                })
            }
        }
    }

    /// Terminal failure: reason recorded on the event for operator replay.
    async fn fail(
        &self,
        event: &WebhookEventEntity,
        reason: String,
    ) -> ReconcileResult<WebhookReceipt> {
        warn!(
            event_id = %event.id,
            transaction_id = %event.gateway_transaction_id,
            reason = %reason,
            "gateway_webhook: evaluation failed"
        );
        self.webhook_repo.record_failure(event.id, &reason).await?;
        Ok(WebhookReceipt {
            event_id: event.id,
            disposition: WebhookDisposition::Failed { reason },
        })
    }

    /// Retriable failure: reason recorded, event stays unprocessed so a
    /// redelivery or replay picks it up.
    async fn defer(
        &self,
        event: &WebhookEventEntity,
        reason: String,
    ) -> ReconcileResult<WebhookReceipt> {
        error!(
            event_id = %event.id,
            transaction_id = %event.gateway_transaction_id,
            reason = %reason,
            "gateway_webhook: write budget exhausted, leaving event open"
        );
        self.webhook_repo.record_failure(event.id, &reason).await?;
        Ok(WebhookReceipt {
            event_id: event.id,
            disposition: WebhookDisposition::Deferred { reason },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;
    use url::Url;

    use super::*;
    use crate::application::retry::RetryPolicy;
    use crate::application::usecases::ledger::PERIOD_DAYS;
    use crate::domain::entities::plans::PlanEntity;
    use crate::domain::entities::subscriptions::SubscriptionEntity;
    use crate::domain::repositories::plans::MockPlanRepository;
    use crate::domain::repositories::subscriptions::{
        MockSubscriptionRepository, VersionConflict,
    };
    use crate::domain::repositories::webhook_events::MockWebhookEventRepository;
    use crate::domain::value_objects::enums::catalog_kinds::CatalogKind;
    use crate::domain::value_objects::enums::operation_types::OperationType;
    use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

    const WEBHOOK_SECRET: &str = "whsec_test_secret";

    fn gateway() -> Arc<GatewayClient> {
        Arc::new(GatewayClient::new(
            WEBHOOK_SECRET.to_string(),
            Url::parse("https://pay.example.com/checkout").unwrap(),
            "https://app.example.com/ok".to_string(),
            "https://app.example.com/cancel".to_string(),
            "https://app.example.com/api/v1/gateway-webhooks".to_string(),
        ))
    }

    fn sign_header(payload: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
        mac.update(format!("1700000000.{}", String::from_utf8_lossy(payload)).as_bytes());
        format!("t=1700000000,v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn notification_payload(transaction_id: &str, status: &str, reference: &str) -> Vec<u8> {
        json!({
            "transaction_id": transaction_id,
            "amount_cents": 9900,
            "status": status,
            "item": { "product_code": "PROD-START", "reference": reference },
            "customer": { "email": "buyer@example.com", "name": "Buyer" },
            "subscription_code": "GWSUB-9"
        })
        .to_string()
        .into_bytes()
    }

    fn sample_plan(id: Uuid, leads_included: i64) -> PlanEntity {
        PlanEntity {
            id,
            name: "start".to_string(),
            display_name: "Start".to_string(),
            kind: CatalogKind::Plan,
            price_cents: 9900,
            leads_included,
            gateway_product_code: "PROD-START".to_string(),
            is_active: true,
        }
    }

    fn sample_event(transaction_id: &str, raw_payload: serde_json::Value) -> WebhookEventEntity {
        WebhookEventEntity {
            id: Uuid::new_v4(),
            gateway_transaction_id: transaction_id.to_string(),
            raw_payload,
            processed: false,
            outcome: None,
            error_message: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    fn sample_subscription(user_id: Uuid, plan_id: Uuid) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_id,
            status: SubscriptionStatus::Active.to_string(),
            leads_balance: 300,
            leads_bonus: 0,
            current_period_start: now - Duration::days(10),
            current_period_end: now + Duration::days(20),
            gateway_transaction_id: Some("TX-OLD".to_string()),
            gateway_subscription_id: Some("GWSUB-9".to_string()),
            cancelled_at: None,
            cancellation_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn entity_from(write: crate::domain::entities::subscriptions::UpsertSubscriptionEntity, version: i64) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: write.id,
            user_id: write.user_id,
            plan_id: write.plan_id,
            status: write.status,
            leads_balance: write.leads_balance,
            leads_bonus: write.leads_bonus,
            current_period_start: write.current_period_start,
            current_period_end: write.current_period_end,
            gateway_transaction_id: write.gateway_transaction_id,
            gateway_subscription_id: write.gateway_subscription_id,
            cancelled_at: write.cancelled_at,
            cancellation_reason: write.cancellation_reason,
            version,
            created_at: now,
            updated_at: now,
        }
    }

    fn catalog_with_plan(plan: PlanEntity) -> Arc<PlanCatalog<MockPlanRepository>> {
        let mut plan_repo = MockPlanRepository::new();
        plan_repo.expect_find_by_id().returning(move |_| {
            let plan = plan.clone();
            Box::pin(async move { Ok(Some(plan)) })
        });
        Arc::new(PlanCatalog::new(
            Arc::new(plan_repo),
            StdDuration::from_secs(60),
        ))
    }

    fn empty_catalog() -> Arc<PlanCatalog<MockPlanRepository>> {
        let mut plan_repo = MockPlanRepository::new();
        plan_repo
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        Arc::new(PlanCatalog::new(
            Arc::new(plan_repo),
            StdDuration::from_secs(60),
        ))
    }

    fn usecase(
        webhook_repo: MockWebhookEventRepository,
        subscription_repo: MockSubscriptionRepository,
        catalog: Arc<PlanCatalog<MockPlanRepository>>,
    ) -> WebhookReconciliationUseCase<
        MockWebhookEventRepository,
        MockSubscriptionRepository,
        MockPlanRepository,
    > {
        WebhookReconciliationUseCase::new(
            Arc::new(webhook_repo),
            Arc::new(subscription_repo),
            catalog,
            gateway(),
            RetryableWriter::new(RetryPolicy::no_backoff(3)),
        )
    }

    #[tokio::test]
    async fn new_approved_webhook_activates_subscription() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "approved", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value.clone());
        let event_id = event.id;

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_mark_processed()
            .withf(move |id, outcome| *id == event_id && outcome == "approved")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_by_user_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo
            .expect_reconcile_upsert()
            .withf(move |entity, expected_version| {
                entity.leads_balance == 1000
                    && entity.status == "active"
                    && entity.gateway_transaction_id.as_deref() == Some("T1")
                    && entity.current_period_end - entity.current_period_start
                        == Duration::days(PERIOD_DAYS)
                    && expected_version.is_none()
            })
            .times(1)
            .returning(|entity, _| Box::pin(async move { Ok(entity_from(entity, 1)) }));

        let usecase = usecase(
            webhook_repo,
            subscription_repo,
            catalog_with_plan(sample_plan(plan_id, 1000)),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(receipt.processed());
        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Applied {
                outcome: GatewayOutcome::Approved
            }
        ));
    }

    #[tokio::test]
    async fn redelivery_of_processed_transaction_short_circuits() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "approved", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let mut event = sample_event("T1", raw_value);
        event.processed = true;
        event.outcome = Some("approved".to_string());

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, false)) })
        });

        // No subscription repo expectations: any ledger call would panic.
        let usecase = usecase(
            webhook_repo,
            MockSubscriptionRepository::new(),
            catalog_with_plan(sample_plan(plan_id, 1000)),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(receipt.processed());
        assert_eq!(receipt.disposition, WebhookDisposition::AlreadyProcessed);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_a_record() {
        let payload = notification_payload("T1", "approved", "whatever");

        let usecase = usecase(
            MockWebhookEventRepository::new(),
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let err = usecase
            .accept(&payload, "t=1700000000,v1=deadbeef")
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Unauthenticated));
    }

    #[tokio::test]
    async fn missing_transaction_id_is_rejected_without_a_record() {
        let payload = json!({
            "status": "approved",
            "item": { "reference": "new_x_y_1" }
        })
        .to_string()
        .into_bytes();

        let usecase = usecase(
            MockWebhookEventRepository::new(),
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let err = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::MissingTransactionId));
    }

    #[tokio::test]
    async fn unparseable_payload_is_rejected_without_a_record() {
        let payload = b"not json at all".to_vec();

        let usecase = usecase(
            MockWebhookEventRepository::new(),
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let err = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn unknown_status_marks_the_event_failed() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "chargeback", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);
        let event_id = event.id;

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_record_failure()
            .withf(move |id, reason| *id == event_id && reason.contains("chargeback"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            webhook_repo,
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(!receipt.processed());
        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_reference_marks_the_event_failed() {
        let payload = notification_payload("T1", "approved", "garbage-token");
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_record_failure()
            .withf(|_, reason| reason.contains("malformed reference"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            webhook_repo,
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_plan_marks_the_event_failed() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "approved", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_record_failure()
            .withf(|_, reason| reason.contains("unknown plan or package"))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let usecase = usecase(
            webhook_repo,
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn declined_payment_is_processed_with_no_effect() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::Renewal, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "declined", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);
        let event_id = event.id;

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_mark_processed()
            .withf(move |id, outcome| *id == event_id && outcome == "declined")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_by_user_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let usecase = usecase(
            webhook_repo,
            subscription_repo,
            catalog_with_plan(sample_plan(plan_id, 1000)),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(receipt.processed());
        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::NoEffect {
                outcome: GatewayOutcome::Declined
            }
        ));
    }

    #[tokio::test]
    async fn pending_outcome_leaves_the_event_open() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "pending", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });

        let usecase = usecase(
            webhook_repo,
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(!receipt.processed());
        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Deferred { .. }
        ));
    }

    #[tokio::test]
    async fn exhausted_write_retries_leave_the_event_open() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "approved", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_record_failure()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_by_user_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo
            .expect_reconcile_upsert()
            .times(3)
            .returning(|_, _| {
                Box::pin(async {
                    Err(anyhow::Error::new(diesel::result::Error::DatabaseError(
                        diesel::result::DatabaseErrorKind::ClosedConnection,
                        Box::new("connection reset".to_string()),
                    )))
                })
            });

        let usecase = usecase(
            webhook_repo,
            subscription_repo,
            catalog_with_plan(sample_plan(plan_id, 1000)),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(!receipt.processed());
        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Deferred { .. }
        ));
    }

    #[tokio::test]
    async fn version_conflict_recomputes_from_fresh_state() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::Renewal, plan_id, user_id, Utc::now());
        let payload = notification_payload("T2", "approved", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T2", raw_value);
        let event_id = event.id;

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo.expect_insert_or_fetch().returning(move |_| {
            let event = event.clone();
            Box::pin(async move { Ok((event, true)) })
        });
        webhook_repo
            .expect_mark_processed()
            .withf(move |id, _| *id == event_id)
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let current = sample_subscription(user_id, plan_id);
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_by_user_id()
            .times(2)
            .returning(move |_| {
                let current = current.clone();
                Box::pin(async move { Ok(Some(current)) })
            });

        let attempts = Arc::new(AtomicU32::new(0));
        subscription_repo
            .expect_reconcile_upsert()
            .times(2)
            .returning(move |entity, _| {
                let first = attempts.fetch_add(1, Ordering::SeqCst) == 0;
                Box::pin(async move {
                    if first {
                        Err(anyhow::Error::new(VersionConflict {
                            user_id: entity.user_id,
                        }))
                    } else {
                        Ok(entity_from(entity, 2))
                    }
                })
            });

        let usecase = usecase(
            webhook_repo,
            subscription_repo,
            catalog_with_plan(sample_plan(plan_id, 1000)),
        );

        let receipt = usecase
            .accept(&payload, &sign_header(&payload))
            .await
            .unwrap();

        assert!(receipt.processed());
        assert!(matches!(
            receipt.disposition,
            WebhookDisposition::Applied { .. }
        ));
    }

    #[tokio::test]
    async fn replay_reprocesses_a_stored_unprocessed_event() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let reference =
            Reference::encode(OperationType::New, plan_id, user_id, Utc::now());
        let payload = notification_payload("T1", "approved", &reference);
        let raw_value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let event = sample_event("T1", raw_value);
        let event_id = event.id;

        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo
            .expect_find_by_id()
            .withf(move |id| *id == event_id)
            .returning(move |_| {
                let event = event.clone();
                Box::pin(async move { Ok(Some(event)) })
            });
        webhook_repo
            .expect_mark_processed()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_current_by_user_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        subscription_repo
            .expect_reconcile_upsert()
            .times(1)
            .returning(|entity, _| Box::pin(async move { Ok(entity_from(entity, 1)) }));

        let usecase = usecase(
            webhook_repo,
            subscription_repo,
            catalog_with_plan(sample_plan(plan_id, 1000)),
        );

        let receipt = usecase.replay(event_id).await.unwrap();

        assert!(receipt.processed());
    }

    #[tokio::test]
    async fn replay_of_a_missing_event_is_not_found() {
        let mut webhook_repo = MockWebhookEventRepository::new();
        webhook_repo
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));

        let usecase = usecase(
            webhook_repo,
            MockSubscriptionRepository::new(),
            empty_catalog(),
        );

        let err = usecase.replay(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ReconcileError::EventNotFound(_)));
    }
}
