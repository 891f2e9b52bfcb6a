use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::plan_catalog::PlanCatalog;
use crate::application::retry::{RetryPolicy, RetryableWriter};
use crate::application::usecases::gateway_webhook::{
    ReconcileError, WebhookReconciliationUseCase,
};
use crate::config::config_model::DotEnvyConfig;
use crate::domain::repositories::plans::PlanRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::repositories::webhook_events::WebhookEventRepository;
use crate::infrastructure::axum_http::error_responses::ErrorResponse;
use crate::infrastructure::postgres::postgres_connection::PgPoolSquad;
use crate::infrastructure::postgres::repositories::{
    plans::PlanPostgres, subscriptions::SubscriptionPostgres,
    webhook_events::WebhookEventPostgres,
};
use crate::payments::gateway_client::{GatewayClient, SIGNATURE_HEADER};

/// Body of the 200 answer the gateway sees for every validly evaluated
/// notification, duplicates and declines included.
#[derive(Debug, Serialize)]
struct WebhookResponse {
    success: bool,
    processed: bool,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let webhook_repository = WebhookEventPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let plan_repository = PlanPostgres::new(Arc::clone(&db_pool));
    let catalog = PlanCatalog::new(
        Arc::new(plan_repository),
        Duration::from_secs(config.catalog.ttl_seconds),
    );
    let gateway = GatewayClient::new(
        config.gateway.webhook_secret.clone(),
        config.gateway.checkout_base_url.clone(),
        config.gateway.success_url.clone(),
        config.gateway.cancel_url.clone(),
        config.gateway.notification_url.clone(),
    );
    let writer = RetryableWriter::new(RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.backoff_ms),
    ));
    let usecase = WebhookReconciliationUseCase::new(
        Arc::new(webhook_repository),
        Arc::new(subscription_repository),
        Arc::new(catalog),
        Arc::new(gateway),
        writer,
    );

    Router::new()
        .route("/", post(receive))
        .route("/:event_id/replay", post(replay))
        .with_state(Arc::new(usecase))
}

pub async fn receive<W, S, P>(
    State(usecase): State<Arc<WebhookReconciliationUseCase<W, S, P>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match usecase.accept(&body, signature).await {
        Ok(receipt) => {
            info!(
                event_id = %receipt.event_id,
                processed = receipt.processed(),
                "gateway_webhook: notification answered"
            );
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    success: true,
                    processed: receipt.processed(),
                }),
            )
                .into_response()
        }
        Err(err) => map_error("receive", err),
    }
}

pub async fn replay<W, S, P>(
    State(usecase): State<Arc<WebhookReconciliationUseCase<W, S, P>>>,
    Path(event_id): Path<Uuid>,
) -> Response
where
    W: WebhookEventRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    match usecase.replay(event_id).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(err) => map_error("replay", err),
    }
}

fn map_error(label: &str, err: ReconcileError) -> Response {
    let status = err.status_code();
    warn!(
        status = status.as_u16(),
        error = %err,
        "gateway_webhook: {} rejected",
        label
    );
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message: err.to_string(),
        }),
    )
        .into_response()
}
