use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::warn;
use uuid::Uuid;

use crate::application::plan_catalog::PlanCatalog;
use crate::application::retry::{RetryPolicy, RetryableWriter};
use crate::application::usecases::subscriptions::{SubscriptionError, SubscriptionUseCase};
use crate::config::config_model::DotEnvyConfig;
use crate::domain::repositories::plans::PlanRepository;
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::value_objects::subscriptions::{ConsumeLeadsModel, GrantLeadsModel};
use crate::infrastructure::axum_http::error_responses::ErrorResponse;
use crate::infrastructure::postgres::postgres_connection::PgPoolSquad;
use crate::infrastructure::postgres::repositories::{
    plans::PlanPostgres, subscriptions::SubscriptionPostgres,
};

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let plan_repository = PlanPostgres::new(Arc::clone(&db_pool));
    let subscription_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let catalog = PlanCatalog::new(
        Arc::new(plan_repository),
        Duration::from_secs(config.catalog.ttl_seconds),
    );
    let writer = RetryableWriter::new(RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.backoff_ms),
    ));
    let usecase =
        SubscriptionUseCase::new(Arc::new(catalog), Arc::new(subscription_repository), writer);

    Router::new()
        .route("/plans", get(list_plans))
        .route("/users/:user_id/current", get(get_current_subscription))
        .route("/leads/consume", post(consume_leads))
        .route("/leads/grant", post(grant_bonus_leads))
        .with_state(Arc::new(usecase))
}

pub async fn list_plans<P, S>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S>>>,
) -> Response
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
{
    match usecase.list_plans().await {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(err) => map_error(err),
    }
}

pub async fn get_current_subscription<P, S>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S>>>,
    Path(user_id): Path<Uuid>,
) -> Response
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
{
    match usecase.get_current_subscription(user_id).await {
        Ok(subscription) => (StatusCode::OK, Json(subscription)).into_response(),
        Err(err) => map_error(err),
    }
}

pub async fn consume_leads<P, S>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S>>>,
    Json(request): Json<ConsumeLeadsModel>,
) -> Response
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
{
    match usecase
        .consume_leads(request.user_id, request.quantity)
        .await
    {
        Ok(subscription) => (StatusCode::OK, Json(subscription)).into_response(),
        Err(err) => map_error(err),
    }
}

pub async fn grant_bonus_leads<P, S>(
    State(usecase): State<Arc<SubscriptionUseCase<P, S>>>,
    Json(request): Json<GrantLeadsModel>,
) -> Response
where
    P: PlanRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
{
    match usecase
        .grant_bonus_leads(request.user_id, request.quantity)
        .await
    {
        Ok(subscription) => (StatusCode::OK, Json(subscription)).into_response(),
        Err(err) => map_error(err),
    }
}

fn map_error(err: SubscriptionError) -> Response {
    let status = err.status_code();
    warn!(status = status.as_u16(), error = %err, "subscriptions: request rejected");
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message: err.to_string(),
        }),
    )
        .into_response()
}
