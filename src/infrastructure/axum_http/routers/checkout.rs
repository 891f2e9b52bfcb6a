use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::warn;

use crate::application::plan_catalog::PlanCatalog;
use crate::application::usecases::checkout::{CheckoutError, CheckoutUseCase};
use crate::config::config_model::DotEnvyConfig;
use crate::domain::repositories::plans::PlanRepository;
use crate::domain::value_objects::checkout::CheckoutRequestModel;
use crate::infrastructure::axum_http::error_responses::ErrorResponse;
use crate::infrastructure::postgres::postgres_connection::PgPoolSquad;
use crate::infrastructure::postgres::repositories::plans::PlanPostgres;
use crate::payments::gateway_client::GatewayClient;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
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
    let usecase = CheckoutUseCase::new(Arc::new(catalog), Arc::new(gateway));

    Router::new()
        .route("/", post(build_checkout_link))
        .with_state(Arc::new(usecase))
}

pub async fn build_checkout_link<P>(
    State(usecase): State<Arc<CheckoutUseCase<P>>>,
    Json(request): Json<CheckoutRequestModel>,
) -> Response
where
    P: PlanRepository + Send + Sync + 'static,
{
    match usecase
        .build_checkout_link(request.user_id, request.subject_id, request.operation)
        .await
    {
        Ok(link) => (StatusCode::OK, Json(link)).into_response(),
        Err(err) => map_error(err),
    }
}

fn map_error(err: CheckoutError) -> Response {
    let status = err.status_code();
    warn!(status = status.as_u16(), error = %err, "checkout: request rejected");
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            message: err.to_string(),
        }),
    )
        .into_response()
}
