use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::plan_catalog::PlanCatalog;
use crate::domain::repositories::plans::PlanRepository;
use crate::domain::value_objects::checkout::CheckoutLink;
use crate::domain::value_objects::enums::operation_types::OperationType;
use crate::domain::value_objects::references::Reference;
use crate::payments::gateway_client::GatewayClient;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("plan or package {0} not found")]
    UnknownPlan(Uuid),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CheckoutError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            CheckoutError::UnknownPlan(_) => StatusCode::NOT_FOUND,
            CheckoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Mints a reference and assembles the hosted-checkout URL the gateway will
/// later echo back through the webhook. Nothing is persisted here: the
/// reference is reconstructed entirely from what the gateway returns.
pub struct CheckoutUseCase<P>
where
    P: PlanRepository + Send + Sync + 'static,
{
    catalog: Arc<PlanCatalog<P>>,
    gateway: Arc<GatewayClient>,
}

impl<P> CheckoutUseCase<P>
where
    P: PlanRepository + Send + Sync + 'static,
{
    pub fn new(catalog: Arc<PlanCatalog<P>>, gateway: Arc<GatewayClient>) -> Self {
        Self { catalog, gateway }
    }

    pub async fn build_checkout_link(
        &self,
        user_id: Uuid,
        subject_id: Uuid,
        operation: OperationType,
    ) -> Result<CheckoutLink, CheckoutError> {
        let entry = self
            .catalog
            .find_active_by_id(subject_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    %user_id,
                    %subject_id,
                    %operation,
                    "checkout: unknown or inactive catalog entry"
                );
                CheckoutError::UnknownPlan(subject_id)
            })?;

        let reference = Reference::encode(operation, subject_id, user_id, Utc::now());
        let url = self
            .gateway
            .build_checkout_url(&entry.gateway_product_code, &reference);

        info!(
            %user_id,
            %subject_id,
            %operation,
            product_code = %entry.gateway_product_code,
            "checkout: link built"
        );

        Ok(CheckoutLink {
            checkout_url: url.to_string(),
            reference,
        })
    }
}
