use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::plans::PlanEntity;
use crate::domain::repositories::plans::PlanRepository;

struct CachedEntry {
    entry: PlanEntity,
    fetched_at: Instant,
}

/// Read-through cache over the plan repository, passed explicitly into the
/// components that need catalog lookups. Misses are not cached, so a plan
/// added while the process runs becomes visible on the next lookup.
pub struct PlanCatalog<P>
where
    P: PlanRepository + Send + Sync + 'static,
{
    plan_repo: Arc<P>,
    ttl: Duration,
    by_id: RwLock<HashMap<Uuid, CachedEntry>>,
}

impl<P> PlanCatalog<P>
where
    P: PlanRepository + Send + Sync + 'static,
{
    pub fn new(plan_repo: Arc<P>, ttl: Duration) -> Self {
        Self {
            plan_repo,
            ttl,
            by_id: RwLock::new(HashMap::new()),
        }
    }

    pub async fn find_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        {
            let cache = self.by_id.read().await;
            if let Some(hit) = cache.get(&plan_id) {
                if hit.fetched_at.elapsed() < self.ttl {
                    debug!(%plan_id, "plan_catalog: cache hit");
                    return Ok(Some(hit.entry.clone()));
                }
            }
        }

        let fetched = self.plan_repo.find_by_id(plan_id).await?;
        if let Some(entry) = &fetched {
            self.by_id.write().await.insert(
                plan_id,
                CachedEntry {
                    entry: entry.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        Ok(fetched)
    }

    /// By-id lookup restricted to active catalog entries.
    pub async fn find_active_by_id(&self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        Ok(self
            .find_by_id(plan_id)
            .await?
            .filter(|entry| entry.is_active))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<PlanEntity>> {
        self.plan_repo.find_by_name(name).await
    }

    pub async fn list_active_plans(&self) -> Result<Vec<PlanEntity>> {
        self.plan_repo.list_active_plans().await
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::domain::repositories::plans::MockPlanRepository;
    use crate::domain::value_objects::enums::catalog_kinds::CatalogKind;

    fn sample_plan(id: Uuid, is_active: bool) -> PlanEntity {
        PlanEntity {
            id,
            name: "start".to_string(),
            display_name: "Start".to_string(),
            kind: CatalogKind::Plan,
            price_cents: 9900,
            leads_included: 1000,
            gateway_product_code: "PROD-START".to_string(),
            is_active,
        }
    }

    #[tokio::test]
    async fn caches_by_id_lookups_within_the_ttl() {
        let plan_id = Uuid::new_v4();
        let plan = sample_plan(plan_id, true);

        let mut plan_repo = MockPlanRepository::new();
        plan_repo
            .expect_find_by_id()
            .with(eq(plan_id))
            .times(1)
            .returning(move |_| {
                let plan = plan.clone();
                Box::pin(async move { Ok(Some(plan)) })
            });

        let catalog = PlanCatalog::new(Arc::new(plan_repo), Duration::from_secs(60));

        let first = catalog.find_by_id(plan_id).await.unwrap();
        let second = catalog.find_by_id(plan_id).await.unwrap();

        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[tokio::test]
    async fn zero_ttl_reads_through_every_time() {
        let plan_id = Uuid::new_v4();
        let plan = sample_plan(plan_id, true);

        let mut plan_repo = MockPlanRepository::new();
        plan_repo
            .expect_find_by_id()
            .with(eq(plan_id))
            .times(2)
            .returning(move |_| {
                let plan = plan.clone();
                Box::pin(async move { Ok(Some(plan)) })
            });

        let catalog = PlanCatalog::new(Arc::new(plan_repo), Duration::ZERO);

        catalog.find_by_id(plan_id).await.unwrap();
        catalog.find_by_id(plan_id).await.unwrap();
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let plan_id = Uuid::new_v4();

        let mut plan_repo = MockPlanRepository::new();
        plan_repo
            .expect_find_by_id()
            .with(eq(plan_id))
            .times(2)
            .returning(|_| Box::pin(async { Ok(None) }));

        let catalog = PlanCatalog::new(Arc::new(plan_repo), Duration::from_secs(60));

        assert!(catalog.find_by_id(plan_id).await.unwrap().is_none());
        assert!(catalog.find_by_id(plan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn active_lookup_filters_inactive_entries() {
        let plan_id = Uuid::new_v4();
        let plan = sample_plan(plan_id, false);

        let mut plan_repo = MockPlanRepository::new();
        plan_repo.expect_find_by_id().returning(move |_| {
            let plan = plan.clone();
            Box::pin(async move { Ok(Some(plan)) })
        });

        let catalog = PlanCatalog::new(Arc::new(plan_repo), Duration::from_secs(60));

        assert!(catalog.find_active_by_id(plan_id).await.unwrap().is_none());
    }
}
