use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::enums::catalog_kinds::CatalogKind;
use crate::infrastructure::postgres::schema::plans;

/// Catalog entry: a recurring plan or a one-off lead package. Read-only to
/// this core; for a `lead_package` row `leads_included` is the package's
/// lead quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntity {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub kind: CatalogKind,
    pub price_cents: i32,
    pub leads_included: i64,
    pub gateway_product_code: String,
    pub is_active: bool,
}

/// Raw row used for Diesel queries. The kind stays as text and is parsed
/// into CatalogKind.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = plans)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub kind: String,
    pub price_cents: i32,
    pub leads_included: i64,
    pub gateway_product_code: String,
    pub is_active: bool,
}

impl From<PlanRow> for PlanEntity {
    fn from(value: PlanRow) -> Self {
        Self {
            id: value.id,
            name: value.name,
            display_name: value.display_name,
            kind: CatalogKind::from_str(&value.kind).unwrap_or_default(),
            price_cents: value.price_cents,
            leads_included: value.leads_included,
            gateway_product_code: value.gateway_product_code,
            is_active: value.is_active,
        }
    }
}
