pub mod catalog_kinds;
pub mod gateway_outcomes;
pub mod operation_types;
pub mod subscription_statuses;
