pub mod plan_catalog;
pub mod retry;
pub mod usecases;
