pub mod checkout;
pub mod enums;
pub mod gateway_webhooks;
pub mod references;
pub mod subscriptions;
