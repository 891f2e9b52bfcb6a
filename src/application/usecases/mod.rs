pub mod checkout;
pub mod gateway_webhook;
pub mod ledger;
pub mod subscriptions;
