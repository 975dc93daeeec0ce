pub mod automated_billing;
pub mod billing_webhook;
pub mod entitlement;
pub mod manual_transfer;
pub mod subscriptions;
