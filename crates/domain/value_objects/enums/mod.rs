pub mod payment_channels;
pub mod payment_statuses;
pub mod plan_types;
pub mod subscription_statuses;
