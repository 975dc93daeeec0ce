use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{payments::PaymentEntity, subscriptions::SubscriptionEntity};
use crate::domain::value_objects::enums::{
    payment_channels::PaymentChannel, plan_types::PlanType,
    subscription_statuses::SubscriptionStatus,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub plan_type: Option<PlanType>,
    pub status: Option<SubscriptionStatus>,
    pub channel: Option<PaymentChannel>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            plan_type: PlanType::from_str(&value.plan_type),
            status: SubscriptionStatus::from_str(&value.status),
            channel: PaymentChannel::from_str(&value.channel),
            current_period_start: value.current_period_start,
            current_period_end: value.current_period_end,
            cancel_at_period_end: value.cancel_at_period_end,
            created_at: value.created_at,
        }
    }
}

/// Response of "what does this user currently have": the live subscription
/// (active preferred over pending) plus the cached entitlement flag.
#[derive(Debug, Serialize)]
pub struct CurrentEntitlementDto {
    pub is_premium: bool,
    pub subscription: Option<SubscriptionDto>,
}

#[derive(Debug, Serialize)]
pub struct PaymentDto {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount_minor: i32,
    pub currency: String,
    pub status: String,
    pub external_payment_id: Option<String>,
    pub plan_type: Option<PlanType>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentEntity> for PaymentDto {
    fn from(value: PaymentEntity) -> Self {
        Self {
            id: value.id,
            subscription_id: value.subscription_id,
            amount_minor: value.amount_minor,
            currency: value.currency,
            status: value.status,
            external_payment_id: value.external_payment_id,
            plan_type: PlanType::from_str(&value.plan_type),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateManualSubscriptionRequest {
    pub plan_type: String,
    pub payment_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub plan_type: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub approval_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateSubscriptionRequest {
    pub provider_subscription_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyManualSubscriptionRequest {
    pub subscription_id: Uuid,
    pub approve: bool,
    pub external_transfer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyManualSubscriptionResponse {
    pub subscription_id: Uuid,
    pub status: SubscriptionStatus,
    pub is_premium: bool,
}

#[derive(Debug, Serialize)]
pub struct PendingVerificationDto {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub plan_type: Option<PlanType>,
    pub payment_reference: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl From<SubscriptionEntity> for PendingVerificationDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            subscription_id: value.id,
            user_id: value.user_id,
            plan_type: PlanType::from_str(&value.plan_type),
            payment_reference: value.external_reference,
            requested_at: value.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PremiumOverrideRequest {
    pub user_id: Uuid,
    pub is_premium: bool,
}
