use std::sync::Arc;

use crates::domain::{
    repositories::{
        payments::PaymentRepository, profiles::ProfileRepository,
        subscriptions::SubscriptionRepository,
    },
    value_objects::{
        enums::subscription_statuses::SubscriptionStatus,
        subscriptions::{CurrentEntitlementDto, PaymentDto, SubscriptionDto},
    },
};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SubscriptionQueryError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionQueryError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            SubscriptionQueryError::Internal(_) => {
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionQueryError>;

/// Read side: current subscription + cached entitlement, and the payment
/// ledger for the account screen.
pub struct SubscriptionQueryUseCase<S, Pr, Pay>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    profile_repo: Arc<Pr>,
    payment_repo: Arc<Pay>,
}

impl<S, Pr, Pay> SubscriptionQueryUseCase<S, Pr, Pay>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>, profile_repo: Arc<Pr>, payment_repo: Arc<Pay>) -> Self {
        Self {
            subscription_repo,
            profile_repo,
            payment_repo,
        }
    }

    pub async fn current_entitlement(&self, user_id: Uuid) -> UseCaseResult<CurrentEntitlementDto> {
        let live = self
            .subscription_repo
            .find_live_for_user(user_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "subscriptions: failed to load live subscriptions"
                );
                SubscriptionQueryError::Internal(err)
            })?;

        // Active wins over pending when the user holds both slots.
        let subscription = live
            .iter()
            .find(|subscription| {
                subscription.status == SubscriptionStatus::Active.to_string()
            })
            .or_else(|| live.first())
            .cloned()
            .map(SubscriptionDto::from);

        let is_premium = self
            .profile_repo
            .find_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "subscriptions: failed to load profile"
                );
                SubscriptionQueryError::Internal(err)
            })?
            .map(|profile| profile.is_premium)
            .unwrap_or(false);

        info!(
            %user_id,
            is_premium,
            has_subscription = subscription.is_some(),
            "subscriptions: current entitlement loaded"
        );

        Ok(CurrentEntitlementDto {
            is_premium,
            subscription,
        })
    }

    pub async fn payment_history(&self, user_id: Uuid) -> UseCaseResult<Vec<PaymentDto>> {
        let payments = self
            .payment_repo
            .list_for_user(user_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "subscriptions: failed to load payment history"
                );
                SubscriptionQueryError::Internal(err)
            })?;

        Ok(payments.into_iter().map(PaymentDto::from).collect())
    }
}
