use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use crates::domain::{
    entities::{payments::InsertPaymentEntity, subscriptions::SubscriptionEntity},
    lifecycle::{self, SubscriptionEvent},
    repositories::{profiles::ProfileRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{
            payment_channels::PaymentChannel,
            payment_statuses::PaymentStatus,
            plan_types::{PLAN_CURRENCY, PlanType},
            subscription_statuses::SubscriptionStatus,
        },
        webhooks::WebhookEnvelope,
    },
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::usecases::automated_billing::parse_amount_minor;
use crate::usecases::entitlement::EntitlementSynchronizer;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// The only error the provider is allowed to see: a payload that is not
    /// an event envelope at all. Everything else is logged and acknowledged.
    #[error("invalid webhook envelope: {0}")]
    InvalidEnvelope(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type UseCaseResult<T> = std::result::Result<T, WebhookError>;

/// Asynchronous entry point into the subscription lifecycle: maps provider
/// event types onto lifecycle events and applies them idempotently. Runs
/// decoupled from any user session and can race the user-facing flows.
pub struct BillingWebhookUseCase<S, Pr>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    entitlement: EntitlementSynchronizer<S, Pr>,
}

impl<S, Pr> BillingWebhookUseCase<S, Pr>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>, profile_repo: Arc<Pr>) -> Self {
        let entitlement =
            EntitlementSynchronizer::new(Arc::clone(&subscription_repo), profile_repo);
        Self {
            subscription_repo,
            entitlement,
        }
    }

    pub async fn handle_event(&self, payload: serde_json::Value) -> UseCaseResult<()> {
        let envelope: WebhookEnvelope = serde_json::from_value(payload).map_err(|err| {
            warn!(error = %err, "billing_webhook: malformed event envelope");
            WebhookError::InvalidEnvelope(err.to_string())
        })?;

        info!(
            event_type = %envelope.event_type,
            "billing_webhook: event received"
        );

        match envelope.event_type.as_str() {
            "BILLING.SUBSCRIPTION.ACTIVATED" => {
                self.handle_status_event(&envelope, SubscriptionEvent::WebhookActivated)
                    .await
            }
            "BILLING.SUBSCRIPTION.CANCELLED" => {
                self.handle_status_event(&envelope, SubscriptionEvent::WebhookCancelled)
                    .await
            }
            "BILLING.SUBSCRIPTION.EXPIRED" => {
                self.handle_status_event(&envelope, SubscriptionEvent::WebhookExpired)
                    .await
            }
            "BILLING.SUBSCRIPTION.SUSPENDED" => {
                self.handle_status_event(&envelope, SubscriptionEvent::WebhookSuspended)
                    .await
            }
            "PAYMENT.SALE.COMPLETED" => self.handle_payment_completed(&envelope).await,
            other => {
                // The provider must never be made to retry events this
                // system does not model.
                debug!(event_type = other, "billing_webhook: ignoring unhandled event type");
                Ok(())
            }
        }
    }

    async fn handle_status_event(
        &self,
        envelope: &WebhookEnvelope,
        event: SubscriptionEvent,
    ) -> UseCaseResult<()> {
        #[derive(Deserialize)]
        struct SubscriptionResource {
            id: Option<String>,
        }

        let resource: SubscriptionResource =
            serde_json::from_value(envelope.resource.clone()).unwrap_or(SubscriptionResource {
                id: None,
            });

        let Some(provider_subscription_id) = resource.id else {
            warn!(
                event_type = %envelope.event_type,
                "billing_webhook: resource has no subscription id, acknowledging"
            );
            return Ok(());
        };

        let Some(subscription) = self
            .find_subscription(&provider_subscription_id)
            .await?
        else {
            return Ok(());
        };

        self.apply_transition(&subscription, event).await
    }

    async fn handle_payment_completed(&self, envelope: &WebhookEnvelope) -> UseCaseResult<()> {
        #[derive(Deserialize)]
        struct SaleAmount {
            total: Option<String>,
            currency: Option<String>,
        }

        #[derive(Deserialize)]
        struct SaleResource {
            id: Option<String>,
            billing_agreement_id: Option<String>,
            amount: Option<SaleAmount>,
        }

        let resource: SaleResource = serde_json::from_value(envelope.resource.clone())
            .unwrap_or(SaleResource {
                id: None,
                billing_agreement_id: None,
                amount: None,
            });

        let Some(sale_id) = resource.id else {
            warn!("billing_webhook: sale resource has no payment id, acknowledging");
            return Ok(());
        };

        // Payment events reference the subscription through the billing
        // agreement, not resource.id.
        let Some(agreement_id) = resource.billing_agreement_id else {
            warn!(
                %sale_id,
                "billing_webhook: sale has no billing agreement id, acknowledging"
            );
            return Ok(());
        };

        let Some(subscription) = self.find_subscription(&agreement_id).await? else {
            return Ok(());
        };

        let (status, channel, plan_type) = parse_stored(&subscription)?;

        if let Err(err) = lifecycle::apply(
            channel,
            status,
            &SubscriptionEvent::WebhookPaymentCompleted,
        ) {
            warn!(
                subscription_id = %subscription.id,
                %sale_id,
                error = %err,
                "billing_webhook: payment event refused by lifecycle guard, acknowledging"
            );
            return Ok(());
        }

        let amount_minor = resource
            .amount
            .as_ref()
            .and_then(|amount| amount.total.as_deref())
            .and_then(parse_amount_minor)
            .unwrap_or_else(|| plan_type.price_minor());
        let currency = resource
            .amount
            .and_then(|amount| amount.currency)
            .unwrap_or_else(|| PLAN_CURRENCY.to_string());

        let payment = InsertPaymentEntity {
            user_id: subscription.user_id,
            subscription_id: subscription.id,
            amount_minor,
            currency,
            status: PaymentStatus::Succeeded.to_string(),
            external_payment_id: Some(sale_id.clone()),
            plan_type: plan_type.to_string(),
        };

        let new_period_end = plan_type
            .period_end_from(Utc::now())
            .context("failed to compute extended period end")?;

        let inserted = self
            .subscription_repo
            .apply_payment_completed(subscription.id, payment, new_period_end)
            .await
            .map_err(|err| {
                error!(
                    subscription_id = %subscription.id,
                    %sale_id,
                    db_error = ?err,
                    "billing_webhook: failed to apply settled payment"
                );
                WebhookError::Internal(err)
            })?;

        if !inserted {
            // Duplicate delivery: the unique external_payment_id already
            // exists, so neither the ledger nor the period moved.
            info!(
                subscription_id = %subscription.id,
                %sale_id,
                "billing_webhook: payment already recorded, acknowledging duplicate"
            );
            return Ok(());
        }

        self.entitlement
            .sync(subscription.user_id)
            .await
            .map_err(WebhookError::Internal)?;

        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            %sale_id,
            amount_minor,
            "billing_webhook: settled payment applied"
        );

        Ok(())
    }

    async fn apply_transition(
        &self,
        subscription: &SubscriptionEntity,
        event: SubscriptionEvent,
    ) -> UseCaseResult<()> {
        let (status, channel, _) = parse_stored(subscription)?;

        let transition = match lifecycle::apply(channel, status, &event) {
            Ok(transition) => transition,
            Err(err) => {
                // Out-of-order or duplicate delivery; state stays as-is.
                warn!(
                    subscription_id = %subscription.id,
                    event = event.name(),
                    error = %err,
                    "billing_webhook: transition refused by lifecycle guard, acknowledging"
                );
                return Ok(());
            }
        };

        let applied = self
            .subscription_repo
            .update_status_guarded(
                subscription.id,
                &[status],
                transition.status,
                transition.sets_canceled_at,
            )
            .await
            .map_err(WebhookError::Internal)?;

        if !applied {
            info!(
                subscription_id = %subscription.id,
                event = event.name(),
                "billing_webhook: subscription changed concurrently, skipping"
            );
            return Ok(());
        }

        let is_premium = self
            .entitlement
            .sync(subscription.user_id)
            .await
            .map_err(WebhookError::Internal)?;

        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            event = event.name(),
            new_status = %transition.status,
            is_premium,
            "billing_webhook: transition applied"
        );

        Ok(())
    }

    async fn find_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> UseCaseResult<Option<SubscriptionEntity>> {
        let subscription = self
            .subscription_repo
            .find_by_provider_subscription_id(provider_subscription_id)
            .await
            .map_err(WebhookError::Internal)?;

        if subscription.is_none() {
            // A lookup miss must never trigger the provider's retry policy.
            info!(
                provider_subscription_id,
                "billing_webhook: no local subscription for provider id, acknowledging"
            );
        }

        Ok(subscription)
    }
}

fn parse_stored(
    subscription: &SubscriptionEntity,
) -> Result<(SubscriptionStatus, PaymentChannel, PlanType), WebhookError> {
    let status = SubscriptionStatus::from_str(&subscription.status).ok_or_else(|| {
        WebhookError::Internal(anyhow!(
            "stored subscription status is invalid: {}",
            subscription.status
        ))
    })?;
    let channel = PaymentChannel::from_str(&subscription.channel).ok_or_else(|| {
        WebhookError::Internal(anyhow!(
            "stored subscription channel is invalid: {}",
            subscription.channel
        ))
    })?;
    let plan_type = PlanType::from_str(&subscription.plan_type).ok_or_else(|| {
        WebhookError::Internal(anyhow!(
            "stored plan type is invalid: {}",
            subscription.plan_type
        ))
    })?;

    Ok((status, channel, plan_type))
}
