use std::sync::Arc;

use anyhow::{Context, Result as AnyResult, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use crates::{
    domain::{
        entities::payments::InsertPaymentEntity,
        entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        lifecycle::{self, ProviderStatus, SubscriptionEvent},
        repositories::{
            payments::PaymentRepository, profiles::ProfileRepository,
            subscriptions::SubscriptionRepository,
        },
        value_objects::enums::{
            payment_channels::PaymentChannel,
            payment_statuses::PaymentStatus,
            plan_types::{PLAN_CURRENCY, PlanType},
            subscription_statuses::SubscriptionStatus,
        },
    },
    payments::paypal_client::{CreatedSubscription, PayPalClient, ProviderSubscription},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::usecases::entitlement::EntitlementSynchronizer;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PayPalGateway: Send + Sync {
    async fn create_subscription(
        &self,
        plan_id: &str,
        subscriber_email: &str,
    ) -> AnyResult<CreatedSubscription>;

    async fn get_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> AnyResult<ProviderSubscription>;

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        reason: &str,
    ) -> AnyResult<()>;
}

#[async_trait]
impl PayPalGateway for PayPalClient {
    async fn create_subscription(
        &self,
        plan_id: &str,
        subscriber_email: &str,
    ) -> AnyResult<CreatedSubscription> {
        self.create_subscription(plan_id, subscriber_email).await
    }

    async fn get_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> AnyResult<ProviderSubscription> {
        self.get_subscription(provider_subscription_id).await
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        reason: &str,
    ) -> AnyResult<()> {
        self.cancel_subscription(provider_subscription_id, reason)
            .await
    }
}

#[derive(Debug, Error)]
pub enum AutomatedBillingError {
    #[error("invalid plan type: {0}")]
    InvalidPlanType(String),
    #[error("user email is required for checkout")]
    MissingEmail,
    #[error("user already has an active or pending subscription")]
    AlreadySubscribed,
    #[error("subscription cannot be activated: provider reports {0}")]
    UnexpectedProviderStatus(String),
    #[error("no matching subscription for this user")]
    SubscriptionNotFound,
    #[error("billing provider request failed")]
    ProviderUnavailable(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AutomatedBillingError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AutomatedBillingError::InvalidPlanType(_)
            | AutomatedBillingError::MissingEmail
            | AutomatedBillingError::UnexpectedProviderStatus(_) => StatusCode::BAD_REQUEST,
            AutomatedBillingError::AlreadySubscribed => StatusCode::CONFLICT,
            AutomatedBillingError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            AutomatedBillingError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AutomatedBillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, AutomatedBillingError>;

/// Recurring-billing channel: a provider-side subscription is created and
/// approved by the user on the provider's site, then reconciled here through
/// client-triggered activation calls and asynchronous webhooks.
pub struct AutomatedBillingUseCase<S, Pr, Pay, G>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PayPalGateway + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    profile_repo: Arc<Pr>,
    payment_repo: Arc<Pay>,
    gateway: Arc<G>,
    plan_monthly_id: String,
    plan_yearly_id: String,
    entitlement: EntitlementSynchronizer<S, Pr>,
}

impl<S, Pr, Pay, G> AutomatedBillingUseCase<S, Pr, Pay, G>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PayPalGateway + Send + Sync + 'static,
{
    pub fn new(
        subscription_repo: Arc<S>,
        profile_repo: Arc<Pr>,
        payment_repo: Arc<Pay>,
        gateway: Arc<G>,
        plan_monthly_id: String,
        plan_yearly_id: String,
    ) -> Self {
        let entitlement = EntitlementSynchronizer::new(
            Arc::clone(&subscription_repo),
            Arc::clone(&profile_repo),
        );
        Self {
            subscription_repo,
            profile_repo,
            payment_repo,
            gateway,
            plan_monthly_id,
            plan_yearly_id,
            entitlement,
        }
    }

    fn provider_plan_id(&self, plan_type: PlanType) -> &str {
        match plan_type {
            PlanType::Monthly => &self.plan_monthly_id,
            PlanType::Yearly => &self.plan_yearly_id,
        }
    }

    /// Creates the provider-side subscription and a local pending record,
    /// and returns the approval URL the caller must redirect to.
    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        user_email: Option<String>,
        plan_type: &str,
    ) -> UseCaseResult<String> {
        let plan_type = PlanType::from_str(plan_type).ok_or_else(|| {
            let err = AutomatedBillingError::InvalidPlanType(plan_type.to_string());
            warn!(
                %user_id,
                status = err.status_code().as_u16(),
                "automated_billing: rejected unknown plan type"
            );
            err
        })?;

        let email = user_email.ok_or_else(|| {
            let err = AutomatedBillingError::MissingEmail;
            warn!(
                %user_id,
                status = err.status_code().as_u16(),
                "automated_billing: missing email for checkout"
            );
            err
        })?;

        let live = self
            .subscription_repo
            .find_live_for_user(user_id)
            .await
            .map_err(AutomatedBillingError::Internal)?;
        if !live.is_empty() {
            let err = AutomatedBillingError::AlreadySubscribed;
            warn!(
                %user_id,
                status = err.status_code().as_u16(),
                "automated_billing: user already holds a live subscription"
            );
            return Err(err);
        }

        self.profile_repo
            .ensure_profile(user_id, Some(email.clone()))
            .await
            .map_err(AutomatedBillingError::Internal)?;

        let created = self
            .gateway
            .create_subscription(self.provider_plan_id(plan_type), &email)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    plan_type = %plan_type,
                    error = ?err,
                    "automated_billing: provider subscription creation failed"
                );
                AutomatedBillingError::ProviderUnavailable(err)
            })?;

        let new_subscription = InsertSubscriptionEntity {
            user_id,
            plan_type: plan_type.to_string(),
            status: SubscriptionStatus::Pending.to_string(),
            channel: PaymentChannel::AutomatedBilling.to_string(),
            external_reference: Some(created.id.clone()),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
        };

        match self.subscription_repo.create_pending(new_subscription).await {
            Ok(Some(subscription)) => {
                info!(
                    %user_id,
                    subscription_id = %subscription.id,
                    provider_subscription_id = %created.id,
                    "automated_billing: pending subscription created"
                );
            }
            Ok(None) => {
                let err = AutomatedBillingError::AlreadySubscribed;
                warn!(
                    %user_id,
                    provider_subscription_id = %created.id,
                    status = err.status_code().as_u16(),
                    "automated_billing: pending slot taken after provider create"
                );
                return Err(err);
            }
            Err(err) => {
                // Accepted eventual-consistency gap: the provider-side
                // subscription exists, the webhook stream reconciles later.
                error!(
                    %user_id,
                    provider_subscription_id = %created.id,
                    db_error = ?err,
                    "automated_billing: failed to persist pending subscription after provider create"
                );
            }
        }

        Ok(created.approval_url)
    }

    /// Reconciles local state from the provider after the approval redirect.
    /// Accepts only provider statuses ACTIVE and APPROVAL_PENDING.
    pub async fn activate_subscription(
        &self,
        user_id: Uuid,
        provider_subscription_id: &str,
    ) -> UseCaseResult<SubscriptionStatus> {
        let subscription = self
            .find_owned_by_provider_id(user_id, provider_subscription_id)
            .await?;

        let provider = self
            .gateway
            .get_subscription(provider_subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    provider_subscription_id,
                    error = ?err,
                    "automated_billing: failed to fetch provider subscription"
                );
                AutomatedBillingError::ProviderUnavailable(err)
            })?;

        let plan_type = PlanType::from_str(&subscription.plan_type)
            .ok_or_else(|| anyhow!("stored plan type is invalid: {}", subscription.plan_type))
            .map_err(AutomatedBillingError::Internal)?;

        match provider.status.as_str() {
            "ACTIVE" => {
                self.apply_provider_activation(&subscription, plan_type, &provider)
                    .await
            }
            "APPROVAL_PENDING" => {
                info!(
                    %user_id,
                    provider_subscription_id,
                    "automated_billing: provider still awaiting approval"
                );
                Ok(SubscriptionStatus::Pending)
            }
            other => {
                let err = AutomatedBillingError::UnexpectedProviderStatus(other.to_string());
                warn!(
                    %user_id,
                    provider_subscription_id,
                    provider_status = other,
                    status = err.status_code().as_u16(),
                    "automated_billing: provider status not activatable"
                );
                Err(err)
            }
        }
    }

    /// Cancels at the provider first; only a provider-confirmed cancellation
    /// (or a provider report of "already cancelled") flips the local
    /// cancel-at-period-end flag, so the two systems never disagree about
    /// who is billing.
    pub async fn cancel_subscription(&self, user_id: Uuid) -> UseCaseResult<()> {
        let live = self
            .subscription_repo
            .find_live_for_user(user_id)
            .await
            .map_err(AutomatedBillingError::Internal)?;

        let active = live
            .into_iter()
            .find(|subscription| {
                subscription.status == SubscriptionStatus::Active.to_string()
                    && subscription.channel == PaymentChannel::AutomatedBilling.to_string()
            })
            .ok_or_else(|| {
                let err = AutomatedBillingError::SubscriptionNotFound;
                warn!(
                    %user_id,
                    status = err.status_code().as_u16(),
                    "automated_billing: no active automated subscription to cancel"
                );
                err
            })?;

        let provider_subscription_id = active
            .external_reference
            .clone()
            .ok_or_else(|| anyhow!("active automated subscription missing provider reference"))
            .map_err(AutomatedBillingError::Internal)?;

        let transition = lifecycle::apply(
            PaymentChannel::AutomatedBilling,
            SubscriptionStatus::Active,
            &SubscriptionEvent::CancelUserInitiated,
        )
        .map_err(|err| AutomatedBillingError::Internal(anyhow!(err)))?;
        debug_assert!(transition.sets_cancel_at_period_end);

        self.gateway
            .cancel_subscription(&provider_subscription_id, "user requested cancellation")
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    %provider_subscription_id,
                    error = ?err,
                    "automated_billing: provider cancel failed, local state left unchanged"
                );
                AutomatedBillingError::ProviderUnavailable(err)
            })?;

        let marked = self
            .subscription_repo
            .mark_cancel_at_period_end(active.id)
            .await
            .map_err(AutomatedBillingError::Internal)?;
        if !marked {
            warn!(
                %user_id,
                subscription_id = %active.id,
                "automated_billing: subscription left active before cancel flag applied"
            );
        }

        // Status stays active until the provider's period-end webhook, so
        // this is a no-op for the flag; kept as the single choke point.
        self.entitlement
            .sync(user_id)
            .await
            .map_err(AutomatedBillingError::Internal)?;

        info!(
            %user_id,
            subscription_id = %active.id,
            %provider_subscription_id,
            "automated_billing: cancellation scheduled for period end"
        );

        Ok(())
    }

    async fn apply_provider_activation(
        &self,
        subscription: &SubscriptionEntity,
        plan_type: PlanType,
        provider: &ProviderSubscription,
    ) -> UseCaseResult<SubscriptionStatus> {
        let status = SubscriptionStatus::from_str(&subscription.status)
            .ok_or_else(|| anyhow!("stored subscription status is invalid: {}", subscription.status))
            .map_err(AutomatedBillingError::Internal)?;

        lifecycle::apply(
            PaymentChannel::AutomatedBilling,
            status,
            &SubscriptionEvent::ActivateAutomated {
                provider_status: ProviderStatus::Active,
            },
        )
        .map_err(|err| {
            let mapped = AutomatedBillingError::SubscriptionNotFound;
            warn!(
                subscription_id = %subscription.id,
                error = %err,
                status = mapped.status_code().as_u16(),
                "automated_billing: activation refused by lifecycle guard"
            );
            mapped
        })?;

        let now = Utc::now();
        let period_start = subscription.current_period_start.unwrap_or(now);
        // Provider period end wins; computed fallback when the provider
        // omits next_billing_time.
        let period_end = provider
            .billing_info
            .as_ref()
            .and_then(|billing| billing.next_billing_time)
            .map(Ok)
            .unwrap_or_else(|| {
                plan_type
                    .period_end_from(now)
                    .context("failed to compute subscription period end")
            })
            .map_err(AutomatedBillingError::Internal)?;

        let applied = self
            .subscription_repo
            .activate_automated(subscription.id, period_start, period_end)
            .await
            .map_err(AutomatedBillingError::Internal)?;
        if !applied {
            return Err(AutomatedBillingError::SubscriptionNotFound);
        }

        self.record_last_payment(subscription, plan_type, provider)
            .await?;

        let is_premium = self
            .entitlement
            .sync(subscription.user_id)
            .await
            .map_err(AutomatedBillingError::Internal)?;

        info!(
            user_id = %subscription.user_id,
            subscription_id = %subscription.id,
            provider_subscription_id = %provider.id,
            is_premium,
            "automated_billing: subscription activated from provider state"
        );

        Ok(SubscriptionStatus::Active)
    }

    /// Records the provider-reported last charge, keyed deterministically on
    /// subscription id + charge time so repeated activation calls cannot
    /// double-count it.
    async fn record_last_payment(
        &self,
        subscription: &SubscriptionEntity,
        plan_type: PlanType,
        provider: &ProviderSubscription,
    ) -> UseCaseResult<()> {
        let Some(last_payment) = provider
            .billing_info
            .as_ref()
            .and_then(|billing| billing.last_payment.as_ref())
        else {
            return Ok(());
        };

        let Some(paid_at) = last_payment.time else {
            debug!(
                subscription_id = %subscription.id,
                "automated_billing: last payment has no charge time, skipping ledger entry"
            );
            return Ok(());
        };

        let amount_minor = last_payment
            .amount
            .as_ref()
            .and_then(|amount| amount.value.as_deref())
            .and_then(parse_amount_minor)
            .unwrap_or_else(|| plan_type.price_minor());
        let currency = last_payment
            .amount
            .as_ref()
            .and_then(|amount| amount.currency_code.clone())
            .unwrap_or_else(|| PLAN_CURRENCY.to_string());

        let payment = InsertPaymentEntity {
            user_id: subscription.user_id,
            subscription_id: subscription.id,
            amount_minor,
            currency,
            status: PaymentStatus::Succeeded.to_string(),
            external_payment_id: Some(format!("{}:{}", provider.id, paid_at.timestamp())),
            plan_type: plan_type.to_string(),
        };

        let inserted = self
            .payment_repo
            .record_payment(payment)
            .await
            .map_err(AutomatedBillingError::Internal)?;

        if inserted.is_none() {
            debug!(
                subscription_id = %subscription.id,
                "automated_billing: last payment already recorded"
            );
        }

        Ok(())
    }

    async fn find_owned_by_provider_id(
        &self,
        user_id: Uuid,
        provider_subscription_id: &str,
    ) -> UseCaseResult<SubscriptionEntity> {
        let subscription = self
            .subscription_repo
            .find_by_provider_subscription_id(provider_subscription_id)
            .await
            .map_err(AutomatedBillingError::Internal)?
            .filter(|subscription| subscription.user_id == user_id)
            .ok_or_else(|| {
                let err = AutomatedBillingError::SubscriptionNotFound;
                warn!(
                    %user_id,
                    provider_subscription_id,
                    status = err.status_code().as_u16(),
                    "automated_billing: no local subscription for provider id"
                );
                err
            })?;

        Ok(subscription)
    }
}

/// Parses the provider's decimal money string ("4.99") into minor units.
pub(crate) fn parse_amount_minor(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('-') {
        return None;
    }

    let (units, cents) = match raw.split_once('.') {
        Some((units, cents)) => (units, cents),
        None => (raw, ""),
    };

    let units: i64 = units.parse().ok()?;
    let cents: i64 = match cents.len() {
        0 => 0,
        1 => cents.parse::<i64>().ok()? * 10,
        2 => cents.parse().ok()?,
        _ => return None,
    };

    i32::try_from(units * 100 + cents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::payments::paypal_client::{
        ProviderBillingInfo, ProviderLastPayment, ProviderMoney,
    };
    use crates::domain::repositories::{
        payments::MockPaymentRepository, profiles::MockProfileRepository,
        subscriptions::MockSubscriptionRepository,
    };
    use mockall::predicate::eq;

    fn automated_subscription(
        user_id: Uuid,
        status: SubscriptionStatus,
        provider_id: &str,
    ) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_type: PlanType::Monthly.to_string(),
            status: status.to_string(),
            channel: PaymentChannel::AutomatedBilling.to_string(),
            external_reference: Some(provider_id.to_string()),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn usecase_with(
        subscription_repo: MockSubscriptionRepository,
        profile_repo: MockProfileRepository,
        payment_repo: MockPaymentRepository,
        gateway: MockPayPalGateway,
    ) -> AutomatedBillingUseCase<
        MockSubscriptionRepository,
        MockProfileRepository,
        MockPaymentRepository,
        MockPayPalGateway,
    > {
        AutomatedBillingUseCase::new(
            Arc::new(subscription_repo),
            Arc::new(profile_repo),
            Arc::new(payment_repo),
            Arc::new(gateway),
            "P-MONTHLY".to_string(),
            "P-YEARLY".to_string(),
        )
    }

    #[tokio::test]
    async fn create_returns_the_provider_approval_url() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));
        profile_repo
            .expect_ensure_profile()
            .returning(|_, _| Box::pin(async { Ok(()) }));

        gateway
            .expect_create_subscription()
            .withf(|plan_id, email| plan_id == "P-MONTHLY" && email == "student@example.com")
            .times(1)
            .returning(|_, _| {
                Box::pin(async {
                    Ok(CreatedSubscription {
                        id: "I-1".to_string(),
                        approval_url: "https://paypal.example/approve/I-1".to_string(),
                    })
                })
            });

        subscription_repo
            .expect_create_pending()
            .withf(move |new_subscription| {
                new_subscription.user_id == user_id
                    && new_subscription.channel == "automated_billing"
                    && new_subscription.external_reference.as_deref() == Some("I-1")
            })
            .times(1)
            .returning(move |_| {
                let entity =
                    automated_subscription(user_id, SubscriptionStatus::Pending, "I-1");
                Box::pin(async move { Ok(Some(entity)) })
            });

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let approval_url = usecase
            .create_subscription(
                user_id,
                Some("student@example.com".to_string()),
                "monthly",
            )
            .await
            .unwrap();

        assert_eq!(approval_url, "https://paypal.example/approve/I-1");
    }

    #[tokio::test]
    async fn create_still_returns_the_url_when_local_persistence_fails() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));
        profile_repo
            .expect_ensure_profile()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        gateway.expect_create_subscription().returning(|_, _| {
            Box::pin(async {
                Ok(CreatedSubscription {
                    id: "I-2".to_string(),
                    approval_url: "https://paypal.example/approve/I-2".to_string(),
                })
            })
        });
        subscription_repo
            .expect_create_pending()
            .returning(|_| Box::pin(async { Err(anyhow!("connection reset")) }));

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let approval_url = usecase
            .create_subscription(user_id, Some("s@example.com".to_string()), "monthly")
            .await
            .unwrap();

        assert_eq!(approval_url, "https://paypal.example/approve/I-2");
    }

    #[tokio::test]
    async fn create_surfaces_provider_failures_as_bad_gateway() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));
        profile_repo
            .expect_ensure_profile()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        gateway
            .expect_create_subscription()
            .returning(|_, _| Box::pin(async { Err(anyhow!("timeout")) }));

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let err = usecase
            .create_subscription(Uuid::new_v4(), Some("s@example.com".to_string()), "yearly")
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn create_requires_an_email() {
        let usecase = usecase_with(
            MockSubscriptionRepository::new(),
            MockProfileRepository::new(),
            MockPaymentRepository::new(),
            MockPayPalGateway::new(),
        );

        let err = usecase
            .create_subscription(Uuid::new_v4(), None, "monthly")
            .await
            .unwrap_err();

        assert!(matches!(err, AutomatedBillingError::MissingEmail));
    }

    #[tokio::test]
    async fn activation_applies_provider_state_and_records_the_last_payment() {
        let user_id = Uuid::new_v4();
        let subscription =
            automated_subscription(user_id, SubscriptionStatus::Pending, "I-7");
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();
        let mut payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_by_provider_subscription_id()
            .withf(|provider_id| provider_id == "I-7")
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });

        gateway.expect_get_subscription().returning(|_| {
            Box::pin(async {
                Ok(ProviderSubscription {
                    id: "I-7".to_string(),
                    status: "ACTIVE".to_string(),
                    billing_info: Some(ProviderBillingInfo {
                        next_billing_time: Some(Utc::now() + chrono::Duration::days(30)),
                        last_payment: Some(ProviderLastPayment {
                            amount: Some(ProviderMoney {
                                currency_code: Some("USD".to_string()),
                                value: Some("4.99".to_string()),
                            }),
                            time: Some(Utc::now()),
                        }),
                    }),
                })
            })
        });

        subscription_repo
            .expect_activate_automated()
            .withf(move |id, _, _| *id == subscription_id)
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(true) }));

        payment_repo
            .expect_record_payment()
            .withf(move |payment| {
                payment.amount_minor == 499
                    && payment.subscription_id == subscription_id
                    && payment
                        .external_payment_id
                        .as_deref()
                        .is_some_and(|id| id.starts_with("I-7:"))
            })
            .times(1)
            .returning(|_| Box::pin(async { Ok(Some(Uuid::new_v4())) }));

        subscription_repo
            .expect_has_active_subscription()
            .returning(|_| Box::pin(async { Ok(true) }));
        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(true))
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let status = usecase.activate_subscription(user_id, "I-7").await.unwrap();
        assert_eq!(status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn activation_leaves_pending_when_the_provider_awaits_approval() {
        let user_id = Uuid::new_v4();
        let subscription =
            automated_subscription(user_id, SubscriptionStatus::Pending, "I-8");

        let mut subscription_repo = MockSubscriptionRepository::new();
        let profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_by_provider_subscription_id()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });
        gateway.expect_get_subscription().returning(|_| {
            Box::pin(async {
                Ok(ProviderSubscription {
                    id: "I-8".to_string(),
                    status: "APPROVAL_PENDING".to_string(),
                    billing_info: None,
                })
            })
        });

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let status = usecase.activate_subscription(user_id, "I-8").await.unwrap();
        assert_eq!(status, SubscriptionStatus::Pending);
    }

    #[tokio::test]
    async fn activation_rejects_other_provider_statuses() {
        let user_id = Uuid::new_v4();
        let subscription =
            automated_subscription(user_id, SubscriptionStatus::Pending, "I-9");

        let mut subscription_repo = MockSubscriptionRepository::new();
        let profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_by_provider_subscription_id()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });
        gateway.expect_get_subscription().returning(|_| {
            Box::pin(async {
                Ok(ProviderSubscription {
                    id: "I-9".to_string(),
                    status: "SUSPENDED".to_string(),
                    billing_info: None,
                })
            })
        });

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let err = usecase
            .activate_subscription(user_id, "I-9")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AutomatedBillingError::UnexpectedProviderStatus(ref status) if status == "SUSPENDED"
        ));
    }

    #[tokio::test]
    async fn activation_refuses_subscriptions_owned_by_someone_else() {
        let owner = Uuid::new_v4();
        let caller = Uuid::new_v4();
        let subscription = automated_subscription(owner, SubscriptionStatus::Pending, "I-10");

        let mut subscription_repo = MockSubscriptionRepository::new();

        subscription_repo
            .expect_find_by_provider_subscription_id()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });

        let usecase = usecase_with(
            subscription_repo,
            MockProfileRepository::new(),
            MockPaymentRepository::new(),
            MockPayPalGateway::new(),
        );

        let err = usecase
            .activate_subscription(caller, "I-10")
            .await
            .unwrap_err();

        assert!(matches!(err, AutomatedBillingError::SubscriptionNotFound));
    }

    #[tokio::test]
    async fn cancel_flips_the_flag_only_after_the_provider_confirms() {
        let user_id = Uuid::new_v4();
        let subscription = automated_subscription(user_id, SubscriptionStatus::Active, "I-11");
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(vec![entity]) })
            });

        gateway
            .expect_cancel_subscription()
            .withf(|provider_id, _| provider_id == "I-11")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        subscription_repo
            .expect_mark_cancel_at_period_end()
            .with(eq(subscription_id))
            .times(1)
            .returning(|_| Box::pin(async { Ok(true) }));

        // Status is still active, so entitlement must not change.
        subscription_repo
            .expect_has_active_subscription()
            .returning(|_| Box::pin(async { Ok(true) }));
        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(true))
            .returning(|_, _| Box::pin(async { Ok(false) }));

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        usecase.cancel_subscription(user_id).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_blocks_the_local_flag_when_the_provider_fails() {
        let user_id = Uuid::new_v4();
        let subscription = automated_subscription(user_id, SubscriptionStatus::Active, "I-12");

        let mut subscription_repo = MockSubscriptionRepository::new();
        let profile_repo = MockProfileRepository::new();
        let payment_repo = MockPaymentRepository::new();
        let mut gateway = MockPayPalGateway::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(vec![entity]) })
            });
        gateway
            .expect_cancel_subscription()
            .returning(|_, _| Box::pin(async { Err(anyhow!("gateway timeout")) }));

        let usecase = usecase_with(subscription_repo, profile_repo, payment_repo, gateway);

        let err = usecase.cancel_subscription(user_id).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn cancel_requires_an_active_automated_subscription() {
        let mut subscription_repo = MockSubscriptionRepository::new();
        subscription_repo
            .expect_find_live_for_user()
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));

        let usecase = usecase_with(
            subscription_repo,
            MockProfileRepository::new(),
            MockPaymentRepository::new(),
            MockPayPalGateway::new(),
        );

        let err = usecase
            .cancel_subscription(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomatedBillingError::SubscriptionNotFound));
    }

    #[test]
    fn amount_parsing_handles_provider_money_strings() {
        assert_eq!(parse_amount_minor("4.99"), Some(499));
        assert_eq!(parse_amount_minor("39.99"), Some(3999));
        assert_eq!(parse_amount_minor("40"), Some(4000));
        assert_eq!(parse_amount_minor("0.5"), Some(50));
        assert_eq!(parse_amount_minor(""), None);
        assert_eq!(parse_amount_minor("-1.00"), None);
        assert_eq!(parse_amount_minor("4.999"), None);
        assert_eq!(parse_amount_minor("abc"), None);
    }
}
