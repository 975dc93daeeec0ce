use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use crates::domain::{
    entities::payments::InsertPaymentEntity,
    entities::subscriptions::InsertSubscriptionEntity,
    lifecycle::{self, SubscriptionEvent},
    repositories::{profiles::ProfileRepository, subscriptions::SubscriptionRepository},
    value_objects::{
        enums::{
            payment_channels::PaymentChannel,
            payment_statuses::PaymentStatus,
            plan_types::{PLAN_CURRENCY, PlanType},
            subscription_statuses::SubscriptionStatus,
        },
        subscriptions::{
            CreateManualSubscriptionRequest, PendingVerificationDto, SubscriptionDto,
            VerifyManualSubscriptionRequest, VerifyManualSubscriptionResponse,
        },
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::entitlement::EntitlementSynchronizer;

#[derive(Debug, Error)]
pub enum ManualTransferError {
    #[error("invalid plan type: {0}")]
    InvalidPlanType(String),
    #[error("payment reference is required")]
    MissingPaymentReference,
    #[error("user already has an active or pending subscription")]
    AlreadySubscribed,
    #[error("admin access required")]
    AdminRequired,
    #[error("subscription not found or not awaiting verification")]
    SubscriptionNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ManualTransferError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ManualTransferError::InvalidPlanType(_)
            | ManualTransferError::MissingPaymentReference => StatusCode::BAD_REQUEST,
            ManualTransferError::AlreadySubscribed => StatusCode::CONFLICT,
            ManualTransferError::AdminRequired => StatusCode::FORBIDDEN,
            ManualTransferError::SubscriptionNotFound => StatusCode::NOT_FOUND,
            ManualTransferError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, ManualTransferError>;

/// Bank-transfer channel: the user files a pending request carrying their
/// transfer reference; an administrator later approves or rejects it.
pub struct ManualTransferUseCase<S, Pr>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    profile_repo: Arc<Pr>,
    entitlement: EntitlementSynchronizer<S, Pr>,
}

impl<S, Pr> ManualTransferUseCase<S, Pr>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>, profile_repo: Arc<Pr>) -> Self {
        let entitlement = EntitlementSynchronizer::new(
            Arc::clone(&subscription_repo),
            Arc::clone(&profile_repo),
        );
        Self {
            subscription_repo,
            profile_repo,
            entitlement,
        }
    }

    pub async fn create_pending_subscription(
        &self,
        user_id: Uuid,
        user_email: Option<String>,
        request: CreateManualSubscriptionRequest,
    ) -> UseCaseResult<SubscriptionDto> {
        let plan_type = PlanType::from_str(&request.plan_type).ok_or_else(|| {
            let err = ManualTransferError::InvalidPlanType(request.plan_type.clone());
            warn!(
                %user_id,
                plan_type = %request.plan_type,
                status = err.status_code().as_u16(),
                "manual_transfer: rejected unknown plan type"
            );
            err
        })?;

        let payment_reference = request.payment_reference.trim();
        if payment_reference.is_empty() {
            let err = ManualTransferError::MissingPaymentReference;
            warn!(
                %user_id,
                status = err.status_code().as_u16(),
                "manual_transfer: empty payment reference"
            );
            return Err(err);
        }

        self.reject_when_already_live(user_id).await?;

        self.profile_repo
            .ensure_profile(user_id, user_email)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "manual_transfer: failed to ensure profile"
                );
                ManualTransferError::Internal(err)
            })?;

        let new_subscription = InsertSubscriptionEntity {
            user_id,
            plan_type: plan_type.to_string(),
            status: SubscriptionStatus::Pending.to_string(),
            channel: PaymentChannel::ManualTransfer.to_string(),
            external_reference: Some(payment_reference.to_string()),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
        };

        let subscription = self
            .subscription_repo
            .create_pending(new_subscription)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "manual_transfer: failed to insert pending subscription"
                );
                ManualTransferError::Internal(err)
            })?
            .ok_or_else(|| {
                // The uniqueness constraint saw a concurrent create win.
                let err = ManualTransferError::AlreadySubscribed;
                warn!(
                    %user_id,
                    status = err.status_code().as_u16(),
                    "manual_transfer: pending slot already taken"
                );
                err
            })?;

        info!(
            %user_id,
            subscription_id = %subscription.id,
            plan_type = %plan_type,
            "manual_transfer: pending subscription created"
        );

        Ok(SubscriptionDto::from(subscription))
    }

    /// User abandons their own pending manual request; lands in the same
    /// state as an admin rejection.
    pub async fn cancel_pending_subscription(&self, user_id: Uuid) -> UseCaseResult<()> {
        let live = self.find_live(user_id).await?;

        let pending = live
            .into_iter()
            .find(|subscription| {
                subscription.status == SubscriptionStatus::Pending.to_string()
                    && subscription.channel == PaymentChannel::ManualTransfer.to_string()
            })
            .ok_or_else(|| {
                let err = ManualTransferError::SubscriptionNotFound;
                warn!(
                    %user_id,
                    status = err.status_code().as_u16(),
                    "manual_transfer: no pending manual request to cancel"
                );
                err
            })?;

        let transition = lifecycle::apply(
            PaymentChannel::ManualTransfer,
            SubscriptionStatus::Pending,
            &SubscriptionEvent::RejectManual,
        )
        .map_err(|err| ManualTransferError::Internal(anyhow!(err)))?;

        let applied = self
            .subscription_repo
            .update_status_guarded(
                pending.id,
                &[SubscriptionStatus::Pending],
                transition.status,
                transition.sets_canceled_at,
            )
            .await
            .map_err(ManualTransferError::Internal)?;

        if !applied {
            return Err(ManualTransferError::SubscriptionNotFound);
        }

        self.entitlement
            .sync(user_id)
            .await
            .map_err(ManualTransferError::Internal)?;

        info!(
            %user_id,
            subscription_id = %pending.id,
            "manual_transfer: pending subscription canceled by user"
        );

        Ok(())
    }

    pub async fn list_pending_verifications(
        &self,
        admin_id: Uuid,
    ) -> UseCaseResult<Vec<PendingVerificationDto>> {
        self.require_admin(admin_id).await?;

        let pending = self
            .subscription_repo
            .list_pending_manual()
            .await
            .map_err(|err| {
                error!(
                    %admin_id,
                    db_error = ?err,
                    "manual_transfer: failed to list pending verifications"
                );
                ManualTransferError::Internal(err)
            })?;

        Ok(pending.into_iter().map(PendingVerificationDto::from).collect())
    }

    /// Admin approval or rejection of one pending manual request. Approval
    /// activates the subscription and writes the ledger row in one
    /// transaction; rejection cancels with no payment.
    pub async fn verify_subscription(
        &self,
        admin_id: Uuid,
        request: VerifyManualSubscriptionRequest,
    ) -> UseCaseResult<VerifyManualSubscriptionResponse> {
        self.require_admin(admin_id).await?;

        let subscription = self
            .subscription_repo
            .find_by_id(request.subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %admin_id,
                    subscription_id = %request.subscription_id,
                    db_error = ?err,
                    "manual_transfer: failed to load subscription for verification"
                );
                ManualTransferError::Internal(err)
            })?
            .ok_or(ManualTransferError::SubscriptionNotFound)?;

        let status = SubscriptionStatus::from_str(&subscription.status)
            .ok_or_else(|| anyhow!("stored subscription status is invalid: {}", subscription.status))
            .map_err(ManualTransferError::Internal)?;
        let channel = PaymentChannel::from_str(&subscription.channel)
            .ok_or_else(|| anyhow!("stored subscription channel is invalid: {}", subscription.channel))
            .map_err(ManualTransferError::Internal)?;
        let plan_type = PlanType::from_str(&subscription.plan_type)
            .ok_or_else(|| anyhow!("stored plan type is invalid: {}", subscription.plan_type))
            .map_err(ManualTransferError::Internal)?;

        let event = if request.approve {
            SubscriptionEvent::ApproveManual
        } else {
            SubscriptionEvent::RejectManual
        };

        let transition = lifecycle::apply(channel, status, &event).map_err(|err| {
            let mapped = ManualTransferError::SubscriptionNotFound;
            warn!(
                %admin_id,
                subscription_id = %subscription.id,
                error = %err,
                status = mapped.status_code().as_u16(),
                "manual_transfer: verification refused by lifecycle guard"
            );
            mapped
        })?;

        let applied = if request.approve {
            let now = Utc::now();
            let period_end = plan_type
                .period_end_from(now)
                .context("failed to compute subscription period end")
                .map_err(ManualTransferError::Internal)?;

            let external_transfer_id = request
                .external_transfer_id
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);

            let payment = InsertPaymentEntity {
                user_id: subscription.user_id,
                subscription_id: subscription.id,
                amount_minor: plan_type.price_minor(),
                currency: PLAN_CURRENCY.to_string(),
                status: PaymentStatus::Succeeded.to_string(),
                external_payment_id: external_transfer_id,
                plan_type: plan_type.to_string(),
            };

            self.subscription_repo
                .activate_manual_with_payment(subscription.id, now, period_end, payment)
                .await
                .map_err(|err| {
                    error!(
                        %admin_id,
                        subscription_id = %subscription.id,
                        db_error = ?err,
                        "manual_transfer: approval transaction failed"
                    );
                    ManualTransferError::Internal(err)
                })?
        } else {
            self.subscription_repo
                .update_status_guarded(
                    subscription.id,
                    &[SubscriptionStatus::Pending],
                    transition.status,
                    transition.sets_canceled_at,
                )
                .await
                .map_err(ManualTransferError::Internal)?
        };

        if !applied {
            // The row moved out of pending between the read and the write.
            let err = ManualTransferError::SubscriptionNotFound;
            warn!(
                %admin_id,
                subscription_id = %subscription.id,
                status = err.status_code().as_u16(),
                "manual_transfer: subscription left pending before verification applied"
            );
            return Err(err);
        }

        let is_premium = self
            .entitlement
            .sync(subscription.user_id)
            .await
            .map_err(ManualTransferError::Internal)?;

        info!(
            %admin_id,
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            approved = request.approve,
            new_status = %transition.status,
            "manual_transfer: verification completed"
        );

        Ok(VerifyManualSubscriptionResponse {
            subscription_id: subscription.id,
            status: transition.status,
            is_premium,
        })
    }

    /// Out-of-band entitlement grant, bypassing the state machine.
    pub async fn override_premium(
        &self,
        admin_id: Uuid,
        user_id: Uuid,
        is_premium: bool,
    ) -> UseCaseResult<()> {
        self.require_admin(admin_id).await?;

        self.entitlement
            .override_premium(user_id, is_premium)
            .await
            .map_err(ManualTransferError::Internal)?;

        info!(
            %admin_id,
            %user_id,
            is_premium,
            "manual_transfer: premium override recorded"
        );

        Ok(())
    }

    async fn require_admin(&self, admin_id: Uuid) -> UseCaseResult<()> {
        let is_admin = self
            .profile_repo
            .is_admin(admin_id)
            .await
            .map_err(ManualTransferError::Internal)?;

        if !is_admin {
            let err = ManualTransferError::AdminRequired;
            warn!(
                %admin_id,
                status = err.status_code().as_u16(),
                "manual_transfer: admin capability check failed"
            );
            return Err(err);
        }

        Ok(())
    }

    async fn find_live(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<Vec<crates::domain::entities::subscriptions::SubscriptionEntity>> {
        self.subscription_repo
            .find_live_for_user(user_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "manual_transfer: failed to load live subscriptions"
                );
                ManualTransferError::Internal(err)
            })
    }

    async fn reject_when_already_live(&self, user_id: Uuid) -> UseCaseResult<()> {
        let live = self.find_live(user_id).await?;
        if !live.is_empty() {
            let err = ManualTransferError::AlreadySubscribed;
            warn!(
                %user_id,
                live_count = live.len(),
                status = err.status_code().as_u16(),
                "manual_transfer: user already holds a live subscription"
            );
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Months;
    use crates::domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::{
            profiles::MockProfileRepository, subscriptions::MockSubscriptionRepository,
        },
    };
    use mockall::predicate::eq;

    fn pending_manual(user_id: Uuid) -> SubscriptionEntity {
        let now = Utc::now();
        SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id,
            plan_type: PlanType::Monthly.to_string(),
            status: SubscriptionStatus::Pending.to_string(),
            channel: PaymentChannel::ManualTransfer.to_string(),
            external_reference: Some("REF123".to_string()),
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_stores_a_pending_manual_subscription() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        subscription_repo
            .expect_find_live_for_user()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));

        profile_repo
            .expect_ensure_profile()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        subscription_repo
            .expect_create_pending()
            .withf(move |new_subscription| {
                new_subscription.user_id == user_id
                    && new_subscription.plan_type == "monthly"
                    && new_subscription.status == "pending"
                    && new_subscription.channel == "manual_transfer"
                    && new_subscription.external_reference.as_deref() == Some("REF123")
            })
            .times(1)
            .returning(move |_| {
                let entity = pending_manual(user_id);
                Box::pin(async move { Ok(Some(entity)) })
            });

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let dto = usecase
            .create_pending_subscription(
                user_id,
                Some("student@example.com".to_string()),
                CreateManualSubscriptionRequest {
                    plan_type: "monthly".to_string(),
                    payment_reference: "REF123".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(dto.status, Some(SubscriptionStatus::Pending));
        assert_eq!(dto.channel, Some(PaymentChannel::ManualTransfer));
    }

    #[tokio::test]
    async fn create_conflicts_when_a_live_subscription_exists() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let profile_repo = MockProfileRepository::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(move |_| {
                let entity = pending_manual(user_id);
                Box::pin(async move { Ok(vec![entity]) })
            });

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let err = usecase
            .create_pending_subscription(
                user_id,
                None,
                CreateManualSubscriptionRequest {
                    plan_type: "monthly".to_string(),
                    payment_reference: "REF123".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ManualTransferError::AlreadySubscribed));
    }

    #[tokio::test]
    async fn create_conflicts_when_the_constraint_reports_a_racing_insert() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(|_| Box::pin(async { Ok(Vec::new()) }));
        profile_repo
            .expect_ensure_profile()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        subscription_repo
            .expect_create_pending()
            .returning(|_| Box::pin(async { Ok(None) }));

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let err = usecase
            .create_pending_subscription(
                user_id,
                None,
                CreateManualSubscriptionRequest {
                    plan_type: "yearly".to_string(),
                    payment_reference: "REF999".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ManualTransferError::AlreadySubscribed));
    }

    #[tokio::test]
    async fn create_requires_a_payment_reference() {
        let usecase = ManualTransferUseCase::new(
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(MockProfileRepository::new()),
        );

        let err = usecase
            .create_pending_subscription(
                Uuid::new_v4(),
                None,
                CreateManualSubscriptionRequest {
                    plan_type: "monthly".to_string(),
                    payment_reference: "   ".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ManualTransferError::MissingPaymentReference));
    }

    #[tokio::test]
    async fn create_rejects_unknown_plan_types() {
        let usecase = ManualTransferUseCase::new(
            Arc::new(MockSubscriptionRepository::new()),
            Arc::new(MockProfileRepository::new()),
        );

        let err = usecase
            .create_pending_subscription(
                Uuid::new_v4(),
                None,
                CreateManualSubscriptionRequest {
                    plan_type: "weekly".to_string(),
                    payment_reference: "REF123".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ManualTransferError::InvalidPlanType(_)));
    }

    #[tokio::test]
    async fn verification_requires_the_admin_capability() {
        let admin_id = Uuid::new_v4();

        let subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        profile_repo
            .expect_is_admin()
            .with(eq(admin_id))
            .returning(|_| Box::pin(async { Ok(false) }));

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let err = usecase
            .verify_subscription(
                admin_id,
                VerifyManualSubscriptionRequest {
                    subscription_id: Uuid::new_v4(),
                    approve: true,
                    external_transfer_id: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ManualTransferError::AdminRequired));
    }

    #[tokio::test]
    async fn approval_activates_and_records_the_plan_price() {
        let admin_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let subscription = pending_manual(user_id);
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        profile_repo
            .expect_is_admin()
            .returning(|_| Box::pin(async { Ok(true) }));

        subscription_repo
            .expect_find_by_id()
            .with(eq(subscription_id))
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });

        subscription_repo
            .expect_activate_manual_with_payment()
            .withf(move |id, period_start, period_end, payment| {
                *id == subscription_id
                    && *period_end
                        == period_start.checked_add_months(Months::new(1)).unwrap()
                    && payment.amount_minor == 499
                    && payment.currency == "USD"
                    && payment.status == "succeeded"
                    && payment.external_payment_id.as_deref() == Some("TRX-1")
                    && payment.user_id == user_id
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(true) }));

        subscription_repo
            .expect_has_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(true) }));
        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(true))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let response = usecase
            .verify_subscription(
                admin_id,
                VerifyManualSubscriptionRequest {
                    subscription_id,
                    approve: true,
                    external_transfer_id: Some("TRX-1".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(response.status, SubscriptionStatus::Active);
        assert!(response.is_premium);
    }

    #[tokio::test]
    async fn rejection_cancels_without_recording_a_payment() {
        let admin_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let subscription = pending_manual(user_id);
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        profile_repo
            .expect_is_admin()
            .returning(|_| Box::pin(async { Ok(true) }));

        subscription_repo
            .expect_find_by_id()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(Some(entity)) })
            });

        subscription_repo
            .expect_update_status_guarded()
            .withf(move |id, _, to, set_canceled_at| {
                *id == subscription_id
                    && *to == SubscriptionStatus::Canceled
                    && *set_canceled_at
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(true) }));

        subscription_repo
            .expect_has_active_subscription()
            .returning(|_| Box::pin(async { Ok(false) }));
        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(false))
            .returning(|_, _| Box::pin(async { Ok(false) }));

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let response = usecase
            .verify_subscription(
                admin_id,
                VerifyManualSubscriptionRequest {
                    subscription_id,
                    approve: false,
                    external_transfer_id: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(response.status, SubscriptionStatus::Canceled);
        assert!(!response.is_premium);
    }

    #[tokio::test]
    async fn cancel_pending_rejects_the_users_own_request() {
        let user_id = Uuid::new_v4();
        let subscription = pending_manual(user_id);
        let subscription_id = subscription.id;

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        subscription_repo
            .expect_find_live_for_user()
            .returning(move |_| {
                let entity = subscription.clone();
                Box::pin(async move { Ok(vec![entity]) })
            });

        subscription_repo
            .expect_update_status_guarded()
            .withf(move |id, _, to, _| {
                *id == subscription_id && *to == SubscriptionStatus::Canceled
            })
            .times(1)
            .returning(|_, _, _, _| Box::pin(async { Ok(true) }));

        subscription_repo
            .expect_has_active_subscription()
            .returning(|_| Box::pin(async { Ok(false) }));
        profile_repo
            .expect_set_premium()
            .returning(|_, _| Box::pin(async { Ok(false) }));

        let usecase =
            ManualTransferUseCase::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        usecase.cancel_pending_subscription(user_id).await.unwrap();
    }
}
