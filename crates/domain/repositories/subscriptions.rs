use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::{
    payments::InsertPaymentEntity,
    subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
};
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Looks up an automated-channel subscription by the provider's
    /// subscription id.
    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>>;

    /// All subscriptions currently holding the user's pending/active slots.
    async fn find_live_for_user(&self, user_id: Uuid) -> Result<Vec<SubscriptionEntity>>;

    async fn has_active_subscription(&self, user_id: Uuid) -> Result<bool>;

    /// Inserts a pending subscription. Returns `None` when the database
    /// uniqueness constraint reports the user already holds that slot, which
    /// closes the race two concurrent creates would otherwise leave open.
    async fn create_pending(
        &self,
        new_subscription: InsertSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>>;

    /// Manual approval: activates the subscription and writes the payment row
    /// in one transaction, guarded on the row still being pending. Returns
    /// whether the transition applied.
    async fn activate_manual_with_payment(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        payment: InsertPaymentEntity,
    ) -> Result<bool>;

    /// Activation reconciled from provider state: sets status active and the
    /// period bounds, guarded on a non-terminal current status.
    async fn activate_automated(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<bool>;

    /// Guarded status write: only applies while the stored status is one of
    /// `from`. Returns whether a row changed.
    async fn update_status_guarded(
        &self,
        subscription_id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
        set_canceled_at: bool,
    ) -> Result<bool>;

    /// Flags an active subscription to stop renewing; status stays active.
    async fn mark_cancel_at_period_end(&self, subscription_id: Uuid) -> Result<bool>;

    /// Settled-charge ingestion: inserts the payment (no-op on a duplicate
    /// `external_payment_id`), and only when inserted extends the period and
    /// forces the status active, all in one transaction. Returns whether the
    /// payment was inserted.
    async fn apply_payment_completed(
        &self,
        subscription_id: Uuid,
        payment: InsertPaymentEntity,
        new_period_end: DateTime<Utc>,
    ) -> Result<bool>;

    async fn list_pending_manual(&self) -> Result<Vec<SubscriptionEntity>>;
}
