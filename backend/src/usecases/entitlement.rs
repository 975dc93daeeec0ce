use std::sync::Arc;

use anyhow::Result;
use crates::domain::repositories::{
    profiles::ProfileRepository, subscriptions::SubscriptionRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

/// The single choke point for the premium flag. Both payment channels write
/// subscription statuses; this recomputes the derived flag from all of a
/// user's subscriptions so neither channel can leave it inconsistent.
pub struct EntitlementSynchronizer<S, Pr>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    profile_repo: Arc<Pr>,
}

impl<S, Pr> EntitlementSynchronizer<S, Pr>
where
    S: SubscriptionRepository + Send + Sync + 'static,
    Pr: ProfileRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>, profile_repo: Arc<Pr>) -> Self {
        Self {
            subscription_repo,
            profile_repo,
        }
    }

    /// Recomputes `is_premium` as "at least one active subscription" and
    /// writes it only when it differs from the cached value. Must run after
    /// every subscription status write for the user.
    pub async fn sync(&self, user_id: Uuid) -> Result<bool> {
        let has_active = self
            .subscription_repo
            .has_active_subscription(user_id)
            .await?;

        let changed = self.profile_repo.set_premium(user_id, has_active).await?;
        if changed {
            info!(
                %user_id,
                is_premium = has_active,
                "entitlement: premium flag recomputed"
            );
        }

        Ok(has_active)
    }

    /// Administrative override, outside the subscription lifecycle. The next
    /// `sync` for this user recomputes the flag from subscriptions again.
    pub async fn override_premium(&self, user_id: Uuid, is_premium: bool) -> Result<()> {
        self.profile_repo.ensure_profile(user_id, None).await?;
        self.profile_repo.set_premium(user_id, is_premium).await?;

        warn!(
            %user_id,
            is_premium,
            "entitlement: manual premium override applied outside the subscription lifecycle"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::domain::repositories::{
        profiles::MockProfileRepository, subscriptions::MockSubscriptionRepository,
    };
    use mockall::predicate::eq;

    #[tokio::test]
    async fn sync_grants_premium_when_an_active_subscription_exists() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        subscription_repo
            .expect_has_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(true) }));

        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(true))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let synchronizer =
            EntitlementSynchronizer::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let is_premium = synchronizer.sync(user_id).await.unwrap();
        assert!(is_premium);
    }

    #[tokio::test]
    async fn sync_revokes_premium_when_no_subscription_is_active() {
        let user_id = Uuid::new_v4();

        let mut subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        subscription_repo
            .expect_has_active_subscription()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(false) }));

        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(false))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(false) }));

        let synchronizer =
            EntitlementSynchronizer::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        let is_premium = synchronizer.sync(user_id).await.unwrap();
        assert!(!is_premium);
    }

    #[tokio::test]
    async fn override_creates_the_profile_before_writing_the_flag() {
        let user_id = Uuid::new_v4();

        let subscription_repo = MockSubscriptionRepository::new();
        let mut profile_repo = MockProfileRepository::new();

        profile_repo
            .expect_ensure_profile()
            .with(eq(user_id), eq(None::<String>))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        profile_repo
            .expect_set_premium()
            .with(eq(user_id), eq(true))
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let synchronizer =
            EntitlementSynchronizer::new(Arc::new(subscription_repo), Arc::new(profile_repo));

        synchronizer.override_premium(user_id, true).await.unwrap();
    }
}
