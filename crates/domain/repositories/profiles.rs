use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::profiles::ProfileEntity;

#[async_trait]
#[automock]
pub trait ProfileRepository {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<ProfileEntity>>;

    /// Creates the profile row on first contact; a no-op when it exists.
    async fn ensure_profile(&self, user_id: Uuid, email: Option<String>) -> Result<()>;

    /// Capability check for verification endpoints; read from storage on
    /// every call, never cached.
    async fn is_admin(&self, user_id: Uuid) -> Result<bool>;

    /// Writes the premium flag only when it differs from the stored value.
    /// Returns whether a write happened.
    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> Result<bool>;
}
