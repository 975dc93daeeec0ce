use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::{InsertPaymentEntity, PaymentEntity};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    /// Inserts a settled charge. Returns `None` when the
    /// `external_payment_id` was already recorded (duplicate observation).
    async fn record_payment(&self, new_payment: InsertPaymentEntity) -> Result<Option<Uuid>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<PaymentEntity>>;
}
