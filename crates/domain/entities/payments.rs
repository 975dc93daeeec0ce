use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payments;

/// One settled charge. Rows are written exactly once and never updated;
/// `external_payment_id` is the idempotency key for provider-observed charges.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub amount_minor: i32,
    pub currency: String,
    pub status: String,
    pub external_payment_id: Option<String>,
    pub plan_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub amount_minor: i32,
    pub currency: String,
    pub status: String,
    pub external_payment_id: Option<String>,
    pub plan_type: String,
}
