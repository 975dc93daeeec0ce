use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{
    Connection, RunQueryDsl, insert_into, prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    update,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            payments::InsertPaymentEntity,
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        },
        repositories::subscriptions::SubscriptionRepository,
        value_objects::enums::{
            payment_channels::PaymentChannel, subscription_statuses::SubscriptionStatus,
        },
    },
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{payments, subscriptions},
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    fn live_statuses() -> Vec<String> {
        vec![
            SubscriptionStatus::Pending.to_string(),
            SubscriptionStatus::Active.to_string(),
        ]
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::id.eq(subscription_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let subscription = subscriptions::table
            .filter(subscriptions::external_reference.eq(provider_subscription_id))
            .filter(subscriptions::channel.eq(PaymentChannel::AutomatedBilling.to_string()))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(subscription)
    }

    async fn find_live_for_user(&self, user_id: Uuid) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq_any(Self::live_statuses()))
            .order(subscriptions::created_at.desc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn has_active_subscription(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let active = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string()))
            .select(subscriptions::id)
            .first::<Uuid>(&mut conn)
            .optional()?;

        Ok(active.is_some())
    }

    async fn create_pending(
        &self,
        new_subscription: InsertSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The partial unique index on (user_id, status) is the authority on
        // the one-pending/one-active rule; a violation means another request
        // won the slot.
        let result = insert_into(subscriptions::table)
            .values(&new_subscription)
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(&mut conn);

        match result {
            Ok(subscription) => Ok(Some(subscription)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn activate_manual_with_payment(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        payment: InsertPaymentEntity,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Status change and ledger write commit together or not at all.
        let applied = conn.transaction::<bool, anyhow::Error, _>(|conn| {
            let rows = update(
                subscriptions::table
                    .filter(subscriptions::id.eq(subscription_id))
                    .filter(subscriptions::status.eq(SubscriptionStatus::Pending.to_string())),
            )
            .set((
                subscriptions::status.eq(SubscriptionStatus::Active.to_string()),
                subscriptions::current_period_start.eq(Some(period_start)),
                subscriptions::current_period_end.eq(Some(period_end)),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

            if rows == 0 {
                return Ok(false);
            }

            insert_into(payments::table).values(&payment).execute(conn)?;

            Ok(true)
        })?;

        Ok(applied)
    }

    async fn activate_automated(
        &self,
        subscription_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let activatable = vec![
            SubscriptionStatus::Pending.to_string(),
            SubscriptionStatus::PastDue.to_string(),
            SubscriptionStatus::Active.to_string(),
        ];

        let rows = update(
            subscriptions::table
                .filter(subscriptions::id.eq(subscription_id))
                .filter(subscriptions::status.eq_any(activatable)),
        )
        .set((
            subscriptions::status.eq(SubscriptionStatus::Active.to_string()),
            subscriptions::current_period_start.eq(Some(period_start)),
            subscriptions::current_period_end.eq(Some(period_end)),
            subscriptions::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows > 0)
    }

    async fn update_status_guarded(
        &self,
        subscription_id: Uuid,
        from: &[SubscriptionStatus],
        to: SubscriptionStatus,
        set_canceled_at: bool,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let from_values: Vec<String> = from.iter().map(|status| status.to_string()).collect();
        let now = Utc::now();

        let rows = if set_canceled_at {
            update(
                subscriptions::table
                    .filter(subscriptions::id.eq(subscription_id))
                    .filter(subscriptions::status.eq_any(from_values)),
            )
            .set((
                subscriptions::status.eq(to.to_string()),
                subscriptions::canceled_at.eq(Some(now)),
                subscriptions::updated_at.eq(now),
            ))
            .execute(&mut conn)?
        } else {
            update(
                subscriptions::table
                    .filter(subscriptions::id.eq(subscription_id))
                    .filter(subscriptions::status.eq_any(from_values)),
            )
            .set((
                subscriptions::status.eq(to.to_string()),
                subscriptions::updated_at.eq(now),
            ))
            .execute(&mut conn)?
        };

        Ok(rows > 0)
    }

    async fn mark_cancel_at_period_end(&self, subscription_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let now = Utc::now();
        let rows = update(
            subscriptions::table
                .filter(subscriptions::id.eq(subscription_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.to_string())),
        )
        .set((
            subscriptions::cancel_at_period_end.eq(true),
            subscriptions::canceled_at.eq(Some(now)),
            subscriptions::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

        Ok(rows > 0)
    }

    async fn apply_payment_completed(
        &self,
        subscription_id: Uuid,
        payment: InsertPaymentEntity,
        new_period_end: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The unique index on external_payment_id is the duplicate-delivery
        // defense; the period extension must only happen when this delivery
        // is the one that inserted the row.
        let inserted = conn.transaction::<bool, anyhow::Error, _>(|conn| {
            let inserted_id = insert_into(payments::table)
                .values(&payment)
                .on_conflict(payments::external_payment_id)
                .do_nothing()
                .returning(payments::id)
                .get_result::<Uuid>(conn)
                .optional()?;

            if inserted_id.is_none() {
                return Ok(false);
            }

            update(subscriptions::table.filter(subscriptions::id.eq(subscription_id)))
                .set((
                    subscriptions::status.eq(SubscriptionStatus::Active.to_string()),
                    subscriptions::current_period_end.eq(Some(new_period_end)),
                    subscriptions::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            Ok(true)
        })?;

        Ok(inserted)
    }

    async fn list_pending_manual(&self) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Pending.to_string()))
            .filter(subscriptions::channel.eq(PaymentChannel::ManualTransfer.to_string()))
            .order(subscriptions::created_at.asc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }
}
