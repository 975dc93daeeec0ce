use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::profiles::{InsertProfileEntity, ProfileEntity},
        repositories::profiles::ProfileRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::profiles},
};

pub struct ProfilePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ProfilePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProfileRepository for ProfilePostgres {
    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<ProfileEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let profile = profiles::table
            .filter(profiles::user_id.eq(user_id))
            .select(ProfileEntity::as_select())
            .first::<ProfileEntity>(&mut conn)
            .optional()?;

        Ok(profile)
    }

    async fn ensure_profile(&self, user_id: Uuid, email: Option<String>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(profiles::table)
            .values(&InsertProfileEntity { user_id, email })
            .on_conflict(profiles::user_id)
            .do_nothing()
            .execute(&mut conn)?;

        Ok(())
    }

    async fn is_admin(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let is_admin = profiles::table
            .filter(profiles::user_id.eq(user_id))
            .select(profiles::is_admin)
            .first::<bool>(&mut conn)
            .optional()?;

        Ok(is_admin.unwrap_or(false))
    }

    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = update(
            profiles::table
                .filter(profiles::user_id.eq(user_id))
                .filter(profiles::is_premium.ne(is_premium)),
        )
        .set((
            profiles::is_premium.eq(is_premium),
            profiles::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows > 0)
    }
}
