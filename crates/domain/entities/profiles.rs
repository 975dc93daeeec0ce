use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::profiles;

/// Per-account flags kept 1:1 with the external auth identity. `is_premium`
/// is a cache of "has at least one active subscription" maintained by the
/// entitlement synchronizer, not a source of truth on its own.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = profiles, primary_key(user_id))]
pub struct ProfileEntity {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_premium: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = profiles)]
pub struct InsertProfileEntity {
    pub user_id: Uuid,
    pub email: Option<String>,
}
