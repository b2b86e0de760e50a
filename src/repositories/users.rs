use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::User;
use crate::services::review::ports::{IdentityLookup, StoreError};

const COLUMNS: &str = "id, account_id, username, role, is_active, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[derive(Clone)]
pub(crate) struct PgIdentityLookup {
    pool: PgPool,
}

impl PgIdentityLookup {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityLookup for PgIdentityLookup {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(find_by_id(&self.pool, user_id).await?)
    }
}
