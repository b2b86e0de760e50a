use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::review::ports::IdentityLookup;
use crate::services::review::ReviewEngine;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    identity: Arc<dyn IdentityLookup>,
    engine: Arc<ReviewEngine>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        identity: Arc<dyn IdentityLookup>,
        engine: Arc<ReviewEngine>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, identity, engine }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn identity(&self) -> &dyn IdentityLookup {
        self.inner.identity.as_ref()
    }

    pub(crate) fn engine(&self) -> &ReviewEngine {
        &self.inner.engine
    }
}
