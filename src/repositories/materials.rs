use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::{CategoryCount, Material};
use crate::services::review::ports::{MaterialStore, ReviewUpdate, ReviewWrite, StoreError};

const COLUMNS: &str = "\
    id, title, description, category, tags, files, status, uploader, upload_time, \
    reviewers, review_time, review_comment, ai_score, ai_confidence, ai_suggestions, \
    ai_risk_level";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Material>, sqlx::Error> {
    sqlx::query_as::<_, Material>(&format!("SELECT {COLUMNS} FROM materials WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// `uploader: None` lists every material.
pub(crate) async fn list(
    pool: &PgPool,
    uploader: Option<&str>,
) -> Result<Vec<Material>, sqlx::Error> {
    sqlx::query_as::<_, Material>(&format!(
        "SELECT {COLUMNS} FROM materials
         WHERE ($1::text IS NULL OR uploader = $1)
         ORDER BY upload_time DESC"
    ))
    .bind(uploader)
    .fetch_all(pool)
    .await
}

/// Pending materials, skipping those `exclude_reviewer` already voted on.
pub(crate) async fn list_pending(
    pool: &PgPool,
    uploader: Option<&str>,
    exclude_reviewer: Option<&str>,
) -> Result<Vec<Material>, sqlx::Error> {
    sqlx::query_as::<_, Material>(&format!(
        "SELECT {COLUMNS} FROM materials
         WHERE status = 'pending'
           AND ($1::text IS NULL OR uploader = $1)
           AND ($2::text IS NULL OR NOT ($2 = ANY(string_to_array(reviewers, ','))))
         ORDER BY upload_time ASC"
    ))
    .bind(uploader)
    .bind(exclude_reviewer)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StatusCounts {
    pub(crate) total: i64,
    pub(crate) pending: i64,
    pub(crate) approved: i64,
    pub(crate) rejected: i64,
}

pub(crate) async fn status_counts(
    pool: &PgPool,
    uploader: Option<&str>,
) -> Result<StatusCounts, sqlx::Error> {
    sqlx::query_as::<_, StatusCounts>(
        "SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected
         FROM materials
         WHERE ($1::text IS NULL OR uploader = $1)",
    )
    .bind(uploader)
    .fetch_one(pool)
    .await
}

pub(crate) async fn category_counts(
    pool: &PgPool,
    uploader: Option<&str>,
) -> Result<Vec<CategoryCount>, sqlx::Error> {
    sqlx::query_as::<_, CategoryCount>(
        "SELECT category, COUNT(*) AS count
         FROM materials
         WHERE ($1::text IS NULL OR uploader = $1)
         GROUP BY category
         ORDER BY category",
    )
    .bind(uploader)
    .fetch_all(pool)
    .await
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM materials WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Compare-and-set on `(status, reviewers)`, so replicas racing on the same
/// material cannot overwrite each other's votes.
pub(crate) async fn update_review(
    pool: &PgPool,
    update: &ReviewUpdate,
) -> Result<ReviewWrite, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE materials
         SET status = COALESCE($2, status),
             reviewers = $3,
             review_comment = $4,
             review_time = $5
         WHERE id = $1 AND status = $6 AND reviewers = $7",
    )
    .bind(&update.material_id)
    .bind(update.status)
    .bind(&update.reviewers)
    .bind(&update.comment)
    .bind(update.reviewed_at)
    .bind(update.expected_status)
    .bind(&update.expected_reviewers)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(ReviewWrite::Applied);
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM materials WHERE id = $1)")
        .bind(&update.material_id)
        .fetch_one(pool)
        .await?;

    Ok(if exists { ReviewWrite::Stale } else { ReviewWrite::Missing })
}

#[derive(Clone)]
pub(crate) struct PgMaterialStore {
    pool: PgPool,
}

impl PgMaterialStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MaterialStore for PgMaterialStore {
    async fn get(&self, material_id: &str) -> Result<Option<Material>, StoreError> {
        Ok(find_by_id(&self.pool, material_id).await?)
    }

    async fn update_review(&self, update: ReviewUpdate) -> Result<ReviewWrite, StoreError> {
        Ok(update_review(&self.pool, &update).await?)
    }
}
