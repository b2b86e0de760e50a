use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::models::MaterialRecord;
use crate::services::review::ports::{RecordStore, StoreError};

const COLUMNS: &str = "\
    material_id, account_id, record_type, category, item_id, project, award_date, \
    award_type, team_rank, self_score, score_basis, college_score, created_at";

pub(crate) async fn exists(pool: &PgPool, material_id: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM material_records WHERE material_id = $1)",
    )
    .bind(material_id)
    .fetch_one(pool)
    .await
}

/// Returns `false` when a record for the material was already present.
pub(crate) async fn insert(pool: &PgPool, record: &MaterialRecord) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO material_records (
            material_id, account_id, record_type, category, item_id, project,
            award_date, award_type, team_rank, self_score, score_basis, college_score,
            created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
        ON CONFLICT (material_id) DO NOTHING",
    )
    .bind(&record.material_id)
    .bind(&record.account_id)
    .bind(&record.record_type)
    .bind(&record.category)
    .bind(&record.item_id)
    .bind(&record.project)
    .bind(&record.award_date)
    .bind(&record.award_type)
    .bind(&record.team_rank)
    .bind(record.self_score)
    .bind(&record.score_basis)
    .bind(record.college_score)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn list_by_account(
    pool: &PgPool,
    account_id: &str,
) -> Result<Vec<MaterialRecord>, sqlx::Error> {
    sqlx::query_as::<_, MaterialRecord>(&format!(
        "SELECT {COLUMNS} FROM material_records WHERE account_id = $1 ORDER BY created_at"
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await
}

#[derive(Clone)]
pub(crate) struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn exists(&self, material_id: &str) -> Result<bool, StoreError> {
        Ok(exists(&self.pool, material_id).await?)
    }

    async fn insert(&self, record: &MaterialRecord) -> Result<bool, StoreError> {
        Ok(insert(&self.pool, record).await?)
    }
}
