use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Material, MaterialRecord, User};
use crate::db::types::MaterialStatus;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[cfg(test)]
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fields written by a single review decision. `status: None` leaves the
/// stored status untouched.
///
/// The write only applies while the row still holds `expected_status` and
/// `expected_reviewers`, the values the decision was computed from.
#[derive(Debug, Clone)]
pub(crate) struct ReviewUpdate {
    pub(crate) material_id: String,
    pub(crate) expected_status: MaterialStatus,
    pub(crate) expected_reviewers: String,
    pub(crate) status: Option<MaterialStatus>,
    pub(crate) reviewers: String,
    pub(crate) comment: String,
    pub(crate) reviewed_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReviewWrite {
    Applied,
    Missing,
    /// Another writer changed status or reviewers since the read.
    Stale,
}

#[async_trait]
pub(crate) trait MaterialStore: Send + Sync {
    async fn get(&self, material_id: &str) -> Result<Option<Material>, StoreError>;

    async fn update_review(&self, update: ReviewUpdate) -> Result<ReviewWrite, StoreError>;
}

#[async_trait]
pub(crate) trait RecordStore: Send + Sync {
    async fn exists(&self, material_id: &str) -> Result<bool, StoreError>;

    /// Unique-key insert. Returns `false` when a record for the material
    /// already existed, in which case nothing was written.
    async fn insert(&self, record: &MaterialRecord) -> Result<bool, StoreError>;
}

#[async_trait]
pub(crate) trait RecordExtractor: Send + Sync {
    async fn extract(&self, material: &Material) -> anyhow::Result<ExtractedRecord>;
}

#[async_trait]
pub(crate) trait IdentityLookup: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
}

/// Runs a finalization attempt later, off the request path. Implementations
/// must not block and never report the outcome back.
pub(crate) trait FinalizeSpawner: Send + Sync {
    fn spawn_finalize(&self, material_id: &str);
}

/// Structured answer of the extraction model. Identity fields it may echo
/// back (`materialId`, `accountId`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ExtractedRecord {
    #[serde(rename = "type")]
    pub(crate) record_type: String,
    pub(crate) category: String,
    #[serde(rename = "id")]
    pub(crate) item_id: String,
    pub(crate) project: String,
    pub(crate) award_date: String,
    pub(crate) award_type: String,
    pub(crate) team_rank: String,
    #[serde(deserialize_with = "lenient_score")]
    pub(crate) self_score: f64,
    pub(crate) score_basis: String,
    #[serde(deserialize_with = "lenient_score")]
    pub(crate) college_score: f64,
}

impl ExtractedRecord {
    pub(crate) fn into_record(
        self,
        material: &Material,
        created_at: PrimitiveDateTime,
    ) -> MaterialRecord {
        MaterialRecord {
            material_id: material.id.clone(),
            account_id: material.uploader.clone(),
            record_type: self.record_type.trim().to_string(),
            category: self.category,
            item_id: self.item_id,
            project: self.project,
            award_date: self.award_date,
            award_type: self.award_type,
            team_rank: self.team_rank,
            self_score: self.self_score,
            score_basis: self.score_basis,
            college_score: self.college_score,
            created_at,
        }
    }
}

// Models sometimes quote numbers.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(number) => Ok(number.as_f64().unwrap_or_default()),
        serde_json::Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed.parse::<f64>().map_err(serde::de::Error::custom)
        }
        serde_json::Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!("invalid score: {other}"))),
    }
}
