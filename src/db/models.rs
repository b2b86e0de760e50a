use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{MaterialStatus, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) account_id: String,
    pub(crate) username: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MaterialFile {
    pub(crate) file_url: String,
    pub(crate) file_name: String,
    #[serde(default)]
    pub(crate) file_size: i64,
}

/// One uploaded submission. `reviewers` is the comma-joined reviewer set in
/// insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Material {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) category: String,
    pub(crate) tags: Json<Vec<String>>,
    pub(crate) files: Json<Vec<MaterialFile>>,
    pub(crate) status: MaterialStatus,
    pub(crate) uploader: String,
    pub(crate) upload_time: PrimitiveDateTime,
    pub(crate) reviewers: String,
    pub(crate) review_time: Option<PrimitiveDateTime>,
    pub(crate) review_comment: Option<String>,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_confidence: Option<f64>,
    pub(crate) ai_suggestions: Json<Vec<String>>,
    pub(crate) ai_risk_level: Option<String>,
}

/// The bonus record extracted from an approved material. At most one row per
/// material; its presence marks the material as finalized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct MaterialRecord {
    pub(crate) material_id: String,
    pub(crate) account_id: String,
    pub(crate) record_type: String,
    pub(crate) category: String,
    pub(crate) item_id: String,
    pub(crate) project: String,
    pub(crate) award_date: String,
    pub(crate) award_type: String,
    pub(crate) team_rank: String,
    pub(crate) self_score: f64,
    pub(crate) score_basis: String,
    pub(crate) college_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct CategoryCount {
    pub(crate) category: String,
    pub(crate) count: i64,
}
