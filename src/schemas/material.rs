use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{Material, MaterialFile};
use crate::db::types::MaterialStatus;
use crate::services::review::reviewers::ReviewerSet;
use crate::services::review::ReviewOutcome;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReviewRequest {
    #[validate(length(min = 1, max = 128))]
    pub(crate) material_id: String,
    #[validate(length(min = 1, max = 32))]
    pub(crate) status: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub(crate) comment: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub(crate) id: String,
    /// The decision as submitted.
    pub(crate) status: String,
    pub(crate) comment: String,
    pub(crate) material_status: MaterialStatus,
    pub(crate) reviewers: Vec<String>,
}

impl ReviewResponse {
    pub(crate) fn from_outcome(decision: &str, outcome: ReviewOutcome) -> Self {
        Self {
            id: outcome.material_id,
            status: decision.trim().to_string(),
            comment: outcome.comment,
            material_status: outcome.status,
            reviewers: outcome.reviewers,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MaterialResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) category: String,
    pub(crate) tags: Vec<String>,
    pub(crate) files: Vec<MaterialFile>,
    pub(crate) status: MaterialStatus,
    pub(crate) uploader: String,
    pub(crate) upload_time: String,
    pub(crate) reviewers: Vec<String>,
    pub(crate) review_time: Option<String>,
    pub(crate) review_comment: Option<String>,
    pub(crate) ai_score: Option<f64>,
    pub(crate) ai_confidence: Option<f64>,
    pub(crate) ai_suggestions: Vec<String>,
    pub(crate) ai_risk_level: Option<String>,
}

impl From<Material> for MaterialResponse {
    fn from(material: Material) -> Self {
        Self {
            reviewers: ReviewerSet::parse(&material.reviewers).into_vec(),
            upload_time: format_primitive(material.upload_time),
            review_time: format_optional(material.review_time),
            id: material.id,
            title: material.title,
            description: material.description,
            category: material.category,
            tags: material.tags.0,
            files: material.files.0,
            status: material.status,
            uploader: material.uploader,
            review_comment: material.review_comment,
            ai_score: material.ai_score,
            ai_confidence: material.ai_confidence,
            ai_suggestions: material.ai_suggestions.0,
            ai_risk_level: material.ai_risk_level,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MaterialStatistics {
    pub(crate) total: i64,
    pub(crate) pending: i64,
    pub(crate) approved: i64,
    pub(crate) rejected: i64,
    pub(crate) by_category: BTreeMap<String, i64>,
}
