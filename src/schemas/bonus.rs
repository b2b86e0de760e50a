use serde::Serialize;

use crate::db::models::MaterialRecord;
use crate::services::bonus::{BonusSummary, BonusTotal};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BonusRecordResponse {
    pub(crate) material_id: String,
    pub(crate) id: String,
    pub(crate) project: String,
    pub(crate) award_date: String,
    pub(crate) award_level: String,
    pub(crate) award_type: String,
    pub(crate) team_rank: String,
    pub(crate) self_score: f64,
    pub(crate) score_basis: String,
    pub(crate) college_score: f64,
}

impl From<MaterialRecord> for BonusRecordResponse {
    fn from(record: MaterialRecord) -> Self {
        Self {
            material_id: record.material_id,
            id: record.item_id,
            project: record.project,
            award_date: record.award_date,
            award_level: record.category,
            award_type: record.award_type,
            team_rank: record.team_rank,
            self_score: record.self_score,
            score_basis: record.score_basis,
            college_score: record.college_score,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BonusSummaryItem {
    pub(crate) category: &'static str,
    pub(crate) total_score: f64,
    pub(crate) item_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BonusSummaryResponse {
    pub(crate) total_score: f64,
    pub(crate) items: Vec<BonusSummaryItem>,
}

impl From<BonusSummary> for BonusSummaryResponse {
    fn from(summary: BonusSummary) -> Self {
        Self {
            total_score: summary.total_score,
            items: summary
                .items
                .into_iter()
                .map(|BonusTotal { bonus_type, total_score, item_count }| BonusSummaryItem {
                    category: bonus_type.as_str(),
                    total_score,
                    item_count,
                })
                .collect(),
        }
    }
}
