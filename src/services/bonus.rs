use crate::db::models::MaterialRecord;

pub(crate) const ACADEMIC_SCORE_CAP: f64 = 15.0;
pub(crate) const COMPREHENSIVE_SCORE_CAP: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BonusType {
    Academic,
    Comprehensive,
}

impl BonusType {
    pub(crate) fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "academic" | "academics" | "学术专长" | "学术" | "speciality" | "specialty" => {
                Some(Self::Academic)
            }
            "comprehensive" | "comprehensiveness" | "综合" | "综合素质" | "performance" => {
                Some(Self::Comprehensive)
            }
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Comprehensive => "comprehensive",
        }
    }

    fn cap(self) -> f64 {
        match self {
            Self::Academic => ACADEMIC_SCORE_CAP,
            Self::Comprehensive => COMPREHENSIVE_SCORE_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BonusTotal {
    pub(crate) bonus_type: BonusType,
    pub(crate) total_score: f64,
    pub(crate) item_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BonusSummary {
    pub(crate) total_score: f64,
    pub(crate) items: Vec<BonusTotal>,
}

pub(crate) fn filter_by_type(records: Vec<MaterialRecord>, target: BonusType) -> Vec<MaterialRecord> {
    records
        .into_iter()
        .filter(|record| BonusType::normalize(&record.record_type) == Some(target))
        .collect()
}

/// Sums college scores per bonus type, each capped separately. Records of an
/// unknown type are ignored.
pub(crate) fn summarize(records: &[MaterialRecord]) -> BonusSummary {
    let items = [BonusType::Academic, BonusType::Comprehensive]
        .into_iter()
        .map(|bonus_type| {
            let matching = records
                .iter()
                .filter(|record| BonusType::normalize(&record.record_type) == Some(bonus_type));
            let (sum, item_count) =
                matching.fold((0.0, 0), |(sum, count), record| (sum + record.college_score, count + 1));
            BonusTotal { bonus_type, total_score: sum.min(bonus_type.cap()), item_count }
        })
        .collect::<Vec<_>>();

    BonusSummary { total_score: items.iter().map(|item| item.total_score).sum(), items }
}
