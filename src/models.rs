use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ArchetypeId;

/// One raw ITE result as stored by the evaluation-data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamRecord {
    pub resident_id: Uuid,
    pub period_label: String,
    pub percentile: Option<f64>,
    pub raw_score: Option<f64>,
    pub test_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentProfile {
    pub id: Uuid,
    pub name: String,
    pub class_year: i32,
    pub program: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub year_index: u32,
    pub percentile: f64,
}

impl ScorePoint {
    pub fn new(year_index: u32, percentile: f64) -> Self {
        Self {
            year_index,
            percentile,
        }
    }
}

/// Percentiles for one resident, at most one per training year, ascending.
///
/// Missing years are simply absent. Construction does not validate; the
/// normalizer produces well-formed series and the classifier re-checks the
/// ordering invariant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreSeries(Vec<ScorePoint>);

impl ScoreSeries {
    pub fn new(points: Vec<ScorePoint>) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[ScorePoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn percentile_at(&self, year_index: u32) -> Option<f64> {
        self.0
            .iter()
            .find(|point| point.year_index == year_index)
            .map(|point| point.percentile)
    }
}

impl From<Vec<(u32, f64)>> for ScoreSeries {
    fn from(pairs: Vec<(u32, f64)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(year_index, percentile)| ScorePoint::new(year_index, percentile))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// One level up, saturating at `High`.
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Moderate,
            Self::Moderate | Self::High => Self::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "moderate" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub archetype_id: ArchetypeId,
    pub archetype_name: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub is_provisional: bool,
    pub methodology_version: String,
    pub data_years: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeClassification {
    pub archetype_id: ArchetypeId,
    pub archetype_name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCause {
    NewData,
    MethodologyChange,
    NewDataAndMethodologyChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReason {
    pub cause: DriftCause,
    pub previous_archetype_id: ArchetypeId,
    pub current_archetype_id: ArchetypeId,
    pub previous_data_years: u8,
    pub current_data_years: u8,
    pub previous_version: String,
    pub current_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub original_classification: Option<Classification>,
    pub current_classification: Classification,
    pub alternatives: Vec<AlternativeClassification>,
    pub has_version_drift: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_reason: Option<DriftReason>,
}

/// A past resident available for peer comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalResident {
    pub id: Uuid,
    pub name: String,
    pub class_year: i32,
    pub score_series: ScoreSeries,
    pub archetype: Option<ArchetypeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarResident {
    pub id: Uuid,
    pub name: String,
    pub class_year: i32,
    pub similarity_score: f64,
    pub shared_years: usize,
    pub score_series: ScoreSeries,
    pub archetype: Option<ArchetypeId>,
}
