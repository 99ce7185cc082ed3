//! Trendlines for an individual against class and program cohorts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::ExamRecord;
use crate::normalize::parse_year_index;
use crate::regression::{self, LinearFit};

pub const PERCENTILE: &str = "percentile";
pub const RAW_SCORE: &str = "raw_score";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendScope {
    Resident,
    Class,
    Program,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendlineSeries {
    pub owner_scope: TrendScope,
    pub attribute_key: String,
    pub points: Vec<(String, f64)>,
}

/// Maps period labels onto the x axis.
///
/// Every label the normalizer accepts has a position. Other labels are
/// dropped from a series rather than failing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeriodOrdering {
    /// Indexed by training year. `years` is the minimum axis length; later
    /// years (PGY-4 and on) extend it.
    TrainingYears { years: u32 },
    /// Explicit labels, indexed by position. Matching ignores case and
    /// punctuation, then falls back to the training year of the label.
    Labels { labels: Vec<String> },
}

impl Default for PeriodOrdering {
    fn default() -> Self {
        Self::TrainingYears { years: 3 }
    }
}

fn canonical(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

impl PeriodOrdering {
    pub fn index_of(&self, label: &str) -> Option<u32> {
        match self {
            Self::TrainingYears { .. } => parse_year_index(label).ok(),
            Self::Labels { labels } => {
                let wanted = canonical(label);
                let position = labels
                    .iter()
                    .position(|known| canonical(known) == wanted)
                    .or_else(|| {
                        let year = parse_year_index(label).ok()?;
                        labels
                            .iter()
                            .position(|known| parse_year_index(known).ok() == Some(year))
                    })?;
                u32::try_from(position).ok()
            }
        }
    }

    /// Display labels in axis order, long enough to reach `highest`.
    pub fn labels(&self, highest: Option<u32>) -> Vec<String> {
        match self {
            Self::TrainingYears { years } => {
                let last = highest.map_or(*years, |index| (*years).max(index.saturating_add(1)));
                (1..=last).map(|year| format!("PGY-{year}")).collect()
            }
            Self::Labels { labels } => labels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeTrend {
    pub attribute_key: String,
    pub resident: Option<LinearFit>,
    pub class: Option<LinearFit>,
    pub program: Option<LinearFit>,
}

impl AttributeTrend {
    pub fn scope(&self, scope: TrendScope) -> Option<&LinearFit> {
        match scope {
            TrendScope::Resident => self.resident.as_ref(),
            TrendScope::Class => self.class.as_ref(),
            TrendScope::Program => self.program.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendlineBundle {
    pub periods: Vec<String>,
    pub attributes: Vec<AttributeTrend>,
}

impl TrendlineBundle {
    pub fn attribute(&self, key: &str) -> Option<&AttributeTrend> {
        self.attributes.iter().find(|trend| trend.attribute_key == key)
    }
}

/// Fits every (attribute, scope) pair independently.
///
/// A scope with no usable points for an attribute comes back as `None`.
pub fn aggregate(series: &[TrendlineSeries], ordering: &PeriodOrdering) -> Result<TrendlineBundle> {
    let mut grouped: BTreeMap<&str, BTreeMap<TrendScope, Vec<(u32, f64)>>> = BTreeMap::new();
    let mut excluded = 0usize;
    let mut highest: Option<u32> = None;

    for item in series {
        let scopes = grouped.entry(item.attribute_key.as_str()).or_default();
        let points = scopes.entry(item.owner_scope).or_default();
        for (label, score) in &item.points {
            match ordering.index_of(label) {
                Some(index) if score.is_finite() => {
                    highest = highest.max(Some(index));
                    points.push((index, *score));
                }
                _ => excluded += 1,
            }
        }
    }

    if excluded > 0 {
        debug!(event = "trendline.excluded", points = excluded);
    }

    let mut attributes = Vec::with_capacity(grouped.len());
    for (key, scopes) in grouped {
        let fit_scope = |scope: TrendScope| -> Result<Option<LinearFit>> {
            match scopes.get(&scope) {
                Some(points) if !points.is_empty() => Ok(Some(regression::fit_indexed(points)?)),
                _ => Ok(None),
            }
        };
        attributes.push(AttributeTrend {
            attribute_key: key.to_string(),
            resident: fit_scope(TrendScope::Resident)?,
            class: fit_scope(TrendScope::Class)?,
            program: fit_scope(TrendScope::Program)?,
        });
    }

    Ok(TrendlineBundle {
        periods: ordering.labels(highest),
        attributes,
    })
}

/// One series per tracked attribute for the given scope.
pub fn series_from_records(scope: TrendScope, records: &[ExamRecord]) -> Vec<TrendlineSeries> {
    vec![
        attribute_series(scope, PERCENTILE, records, |record| record.percentile),
        attribute_series(scope, RAW_SCORE, records, |record| record.raw_score),
    ]
}

fn attribute_series(
    scope: TrendScope,
    key: &str,
    records: &[ExamRecord],
    value: impl Fn(&ExamRecord) -> Option<f64>,
) -> TrendlineSeries {
    TrendlineSeries {
        owner_scope: scope,
        attribute_key: key.to_string(),
        points: records
            .iter()
            .filter_map(|record| value(record).map(|v| (record.period_label.clone(), v)))
            .collect(),
    }
}
