use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, TrajectoryError};
use crate::models::{ExamRecord, ScorePoint, ScoreSeries};

/// Maps a free-form period label ("PGY-1", "pgy 2", "3") to a zero-based
/// training-year index by keeping only its digits.
pub fn parse_year_index(label: &str) -> Result<u32> {
    let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
    let malformed = |reason| TrajectoryError::MalformedPeriodLabel {
        label: label.to_string(),
        reason,
    };

    if digits.is_empty() {
        return Err(malformed("no year digits"));
    }

    let year: u32 = digits.parse().map_err(|_| malformed("year out of range"))?;
    year.checked_sub(1).ok_or_else(|| malformed("year 0, training years start at 1"))
}

/// Builds the canonical ascending series from raw exam records.
///
/// Records without a percentile are dropped. Two records resolving to the
/// same year are rejected; the caller must pick one upstream.
pub fn normalize(records: &[ExamRecord]) -> Result<ScoreSeries> {
    let mut seen: HashMap<u32, &str> = HashMap::new();
    let mut points = Vec::with_capacity(records.len());

    for record in records {
        let Some(percentile) = record.percentile else {
            debug!(
                event = "normalize.skipped",
                resident_id = %record.resident_id,
                period = %record.period_label,
                "record has no percentile"
            );
            continue;
        };

        let year_index = parse_year_index(&record.period_label)?;

        if !percentile.is_finite() || !(0.0..=100.0).contains(&percentile) {
            return Err(TrajectoryError::PercentileOutOfRange {
                label: record.period_label.clone(),
                value: percentile,
            });
        }

        if let Some(first) = seen.insert(year_index, &record.period_label) {
            return Err(TrajectoryError::DuplicateYear {
                year_index,
                first: first.to_string(),
                second: record.period_label.clone(),
            });
        }

        points.push(ScorePoint::new(year_index, percentile));
    }

    points.sort_by_key(|point| point.year_index);
    Ok(ScoreSeries::new(points))
}
