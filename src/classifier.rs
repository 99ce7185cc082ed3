use serde::Serialize;
use tracing::{debug, error};

use crate::catalog::{ArchetypeCatalog, ArchetypeDefinition, ArchetypeId, MAX_DATA_YEARS};
use crate::error::{Result, TrajectoryError};
use crate::models::{AlternativeClassification, Classification, ScorePoint, ScoreSeries};
use crate::rules::Evidence;

pub const AWAITING_DATA_NOTE: &str =
    "Awaiting data: no ITE results recorded yet. A classification will be assigned once the first result arrives.";

/// Primary classification plus everything that explains it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationOutcome {
    pub classification: Classification,
    pub alternatives: Vec<AlternativeClassification>,
    pub evidence: Evidence,
}

/// Classifies a normalized series against the given catalog.
///
/// Pure: the same series and catalog always produce the same outcome.
pub fn classify(series: &ScoreSeries, catalog: &ArchetypeCatalog) -> Result<ClassificationOutcome> {
    check_series(series)?;

    let window: Vec<ScorePoint> = series
        .points()
        .iter()
        .copied()
        .filter(|point| point.year_index < u32::from(MAX_DATA_YEARS))
        .collect();
    if window.len() < series.len() {
        debug!(
            event = "classification.window",
            ignored = series.len() - window.len(),
            "points past the training window are not classified"
        );
    }

    let evidence = Evidence::from_points(&window);
    if evidence.data_years == 0 {
        return awaiting_data(catalog, evidence);
    }

    let thresholds = catalog.thresholds();
    let scored: Vec<(&ArchetypeDefinition, f64)> = catalog
        .rule_set(evidence.data_years)
        .map(|def| (def, def.id.score(&evidence, thresholds)))
        .collect();
    let total: f64 = scored.iter().map(|(_, raw)| raw).sum();

    // First maximum wins, so ties resolve to catalog order.
    let mut primary: Option<(&ArchetypeDefinition, f64)> = None;
    for &(def, raw) in &scored {
        if primary.map_or(true, |(_, best)| raw > best) {
            primary = Some((def, raw));
        }
    }
    let (primary_def, primary_raw) = match primary {
        Some(found) if total > 0.0 && found.1 > 0.0 => found,
        _ => {
            error!(
                event = "classification.no_match",
                data_years = evidence.data_years,
                methodology_version = %catalog.methodology_version(),
                evidence = ?evidence,
                "no archetype in the rule set matched"
            );
            return Err(TrajectoryError::InvalidCatalog(format!(
                "no {}-year archetype matched the series",
                evidence.data_years
            )));
        }
    };

    let ceiling = thresholds.completeness_for(evidence.data_years);
    let confidence_of = |raw: f64| (raw / total * ceiling).clamp(0.0, 1.0);

    let mut alternatives: Vec<AlternativeClassification> = scored
        .iter()
        .filter(|(def, raw)| def.id != primary_def.id && *raw > 0.0)
        .map(|(def, raw)| AlternativeClassification {
            archetype_id: def.id,
            archetype_name: def.name.clone(),
            confidence: confidence_of(*raw),
        })
        .collect();
    alternatives.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let is_provisional = evidence.data_years < MAX_DATA_YEARS;
    let worst_drop = evidence.deltas().fold(f64::INFINITY, f64::min);
    let escalate = is_provisional && worst_drop <= -thresholds.escalation_decline;
    let risk_level = if escalate {
        primary_def.default_risk_level.escalate()
    } else {
        primary_def.default_risk_level
    };

    let note = is_provisional.then(|| {
        let mut note = format!(
            "Provisional: based on {} of {} training years. Classification will refine as more ITE results arrive.",
            evidence.data_years, MAX_DATA_YEARS
        );
        if escalate {
            note.push_str(&format!(
                " Risk raised one level after a drop of {:.1} percentile points.",
                -worst_drop
            ));
        }
        note
    });

    let classification = Classification {
        archetype_id: primary_def.id,
        archetype_name: primary_def.name.clone(),
        confidence: confidence_of(primary_raw),
        risk_level,
        is_provisional,
        methodology_version: catalog.methodology_version().to_string(),
        data_years: evidence.data_years,
        note,
    };

    debug!(
        event = "classification.computed",
        archetype = %classification.archetype_id,
        confidence = classification.confidence,
        risk = classification.risk_level.as_str(),
        data_years = classification.data_years,
        escalated = escalate,
    );

    Ok(ClassificationOutcome {
        classification,
        alternatives,
        evidence,
    })
}

fn awaiting_data(catalog: &ArchetypeCatalog, evidence: Evidence) -> Result<ClassificationOutcome> {
    let def = catalog.definition(ArchetypeId::AwaitingData)?;
    Ok(ClassificationOutcome {
        classification: Classification {
            archetype_id: def.id,
            archetype_name: def.name.clone(),
            confidence: 0.0,
            risk_level: def.default_risk_level,
            is_provisional: true,
            methodology_version: catalog.methodology_version().to_string(),
            data_years: 0,
            note: Some(AWAITING_DATA_NOTE.to_string()),
        },
        alternatives: Vec::new(),
        evidence,
    })
}

/// The normalizer guarantees these; a violation here is an integration bug.
fn check_series(series: &ScoreSeries) -> Result<()> {
    let points = series.points();
    let problem = points
        .windows(2)
        .find(|pair| pair[0].year_index >= pair[1].year_index)
        .map(|pair| {
            format!(
                "year index {} follows {}",
                pair[1].year_index, pair[0].year_index
            )
        })
        .or_else(|| {
            points
                .iter()
                .find(|point| !(point.percentile.is_finite() && (0.0..=100.0).contains(&point.percentile)))
                .map(|point| {
                    format!(
                        "percentile {} at year index {} is outside [0, 100]",
                        point.percentile, point.year_index
                    )
                })
        });

    match problem {
        Some(detail) => {
            error!(event = "classification.invalid_series", series = ?points, %detail);
            Err(TrajectoryError::InvalidSeries(detail))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    fn run(pairs: Vec<(u32, f64)>) -> ClassificationOutcome {
        classify(&ScoreSeries::from(pairs), &ArchetypeCatalog::builtin()).unwrap()
    }

    #[test]
    fn empty_series_is_awaiting_data() {
        let outcome = run(vec![]);
        let c = &outcome.classification;
        assert_eq!(c.archetype_id, ArchetypeId::AwaitingData);
        assert_eq!(c.confidence, 0.0);
        assert!(c.is_provisional);
        assert_eq!(c.note.as_deref(), Some(AWAITING_DATA_NOTE));
        assert!(outcome.alternatives.is_empty());
    }

    #[test]
    fn single_year_uses_one_year_rules() {
        let c = run(vec![(0, 40.0)]).classification;
        assert_eq!(c.archetype_id, ArchetypeId::DevelopingStart);
        assert_eq!(c.archetype_id.required_data_years(), 1);
        assert!(c.is_provisional);
        assert!(c.confidence > 0.0 && c.confidence < 1.0);
        assert!(c.note.unwrap().contains("1 of 3"));
    }

    #[test]
    fn strong_gain_reads_as_improving_and_not_high_risk() {
        let outcome = run(vec![(0, 30.0), (1, 65.0)]);
        assert_eq!(outcome.evidence.delta12, Some(35.0));
        let c = outcome.classification;
        assert_eq!(c.archetype_id, ArchetypeId::RapidRiser);
        assert_ne!(c.risk_level, RiskLevel::High);
    }

    #[test]
    fn falling_course_is_riskier_than_flat_course() {
        let falling = run(vec![(0, 80.0), (1, 45.0), (2, 40.0)]).classification;
        let flat = run(vec![(0, 80.0), (1, 80.0), (2, 80.0)]).classification;
        assert_eq!(falling.archetype_id, ArchetypeId::Declining);
        assert_eq!(flat.archetype_id, ArchetypeId::SteadyPerformer);
        assert!(falling.risk_level > flat.risk_level);
        assert!(!falling.is_provisional);
        assert!(falling.note.is_none());
    }

    #[test]
    fn large_provisional_drop_escalates_risk() {
        // Wider strong-change band keeps a 25 point drop a moderate slip.
        let thresholds = crate::catalog::Thresholds {
            strong_change: 30.0,
            ..Default::default()
        };
        let catalog = ArchetypeCatalog::builtin().with_thresholds(thresholds).unwrap();
        let outcome = classify(&ScoreSeries::from(vec![(0, 70.0), (2, 45.0)]), &catalog).unwrap();
        let c = outcome.classification;
        assert_eq!(c.archetype_id, ArchetypeId::Slipping);
        assert_eq!(c.risk_level, RiskLevel::High);
        assert!(c.note.unwrap().contains("Risk raised"));
    }

    #[test]
    fn alternatives_are_descending_and_exclude_primary() {
        let outcome = run(vec![(0, 66.0)]);
        assert_eq!(outcome.classification.archetype_id, ArchetypeId::SolidStart);
        assert!(!outcome.alternatives.is_empty());
        assert!(outcome
            .alternatives
            .iter()
            .all(|alt| alt.archetype_id != ArchetypeId::SolidStart));
        assert!(outcome
            .alternatives
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence));
    }

    #[test]
    fn confidences_share_the_completeness_ceiling() {
        let outcome = run(vec![(0, 66.0)]);
        let total: f64 = outcome.classification.confidence
            + outcome
                .alternatives
                .iter()
                .map(|alt| alt.confidence)
                .sum::<f64>();
        assert!((total - 0.6).abs() < 1e-9);
    }

    #[test]
    fn unsorted_series_is_an_invariant_violation() {
        let series = ScoreSeries::from(vec![(1, 50.0), (0, 40.0)]);
        let err = classify(&series, &ArchetypeCatalog::builtin()).unwrap_err();
        assert!(matches!(err, TrajectoryError::InvalidSeries(_)));
    }

    #[test]
    fn years_past_the_window_are_ignored() {
        let c = run(vec![(0, 50.0), (1, 50.0), (2, 50.0), (3, 10.0)]).classification;
        assert_eq!(c.data_years, 3);
        assert_eq!(c.archetype_id, ArchetypeId::SteadyPerformer);
    }

    #[test]
    fn methodology_version_is_stamped() {
        let catalog = ArchetypeCatalog::builtin().with_version("trajectory-2025.2");
        let c = classify(&ScoreSeries::from(vec![(0, 50.0)]), &catalog)
            .unwrap()
            .classification;
        assert_eq!(c.methodology_version, "trajectory-2025.2");
    }
}
