//! Request-level orchestration over an atomically swappable catalog.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::ArchetypeCatalog;
use crate::classifier::{self, ClassificationOutcome};
use crate::config::EngineConfig;
use crate::drift;
use crate::error::{Result, TrajectoryError};
use crate::models::{
    Classification, ClassificationResult, ExamRecord, HistoricalResident, ResidentProfile,
    ScoreSeries, SimilarResident,
};
use crate::normalize;
use crate::rules::Evidence;
use crate::similarity::{self, SimilarityConfig, Subject};
use crate::trendline::{self, PeriodOrdering, TrendScope, TrendlineBundle};

/// Everything computed for one resident in one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub resident_id: Uuid,
    pub series: ScoreSeries,
    pub evidence: Evidence,
    pub result: ClassificationResult,
    pub similar: Vec<SimilarResident>,
}

pub struct TrajectoryEngine {
    catalog: RwLock<Arc<ArchetypeCatalog>>,
    similarity: SimilarityConfig,
    periods: PeriodOrdering,
}

impl TrajectoryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(config.catalog)),
            similarity: config.similarity,
            periods: config.periods,
        }
    }

    /// Snapshot of the active catalog. Hold it for the whole request.
    pub fn catalog(&self) -> Arc<ArchetypeCatalog> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs a new catalog and returns the one it replaced. Requests
    /// already holding a snapshot finish on the old catalog.
    ///
    /// A catalog whose content differs from the active one must carry a new
    /// methodology version.
    pub fn replace_catalog(&self, catalog: ArchetypeCatalog) -> Result<Arc<ArchetypeCatalog>> {
        let mut slot = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if slot.methodology_version() == catalog.methodology_version() && **slot != catalog {
            warn!(
                event = "catalog.rejected",
                methodology_version = %catalog.methodology_version(),
                "catalog content changed without a version bump"
            );
            return Err(TrajectoryError::InvalidCatalog(format!(
                "catalog content changed but methodology_version is still {}",
                catalog.methodology_version()
            )));
        }
        let previous = std::mem::replace(&mut *slot, Arc::new(catalog));
        info!(
            event = "catalog.replaced",
            from_version = %previous.methodology_version(),
            to_version = %slot.methodology_version(),
        );
        Ok(previous)
    }

    /// Normalizes and classifies one resident's records.
    pub fn classify_records(
        &self,
        records: &[ExamRecord],
    ) -> Result<(ScoreSeries, ClassificationOutcome)> {
        let catalog = self.catalog();
        let series = normalize::normalize(records)?;
        let outcome = classifier::classify(&series, &catalog)?;
        Ok((series, outcome))
    }

    /// Full pipeline: normalize, classify, compare with the persisted
    /// original, and rank peers from the corpus.
    pub fn analyze(
        &self,
        resident_id: Uuid,
        records: &[ExamRecord],
        original: Option<Classification>,
        corpus: &[HistoricalResident],
    ) -> Result<Analysis> {
        let _span = tracing::info_span!("trajectory.analyze", resident_id = %resident_id).entered();
        let catalog = self.catalog();

        let series = normalize::normalize(records)?;
        let ClassificationOutcome {
            classification,
            alternatives,
            evidence,
        } = classifier::classify(&series, &catalog)?;

        let similar = similarity::find_similar(
            Subject {
                id: resident_id,
                series: &series,
                archetype: Some(classification.archetype_id),
            },
            corpus,
            &self.similarity,
        );

        let result = drift::build_result(original, classification, alternatives);
        info!(
            event = "classification.completed",
            archetype = %result.current_classification.archetype_id,
            confidence = result.current_classification.confidence,
            risk = result.current_classification.risk_level.as_str(),
            provisional = result.current_classification.is_provisional,
            drift = result.has_version_drift,
            peers = similar.len(),
            methodology_version = %catalog.methodology_version(),
        );

        Ok(Analysis {
            resident_id,
            series,
            evidence,
            result,
            similar,
        })
    }

    /// Classifies cohort residents for peer matching under the current catalog.
    pub fn build_corpus(
        &self,
        profiles: &[ResidentProfile],
        records: &[ExamRecord],
    ) -> Vec<HistoricalResident> {
        similarity::build_corpus(profiles, records, &self.catalog())
    }

    /// Resident, class and program trendlines for every tracked attribute.
    pub fn trendlines(
        &self,
        resident: &[ExamRecord],
        class: &[ExamRecord],
        program: &[ExamRecord],
    ) -> Result<TrendlineBundle> {
        let mut series = trendline::series_from_records(TrendScope::Resident, resident);
        series.extend(trendline::series_from_records(TrendScope::Class, class));
        series.extend(trendline::series_from_records(TrendScope::Program, program));
        trendline::aggregate(&series, &self.periods)
    }
}

impl Default for TrajectoryEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ArchetypeId;
    use crate::models::DriftCause;

    fn records(id: Uuid, scores: &[(&str, f64)]) -> Vec<ExamRecord> {
        scores
            .iter()
            .map(|(label, percentile)| ExamRecord {
                resident_id: id,
                period_label: label.to_string(),
                percentile: Some(*percentile),
                raw_score: Some(200.0 + percentile * 2.0),
                test_date: None,
            })
            .collect()
    }

    #[test]
    fn first_analysis_has_no_drift() {
        let engine = TrajectoryEngine::default();
        let id = Uuid::from_u128(1);
        let analysis = engine
            .analyze(id, &records(id, &[("PGY-1", 40.0)]), None, &[])
            .unwrap();
        assert!(!analysis.result.has_version_drift);
        assert_eq!(
            analysis.result.original_classification.as_ref(),
            Some(&analysis.result.current_classification)
        );
        assert!(analysis.similar.is_empty());
    }

    #[test]
    fn new_year_of_data_drifts_from_original() {
        let engine = TrajectoryEngine::default();
        let id = Uuid::from_u128(1);
        let first = engine
            .analyze(id, &records(id, &[("PGY-1", 40.0)]), None, &[])
            .unwrap();
        let second = engine
            .analyze(
                id,
                &records(id, &[("PGY-1", 40.0), ("PGY-2", 75.0)]),
                Some(first.result.current_classification),
                &[],
            )
            .unwrap();
        assert!(second.result.has_version_drift);
        assert_eq!(
            second.result.drift_reason.unwrap().cause,
            DriftCause::NewData
        );
    }

    #[test]
    fn replacing_catalog_changes_version_for_later_requests() {
        let engine = TrajectoryEngine::default();
        let snapshot = engine.catalog();
        let previous = engine
            .replace_catalog(ArchetypeCatalog::builtin().with_version("v-next"))
            .unwrap();

        assert_eq!(previous.methodology_version(), snapshot.methodology_version());
        assert_eq!(engine.catalog().methodology_version(), "v-next");

        let id = Uuid::from_u128(7);
        let (_, outcome) = engine
            .classify_records(&records(id, &[("PGY-1", 80.0)]))
            .unwrap();
        assert_eq!(outcome.classification.methodology_version, "v-next");
        assert_eq!(outcome.classification.archetype_id, ArchetypeId::StrongStart);
    }

    #[test]
    fn recalibration_under_same_version_is_rejected() {
        let engine = TrajectoryEngine::default();
        let id = Uuid::from_u128(3);
        let scores = records(id, &[("PGY-1", 50.0), ("PGY-2", 56.0)]);
        let original = engine
            .analyze(id, &scores, None, &[])
            .unwrap()
            .result
            .current_classification;

        let recalibrated = ArchetypeCatalog::builtin()
            .with_thresholds(crate::catalog::Thresholds {
                stable_band: 8.0,
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            engine.replace_catalog(recalibrated),
            Err(TrajectoryError::InvalidCatalog(_))
        ));

        // The active catalog is untouched, so nothing drifts.
        let again = engine.analyze(id, &scores, Some(original), &[]).unwrap();
        assert!(!again.result.has_version_drift);
        assert_eq!(
            again.result.current_classification.archetype_id,
            ArchetypeId::Improving
        );
    }

    #[test]
    fn reloading_an_identical_catalog_is_allowed() {
        let engine = TrajectoryEngine::default();
        let previous = engine.replace_catalog(ArchetypeCatalog::builtin()).unwrap();
        assert_eq!(*previous, ArchetypeCatalog::builtin());
    }

    #[test]
    fn analysis_ranks_peers_from_corpus() {
        let engine = TrajectoryEngine::default();
        let subject = Uuid::from_u128(1);
        let peer = Uuid::from_u128(2);
        let profiles = vec![ResidentProfile {
            id: peer,
            name: "Peer".to_string(),
            class_year: 2022,
            program: "IM".to_string(),
        }];
        let corpus = engine.build_corpus(&profiles, &records(peer, &[("PGY-1", 30.0), ("PGY-2", 62.0)]));
        let analysis = engine
            .analyze(subject, &records(subject, &[("PGY-1", 30.0), ("PGY-2", 65.0)]), None, &corpus)
            .unwrap();
        assert_eq!(analysis.similar.len(), 1);
        assert_eq!(analysis.similar[0].archetype, Some(ArchetypeId::RapidRiser));
    }

    #[test]
    fn trendlines_cover_all_three_scopes() {
        let engine = TrajectoryEngine::default();
        let me = Uuid::from_u128(1);
        let other = Uuid::from_u128(2);
        let mine = records(me, &[("PGY-1", 10.0), ("PGY-2", 20.0), ("PGY-3", 30.0)]);
        let mut class = mine.clone();
        class.extend(records(other, &[("PGY-1", 50.0), ("PGY-2", 50.0)]));
        let program = records(other, &[("PGY-1", 60.0)]);

        let bundle = engine.trendlines(&mine, &class, &program).unwrap();
        let percentile = bundle.attribute(trendline::PERCENTILE).unwrap();
        assert!((percentile.resident.unwrap().slope - 10.0).abs() < 1e-9);
        assert!(percentile.class.is_some());
        assert_eq!(percentile.program.unwrap().slope, 0.0);
        assert!(bundle.attribute(trendline::RAW_SCORE).unwrap().resident.is_some());
    }
}
