use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{ArchetypeCatalog, ArchetypeId};
use crate::classifier;
use crate::models::{ExamRecord, HistoricalResident, ResidentProfile, ScoreSeries, SimilarResident};
use crate::normalize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub limit: usize,
    pub min_shared_years: usize,
    pub archetype_match_bonus: f64,
    pub archetype_mismatch_penalty: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            min_shared_years: 1,
            archetype_match_bonus: 0.05,
            archetype_mismatch_penalty: 0.05,
        }
    }
}

/// The resident peers are being found for.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub id: Uuid,
    pub series: &'a ScoreSeries,
    pub archetype: Option<ArchetypeId>,
}

/// Distance-based similarity over the years both series cover.
///
/// Returns `(score, shared_years)` with score `1 - rms / 100`, or `None`
/// when the series share no year.
pub fn trajectory_similarity(a: &ScoreSeries, b: &ScoreSeries) -> Option<(f64, usize)> {
    let mut sum_sq = 0.0;
    let mut shared = 0usize;
    for point in a.points() {
        if let Some(other) = b.percentile_at(point.year_index) {
            let diff = point.percentile - other;
            sum_sq += diff * diff;
            shared += 1;
        }
    }

    if shared == 0 {
        return None;
    }
    let rms = (sum_sq / shared as f64).sqrt();
    Some(((1.0 - rms / 100.0).clamp(0.0, 1.0), shared))
}

/// Ranks the corpus by similarity to the subject, best first.
///
/// Ties go to the lower resident id so repeated calls agree. Residents with
/// too few shared years, and the subject itself, are left out.
pub fn find_similar(
    subject: Subject<'_>,
    corpus: &[HistoricalResident],
    config: &SimilarityConfig,
) -> Vec<SimilarResident> {
    let subject_archetype = subject
        .archetype
        .filter(|id| *id != ArchetypeId::AwaitingData);

    let mut matches: Vec<SimilarResident> = corpus
        .iter()
        .filter(|candidate| candidate.id != subject.id)
        .filter_map(|candidate| {
            let (base, shared) = trajectory_similarity(subject.series, &candidate.score_series)?;
            if shared < config.min_shared_years.max(1) {
                return None;
            }

            let adjustment = match (subject_archetype, candidate.archetype) {
                (Some(mine), Some(theirs)) if mine == theirs => config.archetype_match_bonus,
                (Some(_), Some(_)) => -config.archetype_mismatch_penalty,
                _ => 0.0,
            };

            Some(SimilarResident {
                id: candidate.id,
                name: candidate.name.clone(),
                class_year: candidate.class_year,
                similarity_score: (base + adjustment).clamp(0.0, 1.0),
                shared_years: shared,
                score_series: candidate.score_series.clone(),
                archetype: candidate.archetype,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity_score
            .total_cmp(&a.similarity_score)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(config.limit);

    debug!(
        event = "similarity.ranked",
        subject_id = %subject.id,
        corpus = corpus.len(),
        returned = matches.len(),
    );
    matches
}

/// Turns cohort exam records into classified historical residents.
///
/// Residents whose records fail normalization are skipped; one bad record
/// should not hide the rest of the cohort.
pub fn build_corpus(
    profiles: &[ResidentProfile],
    records: &[ExamRecord],
    catalog: &ArchetypeCatalog,
) -> Vec<HistoricalResident> {
    let mut by_resident: HashMap<Uuid, Vec<ExamRecord>> = HashMap::new();
    for record in records {
        by_resident
            .entry(record.resident_id)
            .or_default()
            .push(record.clone());
    }

    let mut corpus = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let records = by_resident.remove(&profile.id).unwrap_or_default();
        let series = match normalize::normalize(&records) {
            Ok(series) => series,
            Err(err) => {
                warn!(
                    event = "corpus.skipped",
                    resident_id = %profile.id,
                    error = %err,
                );
                continue;
            }
        };

        let archetype = match classifier::classify(&series, catalog) {
            Ok(outcome) => Some(outcome.classification.archetype_id)
                .filter(|id| *id != ArchetypeId::AwaitingData),
            Err(err) => {
                warn!(
                    event = "corpus.unclassified",
                    resident_id = %profile.id,
                    error = %err,
                );
                None
            }
        };

        corpus.push(HistoricalResident {
            id: profile.id,
            name: profile.name.clone(),
            class_year: profile.class_year,
            score_series: series,
            archetype,
        });
    }
    corpus
}
