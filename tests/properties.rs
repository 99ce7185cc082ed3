use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use residency_trajectory::{
    classify, detect_drift, find_similar, fit, normalize, ArchetypeCatalog, ExamRecord,
    HistoricalResident, ScorePoint, ScoreSeries, SimilarityConfig, Subject, Thresholds,
};
use uuid::Uuid;

const MIN_PROPTEST_CASES: u32 = 256;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn label_for(year: u32, style: u8) -> String {
    match style % 4 {
        0 => format!("PGY-{year}"),
        1 => format!("pgy {year}"),
        2 => year.to_string(),
        _ => format!("PGY{year} ITE"),
    }
}

fn percentile() -> impl Strategy<Value = f64> {
    (0u32..=1000).prop_map(|tenths| f64::from(tenths) / 10.0)
}

/// Well-formed series over the three-year window, gaps allowed.
fn window_series() -> impl Strategy<Value = ScoreSeries> {
    proptest::collection::vec(proptest::option::of(percentile()), 3).prop_map(|slots| {
        ScoreSeries::new(
            slots
                .into_iter()
                .enumerate()
                .filter_map(|(year, value)| value.map(|p| ScorePoint::new(year as u32, p)))
                .collect(),
        )
    })
}

fn full_series() -> impl Strategy<Value = ScoreSeries> {
    (percentile(), percentile(), percentile())
        .prop_map(|(a, b, c)| ScoreSeries::from(vec![(0, a), (1, b), (2, c)]))
}

/// Threshold sets that pass validation: ordered start bands and a strong
/// change above the stable band.
fn thresholds() -> impl Strategy<Value = Thresholds> {
    (
        0u32..40,
        1u32..30,
        1u32..30,
        1u32..40,
        1u32..20,
        1u32..60,
        1u32..20,
    )
        .prop_map(|(developing, solid_gap, strong_gap, level_soft, stable, change_gap, delta_soft)| {
            let developing_start = f64::from(developing);
            let solid_start = developing_start + f64::from(solid_gap);
            Thresholds {
                developing_start,
                solid_start,
                strong_start: solid_start + f64::from(strong_gap),
                level_softness: f64::from(level_soft) / 2.0,
                stable_band: f64::from(stable) / 2.0,
                strong_change: f64::from(stable) / 2.0 + f64::from(change_gap) / 2.0,
                delta_softness: f64::from(delta_soft) / 2.0,
                ..Thresholds::default()
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        ..ProptestConfig::default()
    })]

    #[test]
    fn normalized_series_is_sorted_without_duplicates(
        raw in proptest::collection::vec((1u32..=5, any::<u8>(), proptest::option::of(percentile())), 0..8)
    ) {
        let records: Vec<ExamRecord> = raw
            .iter()
            .map(|(year, style, value)| ExamRecord {
                resident_id: Uuid::nil(),
                period_label: label_for(*year, *style),
                percentile: *value,
                raw_score: None,
                test_date: None,
            })
            .collect();

        if let Ok(series) = normalize(&records) {
            prop_assert!(series
                .points()
                .windows(2)
                .all(|pair| pair[0].year_index < pair[1].year_index));
            let kept = raw.iter().filter(|(_, _, value)| value.is_some()).count();
            prop_assert_eq!(series.len(), kept);
        }
    }

    #[test]
    fn single_point_fit_is_flat(x in -50i32..50, y in -1000.0f64..1000.0, probe in -100.0f64..100.0) {
        let line = fit(&[(f64::from(x), y)]).unwrap();
        prop_assert_eq!(line.slope, 0.0);
        prop_assert_eq!(line.get_y(probe), y);
    }

    #[test]
    fn full_series_is_never_provisional(series in full_series()) {
        let outcome = classify(&series, &ArchetypeCatalog::builtin()).unwrap();
        prop_assert!(!outcome.classification.is_provisional);
        prop_assert!(outcome.classification.note.is_none());
        prop_assert_eq!(outcome.classification.data_years, 3);
    }

    #[test]
    fn confidence_is_bounded_and_alternatives_descend(series in window_series()) {
        let outcome = classify(&series, &ArchetypeCatalog::builtin()).unwrap();
        let c = &outcome.classification;
        prop_assert!((0.0..=1.0).contains(&c.confidence));
        prop_assert_eq!(c.is_provisional, c.data_years < 3);
        prop_assert!(outcome
            .alternatives
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence));
        prop_assert!(outcome
            .alternatives
            .iter()
            .all(|alt| alt.archetype_id != c.archetype_id && alt.confidence <= c.confidence));
    }

    #[test]
    fn any_loadable_catalog_matches_every_series(t in thresholds(), series in window_series()) {
        let catalog = ArchetypeCatalog::builtin()
            .with_version("calibrated")
            .with_thresholds(t)
            .unwrap();
        let outcome = classify(&series, &catalog);
        prop_assert!(outcome.is_ok(), "{:?}", outcome.err());
    }

    #[test]
    fn classification_is_idempotent(series in window_series()) {
        let catalog = ArchetypeCatalog::builtin();
        let first = serde_json::to_string(&classify(&series, &catalog).unwrap()).unwrap();
        let second = serde_json::to_string(&classify(&series, &catalog).unwrap()).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn no_original_never_drifts(series in window_series()) {
        let outcome = classify(&series, &ArchetypeCatalog::builtin()).unwrap();
        prop_assert!(detect_drift(None, &outcome.classification).is_none());
    }

    #[test]
    fn similarity_ranking_is_non_increasing(
        subject in window_series(),
        corpus in proptest::collection::vec(window_series(), 0..12),
    ) {
        let corpus: Vec<HistoricalResident> = corpus
            .into_iter()
            .enumerate()
            .map(|(n, score_series)| HistoricalResident {
                id: Uuid::from_u128(n as u128 + 1),
                name: format!("Resident {n}"),
                class_year: 2020,
                score_series,
                archetype: None,
            })
            .collect();
        let me = Subject { id: Uuid::nil(), series: &subject, archetype: None };
        let ranked = find_similar(me, &corpus, &SimilarityConfig { limit: 20, ..Default::default() });

        prop_assert!(ranked
            .windows(2)
            .all(|pair| pair[0].similarity_score >= pair[1].similarity_score));
        prop_assert!(ranked
            .iter()
            .all(|peer| (0.0..=1.0).contains(&peer.similarity_score) && peer.shared_years > 0));
    }
}

#[test]
fn empty_and_out_of_window_series_await_data() {
    let catalog = ArchetypeCatalog::builtin();
    for series in [ScoreSeries::default(), ScoreSeries::from(vec![(3, 55.0)])] {
        let c = classify(&series, &catalog).unwrap().classification;
        assert_eq!(c.confidence, 0.0);
        assert!(c.is_provisional);
        assert_eq!(c.data_years, 0);
    }
}
