//! Classification and trend analytics for residents' In-Training
//! Examination trajectories.
//!
//! Raw exam records are normalized into a per-year percentile series,
//! classified against a versioned archetype catalog, compared with the
//! originally persisted classification, matched against historical peers,
//! and fitted with trendlines next to class and program cohorts.

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod db;
pub mod drift;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod regression;
pub mod report;
pub mod rules;
pub mod similarity;
pub mod trendline;

pub use catalog::{ArchetypeCatalog, ArchetypeDefinition, ArchetypeId, Thresholds};
pub use classifier::{classify, ClassificationOutcome};
pub use config::EngineConfig;
pub use drift::{build_result, detect_drift};
pub use engine::{Analysis, TrajectoryEngine};
pub use error::{Result, TrajectoryError};
pub use models::{
    AlternativeClassification, Classification, ClassificationResult, DriftCause, DriftReason,
    ExamRecord, HistoricalResident, ResidentProfile, RiskLevel, ScorePoint, ScoreSeries,
    SimilarResident,
};
pub use normalize::{normalize, parse_year_index};
pub use regression::{fit, LinearFit};
pub use similarity::{find_similar, SimilarityConfig, Subject};
pub use trendline::{PeriodOrdering, TrendScope, TrendlineBundle, TrendlineSeries};
