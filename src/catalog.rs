//! Versioned registry of trajectory archetypes.
//!
//! The set of archetypes is closed ([`ArchetypeId`]); what a methodology
//! version changes is the presentation of each archetype and the
//! calibration thresholds its rule reads. A catalog is immutable once
//! built and is swapped wholesale by the engine.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::models::{RiskLevel, ScorePoint};
use crate::rules::Evidence;

pub const BUILTIN_METHODOLOGY_VERSION: &str = "trajectory-2024.1";

/// Training is a three-year window; rule sets exist for 1, 2 and 3 years.
pub const MAX_DATA_YEARS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchetypeId {
    AwaitingData,
    // one-year rule set
    StrongStart,
    SolidStart,
    DevelopingStart,
    AtRiskStart,
    // two-year rule set
    RapidRiser,
    Improving,
    HoldingSteady,
    Slipping,
    SharpDecline,
    // three-year rule set
    ConsistentImprover,
    LateBloomer,
    EarlySurge,
    SteadyPerformer,
    PersistentStruggler,
    Rebound,
    LateFade,
    Declining,
    VariableCourse,
}

impl ArchetypeId {
    pub const ALL: [ArchetypeId; 19] = [
        Self::AwaitingData,
        Self::StrongStart,
        Self::SolidStart,
        Self::DevelopingStart,
        Self::AtRiskStart,
        Self::RapidRiser,
        Self::Improving,
        Self::HoldingSteady,
        Self::Slipping,
        Self::SharpDecline,
        Self::ConsistentImprover,
        Self::LateBloomer,
        Self::EarlySurge,
        Self::SteadyPerformer,
        Self::PersistentStruggler,
        Self::Rebound,
        Self::LateFade,
        Self::Declining,
        Self::VariableCourse,
    ];

    /// Data years the archetype's rule consumes; 0 for the sentinel.
    pub fn required_data_years(self) -> u8 {
        match self {
            Self::AwaitingData => 0,
            Self::StrongStart | Self::SolidStart | Self::DevelopingStart | Self::AtRiskStart => 1,
            Self::RapidRiser
            | Self::Improving
            | Self::HoldingSteady
            | Self::Slipping
            | Self::SharpDecline => 2,
            Self::ConsistentImprover
            | Self::LateBloomer
            | Self::EarlySurge
            | Self::SteadyPerformer
            | Self::PersistentStruggler
            | Self::Rebound
            | Self::LateFade
            | Self::Declining
            | Self::VariableCourse => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingData => "awaiting_data",
            Self::StrongStart => "strong_start",
            Self::SolidStart => "solid_start",
            Self::DevelopingStart => "developing_start",
            Self::AtRiskStart => "at_risk_start",
            Self::RapidRiser => "rapid_riser",
            Self::Improving => "improving",
            Self::HoldingSteady => "holding_steady",
            Self::Slipping => "slipping",
            Self::SharpDecline => "sharp_decline",
            Self::ConsistentImprover => "consistent_improver",
            Self::LateBloomer => "late_bloomer",
            Self::EarlySurge => "early_surge",
            Self::SteadyPerformer => "steady_performer",
            Self::PersistentStruggler => "persistent_struggler",
            Self::Rebound => "rebound",
            Self::LateFade => "late_fade",
            Self::Declining => "declining",
            Self::VariableCourse => "variable_course",
        }
    }
}

impl std::fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArchetypeId {
    type Err = TrajectoryError;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == value)
            .ok_or_else(|| TrajectoryError::UnknownArchetype(value.to_string()))
    }
}

/// Calibration parameters read by the archetype rules.
///
/// Every value here needs sign-off from program leadership before it is
/// used for real decisions; the defaults are starting points only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Single-year percentile at or above which a start counts as strong.
    pub strong_start: f64,
    pub solid_start: f64,
    /// Below this single-year percentile a start is at risk.
    pub developing_start: f64,
    /// Width of the soft edge on percentile-level bands.
    pub level_softness: f64,
    /// Year-over-year change (percentile points) still considered flat.
    pub stable_band: f64,
    /// Change that counts as a large rise or fall.
    pub strong_change: f64,
    /// Width of the soft edge on delta bands.
    pub delta_softness: f64,
    /// Mean percentile at or above which a flat course is "steady".
    pub steady_level: f64,
    /// Mean percentile at or below which a flat course is "struggling".
    pub struggling_level: f64,
    /// A provisional series with any delta at or below minus this value has
    /// its risk raised one level.
    pub escalation_decline: f64,
    /// Constant raw score of the catch-all three-year archetype.
    pub variable_baseline: f64,
    /// Confidence ceiling for 1, 2 and 3 data years.
    pub completeness: [f64; 3],
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            strong_start: 70.0,
            solid_start: 50.0,
            developing_start: 25.0,
            level_softness: 10.0,
            stable_band: 5.0,
            strong_change: 15.0,
            delta_softness: 5.0,
            steady_level: 50.0,
            struggling_level: 35.0,
            escalation_decline: 20.0,
            variable_baseline: 0.15,
            completeness: [0.6, 0.85, 1.0],
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(TrajectoryError::InvalidCatalog(msg.to_string()));
        let values = [
            self.strong_start,
            self.solid_start,
            self.developing_start,
            self.level_softness,
            self.stable_band,
            self.strong_change,
            self.delta_softness,
            self.steady_level,
            self.struggling_level,
            self.escalation_decline,
            self.variable_baseline,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            return fail("thresholds must be finite");
        }
        if !(0.0 <= self.developing_start
            && self.developing_start < self.solid_start
            && self.solid_start < self.strong_start
            && self.strong_start <= 100.0)
        {
            return fail("start bands must satisfy 0 <= developing < solid < strong <= 100");
        }
        if self.level_softness <= 0.0 || self.delta_softness <= 0.0 {
            return fail("softness must be positive");
        }
        if self.stable_band <= 0.0 || self.strong_change <= self.stable_band {
            return fail("strong_change must exceed a positive stable_band");
        }
        if self.struggling_level > self.steady_level {
            return fail("struggling_level must not exceed steady_level");
        }
        if self.escalation_decline <= 0.0 {
            return fail("escalation_decline must be positive");
        }
        if !(self.variable_baseline > 0.0 && self.variable_baseline < 1.0) {
            return fail("variable_baseline must be in (0, 1)");
        }
        let [one, two, three] = self.completeness;
        if [one, two, three]
            .iter()
            .any(|factor| !(factor.is_finite() && *factor > 0.0 && *factor <= 1.0))
            || one > two
            || two > three
        {
            return fail("completeness factors must be ascending within (0, 1]");
        }
        Ok(())
    }

    /// Confidence ceiling for a given number of data years (1..=3).
    pub fn completeness_for(&self, data_years: u8) -> f64 {
        match data_years {
            0 => 0.0,
            1 => self.completeness[0],
            2 => self.completeness[1],
            _ => self.completeness[2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeDefinition {
    pub id: ArchetypeId,
    pub name: String,
    pub required_data_years: u8,
    pub color: String,
    pub default_risk_level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDefinition {
    id: String,
    name: String,
    required_data_years: u8,
    color: String,
    default_risk_level: RiskLevel,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCatalog {
    methodology_version: String,
    #[serde(default)]
    thresholds: Thresholds,
    archetypes: Vec<RawDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCatalog")]
pub struct ArchetypeCatalog {
    methodology_version: String,
    thresholds: Thresholds,
    archetypes: Vec<ArchetypeDefinition>,
}

impl TryFrom<RawCatalog> for ArchetypeCatalog {
    type Error = TrajectoryError;

    fn try_from(raw: RawCatalog) -> Result<Self> {
        let archetypes = raw
            .archetypes
            .into_iter()
            .map(|def| {
                Ok(ArchetypeDefinition {
                    id: def.id.parse()?,
                    name: def.name,
                    required_data_years: def.required_data_years,
                    color: def.color,
                    default_risk_level: def.default_risk_level,
                    description: def.description,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(raw.methodology_version, raw.thresholds, archetypes)
    }
}

impl ArchetypeCatalog {
    pub fn new(
        methodology_version: impl Into<String>,
        thresholds: Thresholds,
        archetypes: Vec<ArchetypeDefinition>,
    ) -> Result<Self> {
        let catalog = Self {
            methodology_version: methodology_version.into(),
            thresholds,
            archetypes,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let raw: RawCatalog = toml::from_str(input)
            .map_err(|err| TrajectoryError::InvalidCatalog(err.to_string()))?;
        Self::try_from(raw)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|err| {
            TrajectoryError::InvalidCatalog(format!("{}: {err}", path.display()))
        })?;
        Self::from_toml_str(&input)
    }

    /// Catalog shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            methodology_version: BUILTIN_METHODOLOGY_VERSION.to_string(),
            thresholds: Thresholds::default(),
            archetypes: builtin_definitions(),
        }
    }

    /// Same archetypes and thresholds under a different version tag.
    pub fn with_version(mut self, methodology_version: impl Into<String>) -> Self {
        self.methodology_version = methodology_version.into();
        self
    }

    /// Recalibrated copy. Pair with [`with_version`](Self::with_version)
    /// before installing it in an engine.
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Result<Self> {
        self.thresholds = thresholds;
        self.validate()?;
        Ok(self)
    }

    pub fn methodology_version(&self) -> &str {
        &self.methodology_version
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn archetypes(&self) -> &[ArchetypeDefinition] {
        &self.archetypes
    }

    /// Lookup by persisted string id.
    pub fn get(&self, id: &str) -> Result<&ArchetypeDefinition> {
        self.definition(id.parse()?)
    }

    pub fn definition(&self, id: ArchetypeId) -> Result<&ArchetypeDefinition> {
        self.archetypes
            .iter()
            .find(|def| def.id == id)
            .ok_or_else(|| TrajectoryError::UnknownArchetype(id.to_string()))
    }

    /// Archetypes whose rule needs exactly `data_years` years, in catalog order.
    pub fn rule_set(&self, data_years: u8) -> impl Iterator<Item = &ArchetypeDefinition> {
        self.archetypes
            .iter()
            .filter(move |def| data_years > 0 && def.required_data_years == data_years)
    }

    fn validate(&self) -> Result<()> {
        if self.methodology_version.trim().is_empty() {
            return Err(TrajectoryError::InvalidCatalog(
                "methodology_version must not be empty".to_string(),
            ));
        }
        self.thresholds.validate()?;

        let mut seen = HashSet::new();
        for def in &self.archetypes {
            if !seen.insert(def.id) {
                return Err(TrajectoryError::InvalidCatalog(format!(
                    "archetype {} is defined more than once",
                    def.id
                )));
            }
            if def.required_data_years != def.id.required_data_years() {
                return Err(TrajectoryError::InvalidCatalog(format!(
                    "archetype {} requires {} data years, not {}",
                    def.id,
                    def.id.required_data_years(),
                    def.required_data_years
                )));
            }
            if def.name.trim().is_empty() || def.color.trim().is_empty() {
                return Err(TrajectoryError::InvalidCatalog(format!(
                    "archetype {} needs a name and a color",
                    def.id
                )));
            }
        }

        if let Some(missing) = ArchetypeId::ALL.iter().find(|id| !seen.contains(*id)) {
            return Err(TrajectoryError::InvalidCatalog(format!(
                "archetype {missing} is not defined"
            )));
        }
        self.check_rule_coverage()
    }

    /// Every one-year level and every two-year net change must match some
    /// archetype. The three-year set always has the catch-all.
    fn check_rule_coverage(&self) -> Result<()> {
        let levels = (0..=200).map(|half| {
            Evidence::from_points(&[ScorePoint::new(0, f64::from(half) / 2.0)])
        });
        let changes = (-200..=200).map(|half| {
            let change = f64::from(half) / 2.0;
            let start = if change < 0.0 { 100.0 } else { 0.0 };
            Evidence::from_points(&[
                ScorePoint::new(0, start),
                ScorePoint::new(1, start + change),
            ])
        });

        for evidence in levels.chain(changes) {
            let matched = self
                .rule_set(evidence.data_years)
                .any(|def| def.id.score(&evidence, &self.thresholds) > 0.0);
            if !matched {
                return Err(TrajectoryError::InvalidCatalog(format!(
                    "no {}-year archetype matches last={:?} net_change={:?}",
                    evidence.data_years, evidence.last, evidence.net_change
                )));
            }
        }
        Ok(())
    }
}

impl Default for ArchetypeCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_definitions() -> Vec<ArchetypeDefinition> {
    use ArchetypeId::*;
    use RiskLevel::{High, Low, Moderate};

    let rows: [(ArchetypeId, &str, &str, RiskLevel, &str); 19] = [
        (AwaitingData, "Awaiting Data", "#9e9e9e", Low, "No ITE results recorded yet."),
        (StrongStart, "Strong Start", "#2e7d32", Low, "First ITE well above the national median."),
        (SolidStart, "Solid Start", "#66bb6a", Low, "First ITE at or above the national median."),
        (DevelopingStart, "Developing Start", "#ffa726", Moderate, "First ITE below the median but above the concern threshold."),
        (AtRiskStart, "At-Risk Start", "#e53935", High, "First ITE in the lowest band; early support recommended."),
        (RapidRiser, "Rapid Riser", "#1b5e20", Low, "Large gain between the two available years."),
        (Improving, "Improving", "#43a047", Low, "Moderate gain between the two available years."),
        (HoldingSteady, "Holding Steady", "#1e88e5", Low, "Little change between the two available years."),
        (Slipping, "Slipping", "#fb8c00", Moderate, "Moderate drop between the two available years."),
        (SharpDecline, "Sharp Decline", "#c62828", High, "Large drop between the two available years."),
        (ConsistentImprover, "Consistent Improver", "#2e7d32", Low, "Gains in both year-over-year intervals."),
        (LateBloomer, "Late Bloomer", "#7cb342", Low, "Flat or lower early, then a large gain in the final year."),
        (EarlySurge, "Early Surge", "#00897b", Low, "Large early gain that was held afterwards."),
        (SteadyPerformer, "Steady Performer", "#1e88e5", Low, "Flat course at or above the median."),
        (PersistentStruggler, "Persistent Struggler", "#b71c1c", High, "Flat or falling course in the lower band."),
        (Rebound, "Rebound", "#8e24aa", Moderate, "Large early drop followed by recovery."),
        (LateFade, "Late Fade", "#f4511e", Moderate, "Held or improved early, then a large drop in the final year."),
        (Declining, "Declining", "#d32f2f", High, "Drops in both year-over-year intervals."),
        (VariableCourse, "Variable Course", "#757575", Moderate, "No single pattern fits the three-year course."),
    ];

    rows.into_iter()
        .map(|(id, name, color, risk, description)| ArchetypeDefinition {
            id,
            name: name.to_string(),
            required_data_years: id.required_data_years(),
            color: color.to_string(),
            default_risk_level: risk,
            description: description.to_string(),
        })
        .collect()
}
