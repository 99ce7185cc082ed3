//! Matching rules for each archetype.
//!
//! Every rule turns the observed evidence into a raw score in [0, 1] using
//! soft thresholds: full membership past a threshold, falling linearly to
//! zero over a softness width. Conjunctions take the minimum.

use serde::Serialize;

use crate::catalog::{ArchetypeId, Thresholds};
use crate::models::ScorePoint;

/// What the rules can see of a series. Deltas are `None` whenever either
/// endpoint year is missing; nothing is interpolated across a gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evidence {
    pub data_years: u8,
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub mean: Option<f64>,
    pub delta12: Option<f64>,
    pub delta23: Option<f64>,
    pub delta_total: Option<f64>,
    /// Last minus first observed percentile, when two or more years exist.
    pub net_change: Option<f64>,
}

impl Evidence {
    /// Built from the points inside the training window, already ascending.
    pub fn from_points(points: &[ScorePoint]) -> Self {
        let at = |year: u32| {
            points
                .iter()
                .find(|point| point.year_index == year)
                .map(|point| point.percentile)
        };
        let (y1, y2, y3) = (at(0), at(1), at(2));
        let diff = |from: Option<f64>, to: Option<f64>| Some(to? - from?);

        let first = points.first().map(|point| point.percentile);
        let last = points.last().map(|point| point.percentile);
        let mean = if points.is_empty() {
            None
        } else {
            Some(points.iter().map(|point| point.percentile).sum::<f64>() / points.len() as f64)
        };
        let net_change = if points.len() >= 2 { diff(first, last) } else { None };

        Self {
            data_years: points.len() as u8,
            first,
            last,
            mean,
            delta12: diff(y1, y2),
            delta23: diff(y2, y3),
            delta_total: diff(y1, y3),
            net_change,
        }
    }

    /// Every delta the series supports.
    pub fn deltas(&self) -> impl Iterator<Item = f64> {
        [self.delta12, self.delta23, self.delta_total, self.net_change]
            .into_iter()
            .flatten()
    }
}

fn at_least(x: f64, threshold: f64, softness: f64) -> f64 {
    if x >= threshold {
        1.0
    } else {
        ((x - (threshold - softness)) / softness).clamp(0.0, 1.0)
    }
}

fn at_most(x: f64, threshold: f64, softness: f64) -> f64 {
    at_least(-x, -threshold, softness)
}

fn between(x: f64, low: f64, high: f64, softness: f64) -> f64 {
    at_least(x, low, softness).min(at_most(x, high, softness))
}

struct Bands<'a> {
    t: &'a Thresholds,
}

impl Bands<'_> {
    fn up(&self, delta: f64) -> f64 {
        at_least(delta, self.t.stable_band, self.t.delta_softness)
    }

    fn down(&self, delta: f64) -> f64 {
        at_most(delta, -self.t.stable_band, self.t.delta_softness)
    }

    fn flat(&self, delta: f64) -> f64 {
        between(
            delta,
            -self.t.stable_band,
            self.t.stable_band,
            self.t.delta_softness,
        )
    }

    fn not_down(&self, delta: f64) -> f64 {
        at_least(delta, -self.t.stable_band, self.t.delta_softness)
    }

    fn not_up(&self, delta: f64) -> f64 {
        at_most(delta, self.t.stable_band, self.t.delta_softness)
    }

    /// Moderate rise: past the stable band, short of a strong change.
    fn gain(&self, delta: f64) -> f64 {
        between(
            delta,
            self.t.stable_band,
            self.t.strong_change,
            self.t.delta_softness,
        )
    }

    fn loss(&self, delta: f64) -> f64 {
        between(
            delta,
            -self.t.strong_change,
            -self.t.stable_band,
            self.t.delta_softness,
        )
    }

    fn big_up(&self, delta: f64) -> f64 {
        at_least(delta, self.t.strong_change, self.t.delta_softness)
    }

    fn big_down(&self, delta: f64) -> f64 {
        at_most(delta, -self.t.strong_change, self.t.delta_softness)
    }

    fn level_at_least(&self, level: f64, threshold: f64) -> f64 {
        at_least(level, threshold, self.t.level_softness)
    }

    fn level_at_most(&self, level: f64, threshold: f64) -> f64 {
        at_most(level, threshold, self.t.level_softness)
    }

    fn level_between(&self, level: f64, low: f64, high: f64) -> f64 {
        between(level, low, high, self.t.level_softness)
    }
}

impl ArchetypeId {
    /// Raw match score of this archetype against the evidence, in [0, 1].
    ///
    /// Returns 0 when the evidence lacks what the rule needs.
    pub fn score(self, e: &Evidence, t: &Thresholds) -> f64 {
        let b = Bands { t };
        let level = e.last;
        let net = e.net_change;
        let pair = e.delta12.zip(e.delta23);

        let raw = match self {
            Self::AwaitingData => {
                if e.data_years == 0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::StrongStart => level.map_or(0.0, |p| b.level_at_least(p, t.strong_start)),
            Self::SolidStart => {
                level.map_or(0.0, |p| b.level_between(p, t.solid_start, t.strong_start))
            }
            Self::DevelopingStart => level.map_or(0.0, |p| {
                b.level_between(p, t.developing_start, t.solid_start)
            }),
            Self::AtRiskStart => level.map_or(0.0, |p| b.level_at_most(p, t.developing_start)),
            Self::RapidRiser => net.map_or(0.0, |d| b.big_up(d)),
            Self::Improving => net.map_or(0.0, |d| b.gain(d)),
            Self::HoldingSteady => net.map_or(0.0, |d| b.flat(d)),
            Self::Slipping => net.map_or(0.0, |d| b.loss(d)),
            Self::SharpDecline => net.map_or(0.0, |d| b.big_down(d)),
            Self::ConsistentImprover => pair.map_or(0.0, |(d12, d23)| b.up(d12).min(b.up(d23))),
            Self::LateBloomer => pair.map_or(0.0, |(d12, d23)| b.not_up(d12).min(b.big_up(d23))),
            Self::EarlySurge => pair.map_or(0.0, |(d12, d23)| b.big_up(d12).min(b.not_down(d23))),
            Self::SteadyPerformer => match (pair, e.mean) {
                (Some((d12, d23)), Some(mean)) => b
                    .flat(d12)
                    .min(b.flat(d23))
                    .min(b.level_at_least(mean, t.steady_level)),
                _ => 0.0,
            },
            Self::PersistentStruggler => match (pair, e.mean) {
                (Some((d12, d23)), Some(mean)) => b
                    .not_up(d12)
                    .min(b.not_up(d23))
                    .min(b.level_at_most(mean, t.struggling_level)),
                _ => 0.0,
            },
            Self::Rebound => pair.map_or(0.0, |(d12, d23)| b.big_down(d12).min(b.up(d23))),
            Self::LateFade => pair.map_or(0.0, |(d12, d23)| b.not_down(d12).min(b.big_down(d23))),
            Self::Declining => pair.map_or(0.0, |(d12, d23)| {
                let both_down = b.down(d12).min(b.down(d23));
                let overall = e.delta_total.map_or(0.0, |total| b.big_down(total) * 0.9);
                both_down.max(overall)
            }),
            Self::VariableCourse => {
                if pair.is_some() {
                    t.variable_baseline
                } else {
                    0.0
                }
            }
        };

        raw.clamp(0.0, 1.0)
    }
}
