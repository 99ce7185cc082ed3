use std::path::Path;

use serde::Deserialize;

use crate::catalog::ArchetypeCatalog;
use crate::error::{Result, TrajectoryError};
use crate::similarity::SimilarityConfig;
use crate::trendline::PeriodOrdering;

/// Everything the engine reads from configuration rather than requests.
///
/// ```toml
/// [catalog]
/// methodology_version = "trajectory-2025.1"
/// [[catalog.archetypes]]
/// # ...
///
/// [similarity]
/// limit = 3
///
/// [periods]
/// kind = "training_years"
/// years = 3
/// ```
///
/// Every section is optional; absent sections use the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub catalog: ArchetypeCatalog,
    pub similarity: SimilarityConfig,
    pub periods: PeriodOrdering,
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).map_err(|err| TrajectoryError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path).map_err(|err| {
            TrajectoryError::InvalidConfig(format!("{}: {err}", path.display()))
        })?;
        Self::from_toml_str(&input)
    }

    /// Loads `path` when given, built-in defaults otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let similarity = &self.similarity;
        if similarity.limit == 0 {
            return Err(TrajectoryError::InvalidConfig(
                "similarity.limit must be at least 1".to_string(),
            ));
        }
        let adjustments = [
            similarity.archetype_match_bonus,
            similarity.archetype_mismatch_penalty,
        ];
        if adjustments
            .iter()
            .any(|value| !(value.is_finite() && (0.0..=1.0).contains(value)))
        {
            return Err(TrajectoryError::InvalidConfig(
                "similarity adjustments must be within [0, 1]".to_string(),
            ));
        }
        match &self.periods {
            PeriodOrdering::TrainingYears { years } if *years == 0 => Err(
                TrajectoryError::InvalidConfig("periods.years must be at least 1".to_string()),
            ),
            PeriodOrdering::Labels { labels } if labels.is_empty() => Err(
                TrajectoryError::InvalidConfig("periods.labels must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BUILTIN_METHODOLOGY_VERSION;

    #[test]
    fn empty_file_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(
            config.catalog.methodology_version(),
            BUILTIN_METHODOLOGY_VERSION
        );
    }

    #[test]
    fn sections_override_independently() {
        let config = EngineConfig::from_toml_str(
            r#"
[similarity]
limit = 3

[periods]
kind = "labels"
labels = ["PGY1 Fall", "PGY1 Spring", "PGY2 Fall"]
"#,
        )
        .unwrap();
        assert_eq!(config.similarity.limit, 3);
        assert_eq!(config.similarity.min_shared_years, 1);
        assert_eq!(config.periods.index_of("pgy2 fall"), Some(2));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = EngineConfig::from_toml_str("[similarity]\nlimit = 0\n").unwrap_err();
        assert!(matches!(err, TrajectoryError::InvalidConfig(_)));
    }

    #[test]
    fn invalid_catalog_section_is_reported() {
        let err = EngineConfig::from_toml_str(
            "[catalog]\nmethodology_version = \"v2\"\narchetypes = []\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not defined"));
    }

    #[test]
    fn missing_path_resolves_to_defaults() {
        assert_eq!(EngineConfig::resolve(None).unwrap(), EngineConfig::default());
    }
}
