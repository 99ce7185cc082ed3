use tracing::info;

use crate::models::{
    AlternativeClassification, Classification, ClassificationResult, DriftCause, DriftReason,
};

/// Compares the persisted original classification with a fresh one.
///
/// No original means nothing to drift from. When the archetypes differ the
/// cause is derived from the two records alone: a different methodology
/// version, a different number of data years, or both. Same years under the
/// same version can only differ because the scores themselves changed,
/// which counts as new data.
pub fn detect_drift(
    original: Option<&Classification>,
    current: &Classification,
) -> Option<DriftReason> {
    let original = original?;
    if original.archetype_id == current.archetype_id {
        return None;
    }

    let methodology_changed = original.methodology_version != current.methodology_version;
    let data_changed = original.data_years != current.data_years;
    let cause = match (data_changed, methodology_changed) {
        (true, true) => DriftCause::NewDataAndMethodologyChange,
        (false, true) => DriftCause::MethodologyChange,
        (_, false) => DriftCause::NewData,
    };

    Some(DriftReason {
        cause,
        previous_archetype_id: original.archetype_id,
        current_archetype_id: current.archetype_id,
        previous_data_years: original.data_years,
        current_data_years: current.data_years,
        previous_version: original.methodology_version.clone(),
        current_version: current.methodology_version.clone(),
    })
}

/// Assembles the result handed to consumers.
///
/// On a first-ever classification the current one doubles as the original.
pub fn build_result(
    original: Option<Classification>,
    current: Classification,
    alternatives: Vec<AlternativeClassification>,
) -> ClassificationResult {
    let drift_reason = detect_drift(original.as_ref(), &current);
    if let Some(reason) = &drift_reason {
        info!(
            event = "classification.drift",
            from = %reason.previous_archetype_id,
            to = %reason.current_archetype_id,
            cause = ?reason.cause,
            from_version = %reason.previous_version,
            to_version = %reason.current_version,
        );
    }

    ClassificationResult {
        original_classification: Some(original.unwrap_or_else(|| current.clone())),
        current_classification: current,
        alternatives,
        has_version_drift: drift_reason.is_some(),
        drift_reason,
    }
}
