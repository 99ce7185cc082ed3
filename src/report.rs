use std::fmt::Write;

use crate::catalog::ArchetypeCatalog;
use crate::engine::Analysis;
use crate::models::{DriftCause, ResidentProfile};
use crate::trendline::{TrendScope, TrendlineBundle};

fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(value) => format!("{value:+.1}"),
        None => "n/a".to_string(),
    }
}

fn drift_sentence(cause: DriftCause) -> &'static str {
    match cause {
        DriftCause::NewData => "new ITE results changed the classification",
        DriftCause::MethodologyChange => "the classification methodology was updated",
        DriftCause::NewDataAndMethodologyChange => {
            "new ITE results arrived and the methodology was updated"
        }
    }
}

pub fn build_report(
    profile: &ResidentProfile,
    analysis: &Analysis,
    trends: &TrendlineBundle,
    catalog: &ArchetypeCatalog,
) -> String {
    let mut output = String::new();
    let current = &analysis.result.current_classification;

    let _ = writeln!(output, "# ITE Trajectory Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, class of {}) under methodology {}",
        profile.name,
        profile.program,
        profile.class_year,
        catalog.methodology_version()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Classification");

    let status = if current.data_years == 0 {
        "awaiting data"
    } else if current.is_provisional {
        "provisional"
    } else {
        "final"
    };
    let _ = writeln!(
        output,
        "- {} ({}) confidence {:.0}%, risk {}",
        current.archetype_name,
        status,
        current.confidence * 100.0,
        current.risk_level.as_str()
    );
    if let Ok(def) = catalog.definition(current.archetype_id) {
        if !def.description.is_empty() {
            let _ = writeln!(output, "- {}", def.description);
        }
    }
    if let Some(note) = &current.note {
        let _ = writeln!(output, "- {note}");
    }
    if let Some(reason) = &analysis.result.drift_reason {
        let _ = writeln!(
            output,
            "- Version updated: originally {} under {}; {}.",
            reason.previous_archetype_id,
            reason.previous_version,
            drift_sentence(reason.cause)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Scores");

    if analysis.series.is_empty() {
        let _ = writeln!(output, "No ITE percentiles recorded yet.");
    } else {
        for point in analysis.series.points() {
            let _ = writeln!(
                output,
                "- PGY-{}: {:.0}th percentile",
                point.year_index + 1,
                point.percentile
            );
        }
        let evidence = &analysis.evidence;
        let _ = writeln!(
            output,
            "- Change PGY-1→2 {}, PGY-2→3 {}, overall {}",
            format_delta(evidence.delta12),
            format_delta(evidence.delta23),
            format_delta(evidence.delta_total)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alternatives");

    if analysis.result.alternatives.is_empty() {
        let _ = writeln!(output, "No alternative patterns matched.");
    } else {
        for alternative in analysis.result.alternatives.iter().take(3) {
            let _ = writeln!(
                output,
                "- {} ({:.0}%)",
                alternative.archetype_name,
                alternative.confidence * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Similar Residents");

    if analysis.similar.is_empty() {
        let _ = writeln!(output, "No earlier residents share enough exam years.");
    } else {
        for peer in &analysis.similar {
            let archetype = peer
                .archetype
                .and_then(|id| catalog.definition(id).ok())
                .map(|def| def.name.as_str())
                .unwrap_or("unclassified");
            let _ = writeln!(
                output,
                "- {} (class of {}) similarity {:.2}, {}",
                peer.name, peer.class_year, peer.similarity_score, archetype
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trends");

    for trend in &trends.attributes {
        let _ = writeln!(output, "### {}", trend.attribute_key);
        for (scope, label) in [
            (TrendScope::Resident, "Resident"),
            (TrendScope::Class, "Class"),
            (TrendScope::Program, "Program"),
        ] {
            match trend.scope(scope) {
                Some(line) if line.is_trend() => {
                    let _ = writeln!(
                        output,
                        "- {label}: slope {:+.2} per period, intercept {:.1} ({} points)",
                        line.slope, line.intercept, line.point_count
                    );
                }
                Some(_) => {
                    let _ = writeln!(output, "- {label}: single data point, no trend yet");
                }
                None => {
                    let _ = writeln!(output, "- {label}: no data");
                }
            }
        }
    }

    output
}
