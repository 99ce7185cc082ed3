//! Postgres access for the CLI. The `trajectory` schema is owned and
//! migrated by the evaluation platform; this module only reads exam data
//! and keeps the first-ever classification per resident.

use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::catalog::ArchetypeId;
use crate::models::{Classification, ExamRecord, ResidentProfile, RiskLevel};

/// Which residents a cohort query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortFilter {
    /// One graduating class within a program.
    Class { program: String, class_year: i32 },
    /// Every class of a program.
    Program { program: String },
    /// Classes of a program that graduated before `class_year`.
    EarlierClasses { program: String, class_year: i32 },
}

impl CohortFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            Self::Class { .. } => "r.program = $1 AND r.class_year = $2",
            Self::Program { .. } => "r.program = $1",
            Self::EarlierClasses { .. } => "r.program = $1 AND r.class_year < $2",
        }
    }

    fn program(&self) -> &str {
        match self {
            Self::Class { program, .. }
            | Self::Program { program }
            | Self::EarlierClasses { program, .. } => program,
        }
    }

    fn class_year(&self) -> Option<i32> {
        match self {
            Self::Class { class_year, .. } | Self::EarlierClasses { class_year, .. } => {
                Some(*class_year)
            }
            Self::Program { .. } => None,
        }
    }
}

fn profile_from_row(row: &PgRow) -> ResidentProfile {
    ResidentProfile {
        id: row.get("id"),
        name: row.get("full_name"),
        class_year: row.get("class_year"),
        program: row.get("program"),
    }
}

fn exam_from_row(row: &PgRow) -> ExamRecord {
    ExamRecord {
        resident_id: row.get("resident_id"),
        period_label: row.get("period_label"),
        percentile: row.get("percentile"),
        raw_score: row.get("raw_score"),
        test_date: row.get("test_date"),
    }
}

pub async fn fetch_resident(pool: &PgPool, resident_id: Uuid) -> anyhow::Result<ResidentProfile> {
    let row = sqlx::query(
        "SELECT id, full_name, class_year, program FROM trajectory.residents WHERE id = $1",
    )
    .bind(resident_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("resident {resident_id} not found"))?;

    Ok(profile_from_row(&row))
}

pub async fn fetch_exam_records(
    pool: &PgPool,
    resident_id: Uuid,
) -> anyhow::Result<Vec<ExamRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT resident_id, period_label, percentile, raw_score, test_date
        FROM trajectory.exam_scores
        WHERE resident_id = $1
        ORDER BY test_date NULLS LAST, period_label
        "#,
    )
    .bind(resident_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(exam_from_row).collect())
}

pub async fn fetch_cohort_profiles(
    pool: &PgPool,
    filter: &CohortFilter,
) -> anyhow::Result<Vec<ResidentProfile>> {
    let query = format!(
        "SELECT r.id, r.full_name, r.class_year, r.program \
         FROM trajectory.residents r WHERE {} ORDER BY r.id",
        filter.where_clause()
    );

    let mut rows = sqlx::query(&query).bind(filter.program());
    if let Some(class_year) = filter.class_year() {
        rows = rows.bind(class_year);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(profile_from_row).collect())
}

pub async fn fetch_cohort_records(
    pool: &PgPool,
    filter: &CohortFilter,
) -> anyhow::Result<Vec<ExamRecord>> {
    let query = format!(
        "SELECT s.resident_id, s.period_label, s.percentile, s.raw_score, s.test_date \
         FROM trajectory.exam_scores s \
         JOIN trajectory.residents r ON r.id = s.resident_id \
         WHERE {} ORDER BY s.resident_id, s.period_label",
        filter.where_clause()
    );

    let mut rows = sqlx::query(&query).bind(filter.program());
    if let Some(class_year) = filter.class_year() {
        rows = rows.bind(class_year);
    }

    let records = rows.fetch_all(pool).await?;
    Ok(records.iter().map(exam_from_row).collect())
}

pub async fn fetch_original_classification(
    pool: &PgPool,
    resident_id: Uuid,
) -> anyhow::Result<Option<Classification>> {
    let row = sqlx::query(
        r#"
        SELECT archetype_id, archetype_name, confidence, risk_level, is_provisional,
               methodology_version, data_years, note
        FROM trajectory.classifications
        WHERE resident_id = $1
        "#,
    )
    .bind(resident_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let archetype_id: String = row.get("archetype_id");
    let risk_level: String = row.get("risk_level");
    let data_years: i16 = row.get("data_years");

    Ok(Some(Classification {
        archetype_id: archetype_id
            .parse::<ArchetypeId>()
            .with_context(|| format!("stored classification for {resident_id}"))?,
        archetype_name: row.get("archetype_name"),
        confidence: row.get("confidence"),
        risk_level: risk_level
            .parse::<RiskLevel>()
            .map_err(anyhow::Error::msg)?,
        is_provisional: row.get("is_provisional"),
        methodology_version: row.get("methodology_version"),
        data_years: u8::try_from(data_years)
            .with_context(|| format!("data_years {data_years} out of range"))?,
        note: row.get("note"),
    }))
}

/// Persists the first classification ever computed for a resident. Later
/// calls leave the stored original untouched and return `false`.
pub async fn store_original_classification(
    pool: &PgPool,
    resident_id: Uuid,
    classification: &Classification,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO trajectory.classifications
        (resident_id, archetype_id, archetype_name, confidence, risk_level, is_provisional,
         methodology_version, data_years, note, classified_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        ON CONFLICT (resident_id) DO NOTHING
        "#,
    )
    .bind(resident_id)
    .bind(classification.archetype_id.as_str())
    .bind(&classification.archetype_name)
    .bind(classification.confidence)
    .bind(classification.risk_level.as_str())
    .bind(classification.is_provisional)
    .bind(&classification.methodology_version)
    .bind(i16::from(classification.data_years))
    .bind(&classification.note)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
