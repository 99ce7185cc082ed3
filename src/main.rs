use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use residency_trajectory::db::{self, CohortFilter};
use residency_trajectory::{
    report, Analysis, EngineConfig, ResidentProfile, TrajectoryEngine, TrendlineBundle,
};

#[derive(Parser)]
#[command(name = "residency-trajectory")]
#[command(about = "ITE trajectory classification and cohort trendlines for residents", long_about = None)]
struct Cli {
    /// Engine configuration (catalog, similarity, periods) in TOML
    #[arg(long, global = true, env = "TRAJECTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the active archetype catalog
    Catalog,
    /// Classify a resident and report drift from the original classification
    Classify {
        #[arg(long)]
        resident: Uuid,
        /// Store the classification if none has been persisted yet
        #[arg(long)]
        persist: bool,
    },
    /// Rank earlier residents of the same program by trajectory similarity
    Similar {
        #[arg(long)]
        resident: Uuid,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Fit resident, class and program trendlines
    Trends {
        #[arg(long)]
        resident: Uuid,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        resident: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the evaluation data store")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn analyze_resident(
    pool: &PgPool,
    engine: &TrajectoryEngine,
    resident: Uuid,
) -> anyhow::Result<(ResidentProfile, Analysis)> {
    let profile = db::fetch_resident(pool, resident).await?;
    let records = db::fetch_exam_records(pool, resident).await?;
    let original = db::fetch_original_classification(pool, resident).await?;

    let peers = CohortFilter::EarlierClasses {
        program: profile.program.clone(),
        class_year: profile.class_year,
    };
    let peer_profiles = db::fetch_cohort_profiles(pool, &peers).await?;
    let peer_records = db::fetch_cohort_records(pool, &peers).await?;
    let corpus = engine.build_corpus(&peer_profiles, &peer_records);

    let analysis = engine
        .analyze(resident, &records, original, &corpus)
        .with_context(|| format!("failed to classify resident {resident}"))?;
    Ok((profile, analysis))
}

async fn fetch_trends(
    pool: &PgPool,
    engine: &TrajectoryEngine,
    profile: &ResidentProfile,
) -> anyhow::Result<TrendlineBundle> {
    let records = db::fetch_exam_records(pool, profile.id).await?;
    let class = db::fetch_cohort_records(
        pool,
        &CohortFilter::Class {
            program: profile.program.clone(),
            class_year: profile.class_year,
        },
    )
    .await?;
    let program = db::fetch_cohort_records(
        pool,
        &CohortFilter::Program {
            program: profile.program.clone(),
        },
    )
    .await?;

    engine
        .trendlines(&records, &class, &program)
        .context("failed to fit trendlines")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = EngineConfig::resolve(cli.config.as_deref())
        .context("failed to load engine configuration")?;
    if let Commands::Similar {
        limit: Some(limit), ..
    } = &cli.command
    {
        config.similarity.limit = (*limit).max(1);
    }
    let engine = TrajectoryEngine::new(config);

    match cli.command {
        Commands::Catalog => {
            println!("{}", serde_json::to_string_pretty(engine.catalog().as_ref())?);
        }
        Commands::Classify { resident, persist } => {
            let pool = connect().await?;
            let (_, analysis) = analyze_resident(&pool, &engine, resident).await?;

            if persist {
                let stored = db::store_original_classification(
                    &pool,
                    resident,
                    &analysis.result.current_classification,
                )
                .await?;
                tracing::info!(event = "classification.persisted", resident_id = %resident, stored);
            }

            println!("{}", serde_json::to_string_pretty(&analysis.result)?);
        }
        Commands::Similar { resident, .. } => {
            let pool = connect().await?;
            let (_, analysis) = analyze_resident(&pool, &engine, resident).await?;

            if analysis.similar.is_empty() {
                println!("No earlier residents share exam years with this resident.");
                return Ok(());
            }

            println!("Most similar residents:");
            for peer in &analysis.similar {
                println!(
                    "- {} (class of {}) similarity {:.2} across {} years",
                    peer.name, peer.class_year, peer.similarity_score, peer.shared_years
                );
            }
        }
        Commands::Trends { resident } => {
            let pool = connect().await?;
            let profile = db::fetch_resident(&pool, resident).await?;
            let trends = fetch_trends(&pool, &engine, &profile).await?;
            println!("{}", serde_json::to_string_pretty(&trends)?);
        }
        Commands::Report { resident, out } => {
            let pool = connect().await?;
            let (profile, analysis) = analyze_resident(&pool, &engine, resident).await?;
            let trends = fetch_trends(&pool, &engine, &profile).await?;
            let report = report::build_report(&profile, &analysis, &trends, &engine.catalog());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
