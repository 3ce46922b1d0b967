use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod aggregate;
mod db;
mod error;
mod forecast;
mod import;
mod models;
mod report;
mod rows;
mod sanitize;
mod schema;
mod store;

use crate::db::PgLedger;
use crate::models::{Dashboard, ImportSummary, SimulationStep};
use crate::store::{LedgerStore, MemoryLedger};

#[derive(Parser)]
#[command(name = "attendance-ledger")]
#[command(about = "Weighted attendance ledger with CSV import and what-if forecasts", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    #[arg(long, env = "ATTENDANCE_DB_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    max_connections: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import attendance from a CSV export
    Import {
        #[arg(long, env = "ATTENDANCE_USER")]
        user: String,
        #[arg(long)]
        csv: PathBuf,
        /// Parse and validate against an in-memory ledger without writing to Postgres
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Create a subject (or update an existing one's target)
    AddSubject {
        #[arg(long, env = "ATTENDANCE_USER")]
        user: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        target: Option<f64>,
    },
    /// Delete a subject together with its sessions and logs
    RemoveSubject {
        #[arg(long, env = "ATTENDANCE_USER")]
        user: String,
        #[arg(long)]
        subject: Uuid,
    },
    /// Show weighted attendance per subject and overall
    Dashboard {
        #[arg(long, env = "ATTENDANCE_USER")]
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// Replay a sequence of attend/skip decisions against current attendance
    Forecast {
        #[arg(long, env = "ATTENDANCE_USER")]
        user: String,
        /// JSON array of {"subject_id", "action", "weight"}
        #[arg(long)]
        steps: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown attendance report
    Report {
        #[arg(long, env = "ATTENDANCE_USER")]
        user: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect(cli: &Cli) -> anyhow::Result<PgLedger> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(PgLedger::new(pool))
}

fn print_summary(summary: &ImportSummary) {
    println!(
        "Imported {} records ({} failed) in {} mode.",
        summary.success_count, summary.failed_count, summary.mode
    );
    if !summary.subjects_touched.is_empty() {
        println!("Subjects: {}", summary.subjects_touched.join(", "));
    }
    for warning in &summary.warnings {
        println!("- {warning}");
    }
}

fn print_dashboard(dashboard: &Dashboard) {
    let global = &dashboard.global;
    println!(
        "Overall: {:.1}% ({:.1}h of {:.1}h), {}",
        global.percentage,
        global.attended_hours,
        global.conducted_hours,
        report::describe_advice(&global.advice)
    );

    if dashboard.subjects.is_empty() {
        println!("No subjects recorded yet.");
        return;
    }

    for row in &dashboard.subjects {
        println!(
            "- {} [{}] {:.1}% ({:.1}h of {:.1}h, target {:.0}%), {}",
            row.name,
            row.id,
            row.percentage,
            row.attended_hours,
            row.conducted_hours,
            row.target_percentage,
            report::describe_advice(&row.advice)
        );
    }
}

async fn run_import<S: LedgerStore>(
    store: &S,
    user: &str,
    bytes: &[u8],
    json: bool,
) -> anyhow::Result<()> {
    match import::import_bytes(store, user, bytes, Utc::now().date_naive()).await {
        Ok(summary) if json => println!("{}", serde_json::to_string_pretty(&summary)?),
        Ok(summary) => print_summary(&summary),
        Err(error::Error::EmptyInput) => println!("Nothing to import."),
        Err(err) => return Err(err).context("import rejected"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attendance_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::InitDb => {
            let ledger = connect(&cli).await?;
            db::init_db(ledger.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Import {
            user,
            csv,
            dry_run,
            json,
        } => {
            let bytes = std::fs::read(csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            info!(file = %csv.display(), dry_run, "starting import");

            if *dry_run {
                run_import(&MemoryLedger::new(), user, &bytes, *json).await?;
            } else {
                let ledger = connect(&cli).await?;
                run_import(&ledger, user, &bytes, *json).await?;
            }
        }
        Commands::AddSubject {
            user,
            name,
            code,
            target,
        } => {
            let ledger = connect(&cli).await?;
            let mut subject = ledger
                .get_or_create_subject(user, name, code.as_deref())
                .await?;
            if let Some(target) = target {
                subject = ledger.set_target_percentage(&subject, *target).await?;
            }
            println!(
                "Subject {} ({}) target {:.0}%.",
                subject.name, subject.id, subject.target_percentage
            );
        }
        Commands::RemoveSubject { user, subject } => {
            let ledger = connect(&cli).await?;
            ledger.delete_subject(user, *subject).await?;
            println!("Subject {subject} removed.");
        }
        Commands::Dashboard { user, json } => {
            let ledger = connect(&cli).await?;
            let standings = aggregate::standings(&ledger, user).await?;
            let dashboard = aggregate::dashboard(&standings);

            if *json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print_dashboard(&dashboard);
            }
        }
        Commands::Forecast { user, steps, json } => {
            let raw = std::fs::read(steps)
                .with_context(|| format!("failed to read {}", steps.display()))?;
            let steps: Vec<SimulationStep> =
                serde_json::from_slice(&raw).context("steps file must be a JSON array of steps")?;

            let ledger = connect(&cli).await?;
            let points = forecast::forecast(&ledger, user, &steps).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&points)?);
            } else if points.is_empty() {
                println!("No steps matched a known subject.");
            } else {
                for (index, point) in points.iter().enumerate() {
                    println!(
                        "{}. {} -> subject {:.2}%, overall {:.2}%",
                        index + 1,
                        point.subject_id,
                        point.new_subject_percentage,
                        point.new_global_percentage
                    );
                }
            }
        }
        Commands::Report { user, out } => {
            let ledger = connect(&cli).await?;
            let standings = aggregate::standings(&ledger, user).await?;
            let dashboard = aggregate::dashboard(&standings);
            let report = report::build_report(user, Utc::now().date_naive(), &dashboard);
            std::fs::write(out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
