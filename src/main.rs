use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use intern_performance::config::{Config, DEFAULT_CONFIG_FILE};
use intern_performance::db::{self, PgRecordStore};
use intern_performance::models::{MetricScore, StudentScore};
use intern_performance::report;
use intern_performance::score;
use intern_performance::store::RecordStore;

#[derive(Parser)]
#[command(name = "intern-performance", version)]
#[command(about = "Performance scoring for interns and students", long_about = None)]
struct Cli {
    /// Config file (defaults to ./intern-performance.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo courses, interns and records
    Seed,
    /// Score one student or every student
    Score {
        /// Student code, e.g. INT001. Scores everyone when omitted.
        #[arg(long)]
        student: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Generate a markdown performance overview
    Report {
        #[arg(long, default_value = "performance-report.md")]
        out: PathBuf,
    },
    /// Show the effective weights and missing-data policy
    Weights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    code: &'a str,
    name: &'a str,
    email: &'a str,
    overall_score: f64,
    category: String,
    attendance: f64,
    task_mark: f64,
    behaviour: f64,
    feedback: f64,
    course_completion: f64,
}

impl<'a> From<&'a StudentScore> for CsvRow<'a> {
    fn from(score: &'a StudentScore) -> Self {
        let b = &score.result.breakdown;
        Self {
            code: &score.student.code,
            name: &score.student.name,
            email: &score.student.email,
            overall_score: score.result.overall_score,
            category: score.result.category.to_string(),
            attendance: b.attendance.value,
            task_mark: b.task_mark.value,
            behaviour: b.behaviour.value,
            feedback: b.feedback.value,
            course_completion: b.course_completion.value,
        }
    }
}

fn describe(metric: &MetricScore) -> String {
    if metric.measured {
        format!("{:.2}", metric.value)
    } else {
        "no data".to_string()
    }
}

fn print_scores(scores: &[StudentScore], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            if scores.is_empty() {
                println!("No students on record.");
                return Ok(());
            }
            println!("Students by performance score:");
            for score in scores {
                let b = &score.result.breakdown;
                println!(
                    "- {} ({}, {}) score {:.2} [{}]",
                    score.student.name,
                    score.student.code,
                    score.student.email,
                    score.result.overall_score,
                    score.result.category
                );
                println!(
                    "    attendance {}, task mark {}, behaviour {}, feedback {}, course completion {}",
                    describe(&b.attendance),
                    describe(&b.task_mark),
                    describe(&b.behaviour),
                    describe(&b.feedback),
                    describe(&b.course_completion)
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(scores)?);
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for score in scores {
                writer.serialize(CsvRow::from(score))?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    Config::load(&path, required).with_context(|| format!("invalid config {}", path.display()))
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intern_performance=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let scoring = &config.scoring;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Score {
            student,
            format,
            limit,
        } => {
            let store = PgRecordStore::new(connect(&config).await?);
            let mut scores = match student {
                Some(code) => {
                    let student = store
                        .find_student(&code)
                        .await?
                        .with_context(|| format!("no student with code {code}"))?;
                    let result = score::score_student(
                        &store,
                        &student,
                        &scoring.weights,
                        scoring.missing_data,
                    )
                    .await?;
                    vec![StudentScore { student, result }]
                }
                None => {
                    score::score_all(
                        &store,
                        &scoring.weights,
                        scoring.missing_data,
                        scoring.parallelism,
                    )
                    .await?
                }
            };
            if let Some(limit) = limit {
                scores.truncate(limit);
            }
            print_scores(&scores, format)?;
        }
        Commands::Report { out } => {
            let store = PgRecordStore::new(connect(&config).await?);
            let scores = score::score_all(
                &store,
                &scoring.weights,
                scoring.missing_data,
                scoring.parallelism,
            )
            .await?;
            let report = report::build_report(
                chrono::Utc::now().date_naive(),
                &scoring.weights,
                scoring.missing_data,
                &scores,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Weights => {
            let w = &scoring.weights;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "attendance         {:.2}", w.attendance)?;
            writeln!(stdout, "task_mark          {:.2}", w.task_mark)?;
            writeln!(stdout, "behaviour          {:.2}", w.behaviour)?;
            writeln!(stdout, "feedback           {:.2}", w.feedback)?;
            writeln!(stdout, "course_completion  {:.2}", w.course_completion)?;
            writeln!(stdout, "total              {:.2}", w.sum())?;
            writeln!(stdout, "missing data       {}", scoring.missing_data)?;
        }
    }

    Ok(())
}
