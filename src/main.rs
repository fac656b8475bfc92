use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod config;
mod db;
mod gradebook;
mod index;
mod logging;
mod models;
mod remediation;
mod report;
mod scoring;
mod weights;

use crate::models::ScoreKey;
use crate::remediation::RemediationTrigger;

#[derive(Parser)]
#[command(name = "academic-scoring")]
#[command(
    about = "Stage and cumulative academic indices with remediation tracking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import session and exam scores from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Save a batch of exam scores and open remediation for failing students
    RecordExams {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print stage and cumulative indices
    Score {
        #[arg(long)]
        student: Option<String>,
    },
    /// Generate a markdown transcript for one student
    Report {
        #[arg(long)]
        student: String,
        #[arg(long, default_value = "transcript.md")]
        out: PathBuf,
    },
    /// Close a pending remediation with its remedial score
    CompleteRemediation {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        stage: String,
        #[arg(long)]
        score: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = config::Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_scores(&pool, &csv).await?;
            println!("Imported {inserted} scores from {}.", csv.display());
        }
        Commands::RecordExams { csv } => {
            let exams = db::save_exam_scores(&pool, &csv).await?;
            let book = db::load_gradebook(&pool, None).await?;
            let schedule = db::fetch_schedule(&pool).await?;
            let store = db::PgRemediationStore::new(pool.clone());

            let outcome = RemediationTrigger::new(&store)
                .on_exams_recorded(&book, &exams, &schedule)
                .await;

            println!("Saved {} exam scores.", exams.len());
            println!(
                "{} students require remediation ({} tasks opened).",
                outcome.student_count(),
                outcome.created_count()
            );
            if !outcome.failures.is_empty() {
                anyhow::bail!(
                    "remediation could not be recorded for {} students",
                    outcome.failures.len()
                );
            }
        }
        Commands::Score { student } => {
            let students = db::fetch_students(&pool, student.as_deref()).await?;
            if students.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            let subjects = db::fetch_subjects(&pool).await?;
            let stages = db::fetch_stages(&pool).await?;
            let only = match student {
                Some(_) => students.first().map(|entry| entry.id),
                None => None,
            };
            let book = db::load_gradebook(&pool, only).await?;

            for entry in &students {
                let transcript = index::transcript(&book, entry.id, &stages, &subjects);
                let ipk = transcript
                    .cumulative
                    .as_ref()
                    .map(|cumulative| format!("{:.2}", cumulative.cumulative_index))
                    .unwrap_or_else(|| "n/a".to_string());
                println!("- {} ({}) IPK {}", entry.full_name, entry.student_number, ipk);

                for row in &transcript.stages {
                    match &row.outcome {
                        Ok(stage) => {
                            println!("    {}: IPT {:.2}", row.stage.name, stage.stage_index)
                        }
                        Err(reason) => println!("    {}: {}", row.stage.name, reason),
                    }
                }
            }
        }
        Commands::Report { student, out } => {
            let student = db::find_student(&pool, &student).await?;
            let subjects = db::fetch_subjects(&pool).await?;
            let stages = db::fetch_stages(&pool).await?;
            let book = db::load_gradebook(&pool, Some(student.id)).await?;
            let pending = db::fetch_pending_tasks(&pool, student.id).await?;

            let transcript = index::transcript(&book, student.id, &stages, &subjects);
            let report = report::build_report(&student, &transcript, &stages, &subjects, &pending);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::CompleteRemediation {
            student,
            subject,
            stage,
            score,
        } => {
            let key = ScoreKey {
                student_id: db::find_student(&pool, &student).await?.id,
                subject_id: db::find_subject(&pool, &subject).await?,
                stage_id: db::find_stage(&pool, &stage).await?,
            };

            if db::complete_remediation(&pool, &key, score).await? {
                tracing::info!(
                    student = %student,
                    subject = %subject,
                    stage = %stage,
                    score,
                    "remediation completed"
                );
                println!("Remediation for {student} in {subject} ({stage}) recorded.");
            } else {
                println!("No pending remediation for {student} in {subject} ({stage}).");
            }
        }
    }

    Ok(())
}
