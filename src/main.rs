use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod artifact;
mod dataset;
mod encoder;
mod error;
mod insights;
mod models;
mod pipeline;
mod report;
mod risk;
mod train;

use insights::GroupColumn;
use artifact::ModelArtifact;
use pipeline::{Pipeline, PredictionRequest, PredictionResponse};

#[derive(Parser)]
#[command(name = "edupredict")]
#[command(about = "Student exam score prediction and risk screening", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model on labelled historical data
    Train {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, env = "EDUPREDICT_MODEL", default_value = "model.json")]
        out: PathBuf,
        #[arg(long, default_value_t = 0.2)]
        test_ratio: f32,
    },
    /// Predict scores for a batch and export them as CSV
    Predict {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, env = "EDUPREDICT_MODEL", default_value = "model.json")]
        model: PathBuf,
        #[arg(long, default_value = "predictions.csv")]
        out: PathBuf,
        /// Only export students scoring below this value
        #[arg(long)]
        below: Option<f64>,
        /// Print mean score per value of this column
        #[arg(long)]
        group_by: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report for a batch
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, env = "EDUPREDICT_MODEL", default_value = "model.json")]
        model: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = risk::AT_RISK_BELOW)]
        at_risk_below: f64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write a demonstration batch
    Sample {
        #[arg(long, default_value = "sample.csv")]
        out: PathBuf,
        /// Include Final_Exam_Score so the file can be used for training
        #[arg(long)]
        labelled: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            out,
            test_ratio,
        } => {
            let rows = dataset::read_training(&data)
                .with_context(|| format!("failed to read training data {}", data.display()))?;
            let outcome = train::train(&rows, test_ratio).context("model training failed")?;
            outcome.artifact.save(&out)?;

            if let Some(metrics) = &outcome.artifact.metrics {
                println!("Model evaluation:");
                println!("R² score: {:.2}", metrics.r2);
                println!("RMSE: {:.2}", metrics.rmse);
            }
            println!();
            println!("Students predicted to score below {}:", risk::AT_RISK_BELOW);
            for (id, score) in &outcome.at_risk {
                println!("- {id} {score:.2}");
            }
            println!("Model {} saved to {}.", outcome.artifact.model_id, out.display());
        }
        Commands::Predict {
            csv,
            model,
            out,
            below,
            group_by,
            limit,
        } => {
            let group_by = group_by
                .as_deref()
                .map(str::parse::<GroupColumn>)
                .transpose()?;
            let artifact = load_model(&model)?;
            let (batch, response) = score_file(&artifact, &csv)?;

            if batch.is_empty() {
                println!("No students found in {}.", csv.display());
                return Ok(());
            }

            let summary = response.insights()?;
            println!(
                "Scored {} students, average predicted score {:.2}.",
                summary.total, summary.mean
            );
            for bucket in &summary.buckets {
                println!(
                    "- {} {}: {} ({:.1}%)",
                    bucket.bucket.marker(),
                    bucket.bucket.label(),
                    bucket.count,
                    bucket.percentage
                );
            }

            if let Some(column) = group_by {
                println!("Mean score by {column}:");
                for group in insights::group_means(&response.scored, column)? {
                    println!("- {}: {:.2} across {} students", group.value, group.mean, group.count);
                }
            }

            let at_risk = response.at_risk(risk::AT_RISK_BELOW);
            if !at_risk.is_empty() {
                println!("Students needing support:");
                for student in at_risk.iter().take(limit) {
                    println!(
                        "- {} {} score {:.1} ({})",
                        student.marker(),
                        student.student.student_id,
                        student.predicted_score,
                        student.risk
                    );
                }
            }

            let written =
                dataset::write_predictions_to_path(&out, &batch, &response.scored, below)
                    .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Wrote {written} rows to {}.", out.display());
        }
        Commands::Report {
            csv,
            model,
            out,
            at_risk_below,
            limit,
        } => {
            let artifact = load_model(&model)?;
            let (_, response) = score_file(&artifact, &csv)?;
            let source = csv.display().to_string();
            let report =
                report::build_report(&source, chrono::Utc::now(), &response, at_risk_below, limit)?;
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Sample { out, labelled } => {
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let rows = dataset::write_sample(file, labelled)?;
            println!("Wrote {rows} sample students to {}.", out.display());
        }
    }

    Ok(())
}

/// Loads the artifact once; every prediction in the run borrows it.
fn load_model(path: &std::path::Path) -> anyhow::Result<ModelArtifact> {
    let artifact = ModelArtifact::load(path)?;
    artifact.ensure_schema(&models::FEATURE_COLUMNS)?;
    Ok(artifact)
}

fn score_file(
    artifact: &ModelArtifact,
    csv: &std::path::Path,
) -> anyhow::Result<(dataset::StudentBatch, PredictionResponse)> {
    let batch = dataset::read_students(csv)
        .with_context(|| format!("failed to read students from {}", csv.display()))?;
    let request = PredictionRequest {
        students: batch.records.clone(),
    };
    let response = Pipeline::new(artifact).run(request)?;
    info!(rows = response.scored.len(), "prediction complete");
    Ok((batch, response))
}
