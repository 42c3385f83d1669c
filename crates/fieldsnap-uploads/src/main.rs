//! Fieldsnap Upload - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use fieldsnap_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use fieldsnap_uploads::{
    compression::{Compressor, ImageCompressor, PassthroughCompressor},
    config::Config,
    metadata::PgMetadataRecorder,
    progress::{create_batch_progress, format_summary, update_progress},
    storage::Storage,
    BatchRegistry, PipelineStages,
};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Upload site photos to object storage and index them
#[derive(Parser, Debug)]
#[command(name = "fieldsnap-upload", version, about, long_about = None)]
struct Cli {
    /// Site the photos belong to
    #[arg(short, long, env = "FIELDSNAP_SITE")]
    site: String,

    /// Workflow category (e.g. before, after)
    #[arg(short, long)]
    category: String,

    /// Photos to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print the final batch as JSON instead of a progress bar and summary
    #[arg(long)]
    json: bool,

    /// Upload files unchanged instead of re-encoding them as JPEG
    #[arg(long)]
    no_compress: bool,

    /// Apply database migrations before uploading
    #[arg(long)]
    migrate: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("fieldsnap-upload")
        .filter_directives("fieldsnap_uploads=debug,sqlx=warn,aws_smithy_runtime=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The upload still works without logging
    let _log_guard = init_logging(&log_config).ok();

    // Returned rather than exited so the log guard flushes on drop
    match run(&cli).await {
        Ok(true) => ExitCode::FAILURE,
        Ok(false) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Upload failed");
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        },
    }
}

/// Returns whether any item failed
async fn run(cli: &Cli) -> Result<bool> {
    let config = Config::load()?;

    let compressor: Arc<dyn Compressor> = if cli.no_compress {
        Arc::new(PassthroughCompressor)
    } else {
        Arc::new(ImageCompressor::new(config.compression.clone()))
    };

    let recorder = PgMetadataRecorder::connect(&config.database).await?;
    if cli.migrate {
        recorder.migrate().await?;
        info!("Database migrations completed");
    }

    let stages = PipelineStages {
        compressor,
        store: Arc::new(Storage::new(config.storage.clone())),
        recorder: Arc::new(recorder),
    };
    let registry = BatchRegistry::new(stages, config.pipeline.clone())?;

    let mut changes = registry.changes();
    let batch_id = registry
        .enqueue(&cli.files, &cli.site, &cli.category)
        .context("Invalid upload request")?;

    let pb = if cli.json {
        ProgressBar::hidden()
    } else {
        create_batch_progress(cli.files.len())
    };

    let batch = loop {
        let batch = registry
            .batch(batch_id)
            .context("Batch disappeared before it completed")?;
        update_progress(&pb, &batch);
        if batch.is_complete() {
            break batch;
        }
        changes
            .changed()
            .await
            .context("Upload pipeline stopped before the batch completed")?;
    };
    pb.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        let headline = if batch.has_failures() {
            format!("✗ {}", batch.progress_label()).red().bold()
        } else {
            format!("✓ {}", batch.progress_label()).green().bold()
        };
        println!("{}", headline);
        print!("{}", format_summary(&batch));
        if batch.has_failures() {
            println!("{}", "Re-run with the failed files to retry them.".yellow());
        }
    }

    Ok(batch.has_failures())
}
