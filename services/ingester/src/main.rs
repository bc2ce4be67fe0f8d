//! Forecast ingestion runner.
//!
//! Reads every GRIB2 file in the input directory, combines them along the
//! forecast-step axis and writes the cleaned dataset.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ingestion::{
    init_telemetry, IngestionError, LogFormat, Pipeline, PipelineConfig, RunReport, Stage,
    TelemetryConfig, TelemetryHandle,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Combine forecast GRIB2 files into one cleaned dataset")]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the source files
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Cleaned dataset output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Combined dataset output, written before cleaning
    #[arg(long, conflicts_with = "no_combined")]
    combined_output: Option<PathBuf>,

    /// Skip the combined dataset
    #[arg(long)]
    no_combined: bool,

    /// Directory for transient artifacts
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log level or filter directives
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            level: self.log_level.clone(),
            format: self.log_format,
            ansi: true,
            log_file: self.log_file.clone(),
        }
    }

    /// Command-line flags win over the file and the environment.
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(input) = &self.input {
            config.input_dir = input.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if self.no_combined {
            config.combined_output_path = None;
        } else if let Some(combined) = &self.combined_output {
            config.combined_output_path = Some(combined.clone());
        }
        if let Some(staging) = &self.staging_dir {
            config.staging_dir = Some(staging.clone());
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let telemetry = match init_telemetry(&args.telemetry_config()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("ingester: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&args, telemetry) {
        Ok(report) => {
            info!(
                steps = report.steps(),
                skipped = report.skipped.len(),
                output = %report.output_path.display(),
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let stage = e.downcast_ref::<IngestionError>().map(IngestionError::stage);
            error!(
                stage = stage.map(|s| s.as_str()).unwrap_or("report"),
                error = %format!("{:#}", e),
                "Ingestion failed"
            );
            ExitCode::from(exit_status(stage))
        }
    }
}

fn run(args: &Args, telemetry: TelemetryHandle) -> Result<RunReport> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    info!(
        run_id = %telemetry.run_id(),
        input = %config.input_dir.display(),
        output = %config.output_path.display(),
        staging = %config.staging_dir().display(),
        "Loaded configuration"
    );

    let report = Pipeline::new(config, telemetry)?.run()?;

    if let Some(path) = &args.report {
        write_report(path, &report)?;
        info!(path = %path.display(), "Run report written");
    }
    Ok(report)
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("writing run report to {}", path.display()))
}

/// 2 for configuration problems, 1 for everything else.
fn exit_status(stage: Option<Stage>) -> u8 {
    match stage {
        Some(Stage::Configuration) => 2,
        _ => 1,
    }
}
