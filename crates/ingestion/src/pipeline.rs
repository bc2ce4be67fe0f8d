//! End-to-end ingestion run.
//!
//! discovery → filename parsing → per-file extraction → staging →
//! concatenation → reclamation → cleaning → publication.
//!
//! Per-file failures are recorded in the [`RunReport`] and the run goes on.
//! Run-wide failures return an [`IngestionError`] and nothing is published.

use std::fs;
use std::path::{Path, PathBuf};

use grid_dataset::{publish_dataset, Dataset, ZarrDatasetWriter};
use serde::Serialize;
use tracing::{error, info, info_span, warn};

use crate::aggregate::Aggregator;
use crate::config::PipelineConfig;
use crate::discovery::discover_sources;
use crate::error::{IngestionError, Result, Stage};
use crate::extract::Extractor;
use crate::lifecycle::{ArtifactFs, LifecycleManager, LocalFs, ReclaimOutcome};
use crate::metadata::{parse_source_file, InitializationGroup, SourceFile};
use crate::normalize::{NormalizeSummary, Normalizer};
use crate::telemetry::TelemetryHandle;

/// A file left out of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSkip {
    pub stage: Stage,
    pub path: PathBuf,
    pub reason: String,
}

/// A depth layer missing from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsentDepth {
    pub file: String,
    pub depth_cm: u32,
    pub reason: String,
}

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub discovered: usize,
    /// Files in the output, in step order.
    pub processed: Vec<PathBuf>,
    pub skipped: Vec<FileSkip>,
    pub absent_depths: Vec<AbsentDepth>,
    pub reclaimed: Vec<ReclaimOutcome>,
    pub variables: Vec<String>,
    /// False when the step order is not chronological by valid time.
    pub chronological: bool,
    pub output_path: PathBuf,
    pub combined_output_path: Option<PathBuf>,
    #[serde(skip)]
    pub init_groups: InitializationGroup,
    #[serde(skip)]
    pub cleaning: NormalizeSummary,
}

impl RunReport {
    /// Skipped files at one stage.
    pub fn skipped_at(&self, stage: Stage) -> usize {
        self.skipped.iter().filter(|s| s.stage == stage).count()
    }

    pub fn steps(&self) -> usize {
        self.processed.len()
    }

    /// Artifacts that could not be deleted.
    pub fn leftover_artifacts(&self) -> Vec<&Path> {
        self.reclaimed
            .iter()
            .filter(|o| !o.is_reclaimed())
            .map(|o| o.path.as_path())
            .collect()
    }

    /// Log the run summary at info level. Skips were warned about when they
    /// happened and are listed here again without raising the level.
    pub fn log_summary(&self) {
        for skip in &self.skipped {
            info!(
                stage = %skip.stage,
                file = %skip.path.display(),
                reason = %skip.reason,
                "Skipped file"
            );
        }
        info!(
            run_id = %self.run_id,
            discovered = self.discovered,
            steps = self.steps(),
            skipped = self.skipped.len(),
            skipped_parse = self.skipped_at(Stage::Parse),
            skipped_extraction = self.skipped_at(Stage::Extraction),
            skipped_aggregation = self.skipped_at(Stage::Aggregation),
            absent_depths = self.absent_depths.len(),
            leftover_artifacts = self.leftover_artifacts().len(),
            output = %self.output_path.display(),
            "Ingestion run complete"
        );
    }
}

/// Runs the ingestion pipeline for one configuration.
pub struct Pipeline<F: ArtifactFs = LocalFs> {
    config: PipelineConfig,
    telemetry: TelemetryHandle,
    extractor: Extractor,
    normalizer: Normalizer,
    lifecycle: LifecycleManager<F>,
}

impl Pipeline<LocalFs> {
    pub fn new(config: PipelineConfig, telemetry: TelemetryHandle) -> Result<Self> {
        Self::with_fs(config, telemetry, LocalFs)
    }
}

impl<F: ArtifactFs> Pipeline<F> {
    /// Pipeline reclaiming artifacts through `fs`.
    pub fn with_fs(config: PipelineConfig, telemetry: TelemetryHandle, fs: F) -> Result<Self> {
        config.validate()?;
        let policy = config.reclaim.policy()?;

        Ok(Self {
            extractor: Extractor::new(config.soil_depths_cm.clone()),
            normalizer: Normalizer::new(config.normalize_options()),
            lifecycle: LifecycleManager::new(fs, policy),
            config,
            telemetry,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline once.
    pub fn run(&self) -> Result<RunReport> {
        let span = self.telemetry.run_span();
        let _enter = span.enter();

        match self.run_stages() {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Ingestion run failed");
                Err(e)
            }
        }
    }

    fn run_stages(&self) -> Result<RunReport> {
        let config = &self.config;
        info!(input = %config.input_dir.display(), "Starting ingestion run");

        let paths = discover_sources(&config.input_dir)?;
        info!(files = paths.len(), "Discovered source files");

        let mut skipped = Vec::new();
        let sources = parse_all(&paths, &mut skipped);

        let init_groups = InitializationGroup::from_files(&sources);
        init_groups.log_report();

        let mut aggregator = Aggregator::new(
            &config.staging_dir(),
            &format!("grib-ingest-{}", self.telemetry.short_id()),
            config.store.clone(),
        )?;
        let mut absent_depths = Vec::new();
        let mut processed = Vec::new();

        for source in &sources {
            let file = source.name();
            let _file_span = info_span!("file", file = %file).entered();

            let merged = match self.extractor.extract_file(source) {
                Ok(merged) => merged,
                Err(e) => {
                    warn!(error = %e, "Failed to extract file, skipping");
                    skipped.push(FileSkip {
                        stage: Stage::Extraction,
                        path: source.path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            absent_depths.extend(merged.absent_depths.iter().map(|a| AbsentDepth {
                file: file.clone(),
                depth_cm: a.depth_cm,
                reason: a.reason.clone(),
            }));

            match aggregator.stage(merged) {
                Ok(_) => processed.push(source),
                Err(e) => {
                    warn!(error = %e, "Failed to stage file, skipping");
                    skipped.push(FileSkip {
                        stage: Stage::Aggregation,
                        path: source.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Artifacts are reclaimed whether or not the concatenation succeeded
        let combined = aggregator.combine(sources.len());
        let artifacts: Vec<PathBuf> = aggregator
            .into_artifacts()
            .into_iter()
            .map(|a| a.path)
            .collect();
        let reclaimed = self.lifecycle.reclaim(&artifacts);
        let combined = combined?;

        let chronological = check_chronology(&processed);

        let combined_copy = config.combined_output_path.as_ref().map(|_| combined.clone());
        let (cleaned, cleaning) = self.normalizer.normalize(combined)?;

        self.publish(combined_copy.as_ref(), &cleaned)?;

        let report = RunReport {
            run_id: self.telemetry.run_id().to_string(),
            discovered: paths.len(),
            processed: processed.iter().map(|s| s.path.clone()).collect(),
            skipped,
            absent_depths,
            reclaimed,
            variables: cleaned.variable_names(),
            chronological,
            output_path: config.output_path.clone(),
            combined_output_path: config.combined_output_path.clone(),
            init_groups,
            cleaning,
        };
        report.log_summary();
        Ok(report)
    }

    /// Write the outputs. If the cleaned output fails after the combined
    /// output was written, the combined output is removed again.
    fn publish(&self, combined: Option<&Dataset>, cleaned: &Dataset) -> Result<()> {
        let writer = ZarrDatasetWriter::new(self.config.store.clone());

        let combined_path = match (combined, &self.config.combined_output_path) {
            (Some(dataset), Some(path)) => {
                publish_dataset(&writer, dataset, path).map_err(|source| IngestionError::Output {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), "Combined dataset saved");
                Some(path)
            }
            _ => None,
        };

        let output = &self.config.output_path;
        if let Err(source) = publish_dataset(&writer, cleaned, output) {
            if let Some(path) = combined_path {
                if let Err(e) = fs::remove_dir_all(path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove combined output");
                }
            }
            return Err(IngestionError::Output {
                path: output.clone(),
                source,
            });
        }
        info!(path = %output.display(), "Cleaned dataset saved");
        Ok(())
    }
}

fn parse_all(paths: &[PathBuf], skipped: &mut Vec<FileSkip>) -> Vec<SourceFile> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        match parse_source_file(path) {
            Ok(source) => sources.push(source),
            Err(e) => {
                warn!(file = %path.display(), reason = %e, "Skipping file with unparseable name");
                skipped.push(FileSkip {
                    stage: Stage::Parse,
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    sources
}

/// Warn when the step order is not chronological. Order is never changed.
fn check_chronology(processed: &[&SourceFile]) -> bool {
    let out_of_order = processed
        .windows(2)
        .position(|w| w[1].valid_time < w[0].valid_time);

    match out_of_order {
        Some(i) => {
            warn!(
                earlier = %processed[i].name(),
                later = %processed[i + 1].name(),
                "Step order follows file names and is not chronological by valid time"
            );
            false
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> SourceFile {
        parse_source_file(Path::new(name)).unwrap()
    }

    #[test]
    fn test_parse_all_records_skips() {
        let paths = vec![
            PathBuf::from("m.r.20240115.00z.003h.grib2"),
            PathBuf::from("bad.grib2"),
        ];
        let mut skipped = Vec::new();
        let sources = parse_all(&paths, &mut skipped);

        assert_eq!(sources.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].stage, Stage::Parse);
        assert_eq!(skipped[0].path, PathBuf::from("bad.grib2"));
    }

    #[test]
    fn test_chronology_check() {
        let a = source("m.r.20240115.00z.003h.grib2");
        let b = source("m.r.20240115.00z.006h.grib2");
        let c = source("m.r.20240114.18z.006h.grib2");

        assert!(check_chronology(&[&a, &b]));
        assert!(!check_chronology(&[&b, &c]));
        assert!(check_chronology(&[]));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = PipelineConfig {
            soil_depths_cm: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::new(config, TelemetryHandle::detached()),
            Err(IngestionError::InvalidConfig(_))
        ));
    }
}
