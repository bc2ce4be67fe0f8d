//! Forecast GRIB2 ingestion pipeline.
//!
//! Turns a directory of forecast files into one cleaned dataset with a
//! forecast-step axis.
//!
//! # Architecture
//!
//! - [`metadata`]: initialization time and step from file names
//! - [`discovery`]: source listing in lexicographic order
//! - [`extract`]: main layer plus soil-depth layers per file
//! - [`aggregate`]: transient Zarr artifacts and step concatenation
//! - [`normalize`]: sentinel cleaning, longitude wrapping, renames
//! - [`lifecycle`]: release and bounded-retry deletion of artifacts
//! - [`pipeline`]: the run itself and its [`RunReport`]
//!
//! # Example
//!
//! ```ignore
//! use ingestion::{Pipeline, PipelineConfig, TelemetryHandle};
//!
//! let report = Pipeline::new(PipelineConfig::default(), TelemetryHandle::detached())?.run()?;
//! println!("{} steps", report.steps());
//! ```

pub mod aggregate;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod lifecycle;
pub mod metadata;
pub mod normalize;
pub mod pipeline;
pub mod telemetry;

// Re-exports
pub use aggregate::{Aggregator, TransientArtifact};
pub use config::{PipelineConfig, ReclaimConfig, DEFAULT_SOIL_DEPTHS_CM};
pub use discovery::discover_sources;
pub use error::{CleaningError, IngestionError, Result, Stage};
pub use extract::{
    AbsentLayer, ExtractError, ExtractKind, Extractor, FileMergedResult, LayerExtract,
    LayerOutcome,
};
pub use lifecycle::{
    is_lock_error, ArtifactFs, LifecycleManager, LocalFs, ReclaimOutcome, ReclaimStatus,
    RetryPolicy,
};
pub use metadata::{
    detect_file_type, parse_source_file, FileType, FilenameError, InitializationGroup,
    SourceFile,
};
pub use normalize::{canonical_longitude, NormalizeOptions, NormalizeSummary, Normalizer};
pub use pipeline::{AbsentDepth, FileSkip, Pipeline, RunReport};
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig, TelemetryError, TelemetryHandle};
