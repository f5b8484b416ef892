//! Consolidates quarterly operating indicators of several companies into one
//! workbook, enriched with inflation-discounted metrics.

use anyhow::Error;

pub mod align;
pub mod chart;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod extract;
pub mod format;
pub mod inflation;
pub mod pipeline;
pub mod quarter;
pub mod report;

pub type Result<T> = std::result::Result<T, Error>;

pub use config::{PipelineConfig, ReportLayout, WorkspacePaths};
pub use error::{ArtifactIoError, EnrichmentError, FatalInputError};
pub use pipeline::{Enrichment, LogObserver, Pipeline, ProgressObserver, RunSummary};
