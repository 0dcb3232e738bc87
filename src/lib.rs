//! QC Threshold Tools
//!
//! Pass/fail evaluation of FastQC reports against configurable thresholds.
//!
//! This library provides:
//! - Threshold and run-policy loading from an INI file
//! - FastQC report parsing (archives, extracted directories, bare data files)
//! - Per-sample threshold evaluation with human-readable reasons
//! - Multi-sample JSON summaries

pub mod error;
pub mod evaluate;
pub mod fastqc;
pub mod reporting;
pub mod thresholds;

pub use error::{AggregationError, ConfigError, ParseError};
pub use evaluate::{SampleStatus, ThresholdEvaluator, Verdict};
pub use fastqc::{ModuleStatus, ReportArtifact, SampleMetrics};
pub use reporting::{QcSummary, SampleReport, SummaryAggregator};
pub use thresholds::{ErrorPolicy, QcConfig, RunPolicy, ThresholdConfig};
