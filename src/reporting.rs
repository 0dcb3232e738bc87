//! Multi-sample QC summary
//!
//! Finds every FastQC report in a directory, parses and evaluates each one,
//! and writes a single JSON summary keyed by sample id.

use crate::error::{AggregationError, ParseError};
use crate::evaluate::{SampleStatus, ThresholdEvaluator, Verdict};
use crate::fastqc::{self, ReportArtifact, SampleMetrics};
use crate::thresholds::{ErrorPolicy, QcConfig, RunPolicy, ThresholdConfig};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Per-sample entry of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReport {
    /// `None` when the report could not be parsed
    pub metrics: Option<SampleMetrics>,
    pub status: SampleStatus,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SampleReport {
    fn evaluated(mut metrics: SampleMetrics, verdict: Verdict) -> Self {
        let notes = std::mem::take(&mut metrics.notes);
        Self {
            metrics: Some(metrics),
            status: verdict.status,
            reasons: verdict.reasons,
            notes,
        }
    }

    fn failed(err: &ParseError) -> Self {
        let verdict = Verdict::error(err.to_string());
        Self {
            metrics: None,
            status: verdict.status,
            reasons: verdict.reasons,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub total_samples: usize,
    pub passed_samples: usize,
    pub failed_samples: usize,
    pub error_samples: usize,
    pub pass_rate: f64,
}

impl SummaryCounts {
    fn tally<'a>(reports: impl Iterator<Item = &'a SampleReport>) -> Self {
        let (mut total, mut passed, mut failed, mut errors) = (0usize, 0usize, 0usize, 0usize);
        for report in reports {
            total += 1;
            match report.status {
                SampleStatus::Pass => passed += 1,
                SampleStatus::Fail => failed += 1,
                SampleStatus::Error => errors += 1,
            }
        }

        let pass_rate = if total > 0 {
            (passed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self {
            total_samples: total,
            passed_samples: passed,
            failed_samples: failed,
            error_samples: errors,
            pass_rate,
        }
    }
}

/// The document written at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcSummary {
    pub generated_at: DateTime<Utc>,
    pub summary: SummaryCounts,
    /// Sorted by sample id
    pub samples: BTreeMap<String, SampleReport>,
}

/// Runs parsing and evaluation over a report directory
#[derive(Debug, Clone)]
pub struct SummaryAggregator {
    pub thresholds: ThresholdConfig,
    pub policy: RunPolicy,
}

impl SummaryAggregator {
    pub fn new(config: QcConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            policy: config.policy,
        }
    }

    pub fn with_policy(thresholds: ThresholdConfig, policy: RunPolicy) -> Self {
        Self { thresholds, policy }
    }

    /// Load thresholds and policy from an INI file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self, AggregationError> {
        let config = QcConfig::from_file(path)?;
        Ok(Self::new(config))
    }

    /// Evaluate every report in `report_dir` and build the summary
    pub fn generate_summary<P: AsRef<Path>>(
        &self,
        report_dir: P,
    ) -> Result<QcSummary, AggregationError> {
        let report_dir = report_dir.as_ref();
        let artifacts = discover_reports(report_dir)?;
        if artifacts.is_empty() {
            return Err(AggregationError::NoReports(report_dir.to_path_buf()));
        }
        info!(
            "Found {} FastQC reports in {}",
            artifacts.len(),
            report_dir.display()
        );

        let evaluator = ThresholdEvaluator::new(self.thresholds)
            .with_module_gate(self.policy.fail_on_modules.clone());

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.policy.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        // collect() keeps discovery order, whatever order workers finish in
        let outcomes: Vec<(String, Result<SampleReport, ParseError>)> = pool.install(|| {
            artifacts
                .par_iter()
                .map(|artifact| {
                    let outcome = fastqc::parse_report(artifact).map(|metrics| {
                        let verdict = evaluator.evaluate(&metrics);
                        SampleReport::evaluated(metrics, verdict)
                    });
                    (artifact.sample_id.clone(), outcome)
                })
                .collect()
        });

        let mut samples = BTreeMap::new();
        for (sample_id, outcome) in outcomes {
            let report = match outcome {
                Ok(report) => {
                    debug!("{}: {}", sample_id, report.status);
                    report
                }
                Err(source) if self.policy.on_parse_error == ErrorPolicy::Abort => {
                    return Err(AggregationError::SampleFailed { sample_id, source });
                }
                Err(err) => {
                    warn!("{}: recorded as ERROR: {}", sample_id, err);
                    SampleReport::failed(&err)
                }
            };
            samples.insert(sample_id, report);
        }

        Ok(QcSummary {
            generated_at: Utc::now(),
            summary: SummaryCounts::tally(samples.values()),
            samples,
        })
    }

    /// Write the summary as pretty JSON, replacing `path` atomically
    pub fn export_json<P: AsRef<Path>>(
        &self,
        summary: &QcSummary,
        path: P,
    ) -> Result<(), AggregationError> {
        let path = path.as_ref();
        let write_err = |source: std::io::Error| AggregationError::Write {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let mut json_content = serde_json::to_string_pretty(summary)?;
        json_content.push('\n');

        // Temp file lives next to the target so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(json_content.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        info!("Wrote QC summary to {}", path.display());
        Ok(())
    }

    /// Generate the summary for `report_dir` and write it to `output`.
    /// Nothing is written if generation fails.
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        report_dir: P,
        output: Q,
    ) -> Result<QcSummary, AggregationError> {
        let summary = self.generate_summary(report_dir)?;
        self.export_json(&summary, output)?;
        Ok(summary)
    }
}

/// List FastQC reports directly inside `dir`, sorted by sample id.
/// When several artifacts share a sample id, the first by file name wins.
pub fn discover_reports<P: AsRef<Path>>(dir: P) -> Result<Vec<ReportArtifact>, AggregationError> {
    let dir = dir.as_ref();
    let dir_err = |source: std::io::Error| AggregationError::InputDir {
        path: dir.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(dir).map_err(dir_err)?;
    if !metadata.is_dir() {
        return Err(AggregationError::NotADirectory(dir.to_path_buf()));
    }

    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(dir_err)? {
        let path = entry.map_err(dir_err)?.path();
        match ReportArtifact::recognize(&path, path.is_dir()) {
            Some(artifact) => artifacts.push(artifact),
            None => debug!("Skipping {}", path.display()),
        }
    }

    artifacts.sort_by(|a, b| a.file_name().cmp(b.file_name()));

    let mut seen = HashSet::new();
    artifacts.retain(|artifact| {
        let first = seen.insert(artifact.sample_id.clone());
        if !first {
            warn!(
                "Ignoring {}: sample '{}' already has a report",
                artifact.path.display(),
                artifact.sample_id
            );
        }
        first
    });

    artifacts.sort_by(|a, b| a.sample_id.cmp(&b.sample_id));
    Ok(artifacts)
}
