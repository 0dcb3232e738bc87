//! Threshold evaluation
//!
//! Turns extracted metrics into a PASS/FAIL verdict. Every rule runs; the
//! reasons list holds one entry per violated bound, in rule order:
//! read count, GC content, adapter content, then any gated module flags.

use crate::fastqc::{ModuleStatus, SampleMetrics};
use crate::thresholds::ThresholdConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome assigned to one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SampleStatus {
    Pass,
    Fail,
    /// Report could not be parsed
    Error,
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: SampleStatus,
    pub reasons: Vec<String>,
}

impl Verdict {
    fn from_reasons(reasons: Vec<String>) -> Self {
        let status = if reasons.is_empty() {
            SampleStatus::Pass
        } else {
            SampleStatus::Fail
        };
        Self { status, reasons }
    }

    /// Verdict for a sample whose report failed to parse
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SampleStatus::Error,
            reasons: vec![message.into()],
        }
    }
}

/// Applies a threshold set to sample metrics
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    pub thresholds: ThresholdConfig,
    /// Modules whose FAIL flag fails the sample; empty disables the rule
    pub fail_on_modules: Vec<String>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self {
            thresholds,
            fail_on_modules: Vec::new(),
        }
    }

    pub fn with_module_gate(mut self, modules: Vec<String>) -> Self {
        self.fail_on_modules = modules;
        self
    }

    /// Evaluate one sample
    pub fn evaluate(&self, metrics: &SampleMetrics) -> Verdict {
        let t = &self.thresholds;
        let mut reasons = Vec::new();

        if metrics.total_sequences < t.min_reads {
            reasons.push(format!(
                "read count {} below minimum {}",
                metrics.total_sequences, t.min_reads
            ));
        }

        if metrics.gc_content < t.min_gc || metrics.gc_content > t.max_gc {
            reasons.push(format!(
                "GC content {}% outside [{}, {}]",
                format_number(metrics.gc_content),
                format_number(t.min_gc),
                format_number(t.max_gc)
            ));
        }

        if metrics.adapter_content_max > t.max_adapter_content {
            reasons.push(format!(
                "adapter content {}% exceeds {}%",
                format_number(metrics.adapter_content_max),
                format_number(t.max_adapter_content)
            ));
        }

        for gated in &self.fail_on_modules {
            let failed = metrics
                .module_flags
                .iter()
                .any(|(name, status)| name.eq_ignore_ascii_case(gated) && *status == ModuleStatus::Fail);
            if failed {
                reasons.push(format!("module '{}' reported FAIL", gated));
            }
        }

        Verdict::from_reasons(reasons)
    }
}

/// Evaluate with the numeric rules only
pub fn evaluate(metrics: &SampleMetrics, thresholds: &ThresholdConfig) -> Verdict {
    ThresholdEvaluator::new(*thresholds).evaluate(metrics)
}

/// Whole numbers keep one decimal place: `80.0`, `45.5`, `0.25`
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
