//! Error types for threshold checking
//!
//! Three classes, matching how far a failure reaches:
//! - [`ConfigError`]: the threshold configuration is unusable; nothing runs
//! - [`ParseError`]: one FastQC report is unreadable or malformed
//! - [`AggregationError`]: the batch as a whole cannot produce a summary

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the INI threshold configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed INI line
    #[error("config syntax error at line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    /// Required section is absent
    #[error("config is missing the [{0}] section")]
    MissingSection(String),

    /// Required key is absent from its section
    #[error("config section [{section}] is missing required key '{key}'")]
    MissingKey { section: String, key: String },

    /// Value present but not usable
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// GC bounds are inverted
    #[error("min_gc ({min_gc}) is greater than max_gc ({max_gc})")]
    GcRangeInverted { min_gc: f64, max_gc: f64 },
}

/// Errors raised while parsing a single FastQC report
#[derive(Debug, Error)]
pub enum ParseError {
    /// Report artifact could not be opened or read
    #[error("cannot read report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// FastQC archive is corrupt or truncated
    #[error("cannot open FastQC archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Archive has no fastqc_data.txt member
    #[error("no fastqc_data.txt found in {0}")]
    MissingDataFile(PathBuf),

    /// A module every report must carry is absent
    #[error("report is missing the '{0}' module")]
    MissingModule(String),

    /// A module was opened but never closed
    #[error("module '{0}' is truncated (no >>END_MODULE)")]
    TruncatedModule(String),

    /// A required row is absent from its module
    #[error("module '{module}' has no '{field}' row")]
    MissingField { module: String, field: String },

    /// A required row did not parse as the expected number
    #[error("invalid value '{value}' for '{field}': {reason}")]
    InvalidNumber {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors that abort the whole summary run
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Input directory is missing or cannot be listed
    #[error("cannot read report directory {path}: {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input path exists but is not a directory
    #[error("report path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Nothing that looks like a FastQC report was found
    #[error("no FastQC reports found in {0}")]
    NoReports(PathBuf),

    /// Per-sample parse failure under the abort policy
    #[error("sample '{sample_id}' failed to parse")]
    SampleFailed {
        sample_id: String,
        #[source]
        source: ParseError,
    },

    /// Worker pool could not be created
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Summary could not be serialized
    #[error("cannot serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Summary could not be written or moved into place
    #[error("cannot write summary to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
