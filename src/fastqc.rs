//! FastQC report parsing
//!
//! Extracts the metrics used for threshold checks from `fastqc_data.txt`,
//! whether it sits inside a `_fastqc.zip` archive, an extracted `_fastqc/`
//! directory, or a bare `_fastqc_data.txt` file.
//!
//! The data file is a sequence of modules:
//!
//! ```text
//! >>Basic Statistics	pass
//! #Measure	Value
//! Total Sequences	150000
//! %GC	48
//! >>END_MODULE
//! ```
//!
//! Values are located by module heading and row label, never by line offset.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ARCHIVE_SUFFIX: &str = "_fastqc.zip";
pub const DIRECTORY_SUFFIX: &str = "_fastqc";
pub const DATA_FILE_SUFFIX: &str = "_fastqc_data.txt";
pub const DATA_FILE_NAME: &str = "fastqc_data.txt";

pub const BASIC_STATISTICS: &str = "Basic Statistics";
pub const ADAPTER_CONTENT: &str = "Adapter Content";

const END_MODULE: &str = ">>END_MODULE";

/// Outcome FastQC reports for each of its modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleStatus {
    Pass,
    Warn,
    Fail,
}

impl FromStr for ModuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unrecognized module status '{}'", other)),
        }
    }
}

/// Metrics extracted from one FastQC report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMetrics {
    #[serde(skip)]
    pub sample_id: String,
    pub total_sequences: u64,
    pub gc_content: f64,
    /// Highest adapter percentage at any position for any adapter type
    pub adapter_content_max: f64,
    /// Per-module status, keyed by module name as written in the report
    pub module_flags: BTreeMap<String, ModuleStatus>,
    /// Non-failing observations made while parsing
    #[serde(skip)]
    pub notes: Vec<String>,
}

/// Layout a report was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Archive,
    Directory,
    DataFile,
}

/// A FastQC report located on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub sample_id: String,
    pub path: PathBuf,
    pub kind: ReportKind,
}

impl ReportArtifact {
    /// Recognize a directory entry as a FastQC report by its name.
    /// Returns `None` for anything that is not one.
    pub fn recognize(path: &Path, is_dir: bool) -> Option<Self> {
        let name = path.file_name()?.to_str()?;

        let (stem, kind) = if is_dir {
            (name.strip_suffix(DIRECTORY_SUFFIX)?, ReportKind::Directory)
        } else if let Some(stem) = name.strip_suffix(ARCHIVE_SUFFIX) {
            (stem, ReportKind::Archive)
        } else {
            (name.strip_suffix(DATA_FILE_SUFFIX)?, ReportKind::DataFile)
        };

        if stem.is_empty() {
            return None;
        }

        Some(Self {
            sample_id: stem.to_string(),
            path: path.to_path_buf(),
            kind,
        })
    }

    /// File name used for ordering during discovery
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Read and parse the report behind an artifact
pub fn parse_report(artifact: &ReportArtifact) -> Result<SampleMetrics, ParseError> {
    let text = read_report_text(artifact)?;
    parse_report_text(&artifact.sample_id, &text)
}

/// Load the raw `fastqc_data.txt` content for an artifact
pub fn read_report_text(artifact: &ReportArtifact) -> Result<String, ParseError> {
    match artifact.kind {
        ReportKind::DataFile => read_lossy(&artifact.path),
        ReportKind::Directory => read_lossy(&artifact.path.join(DATA_FILE_NAME)),
        ReportKind::Archive => read_archive_member(&artifact.path),
    }
}

fn read_lossy(path: &Path) -> Result<String, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_archive_member(path: &Path) -> Result<String, ParseError> {
    let io_err = |source: std::io::Error| ParseError::Io {
        path: path.to_path_buf(),
        source,
    };
    let archive_err = |source: zip::result::ZipError| ParseError::Archive {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;

    let member = archive
        .file_names()
        .find(|name| name.ends_with(DATA_FILE_NAME))
        .map(str::to_string)
        .ok_or_else(|| ParseError::MissingDataFile(path.to_path_buf()))?;

    let mut entry = archive.by_name(&member).map_err(archive_err)?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).map_err(io_err)?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// One `>>Name<TAB>status` ... `>>END_MODULE` block
#[derive(Debug)]
struct Module<'a> {
    name: &'a str,
    status: &'a str,
    rows: Vec<&'a str>,
    closed: bool,
}

impl<'a> Module<'a> {
    /// Rows that are not `#` column headers
    fn data_rows(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.rows.iter().copied().filter(|row| !row.starts_with('#'))
    }

    /// Value column of the first row labelled `label`
    fn field(&self, label: &str) -> Option<&'a str> {
        self.data_rows().find_map(|row| {
            let (key, value) = row.split_once('\t')?;
            (key.trim() == label).then(|| value.trim())
        })
    }
}

fn split_modules(text: &str) -> Vec<Module<'_>> {
    let mut modules = Vec::new();
    let mut current: Option<Module> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with(END_MODULE) {
            if let Some(mut module) = current.take() {
                module.closed = true;
                modules.push(module);
            }
            continue;
        }

        if let Some(header) = line.strip_prefix(">>") {
            // A new heading before END_MODULE leaves the previous module open
            if let Some(module) = current.take() {
                modules.push(module);
            }
            let (name, status) = header.split_once('\t').unwrap_or((header, ""));
            current = Some(Module {
                name: name.trim(),
                status: status.trim(),
                rows: Vec::new(),
                closed: false,
            });
            continue;
        }

        if let Some(module) = current.as_mut() {
            module.rows.push(line);
        }
    }

    if let Some(module) = current.take() {
        modules.push(module);
    }

    modules
}

/// Parse `fastqc_data.txt` content into metrics for `sample_id`
pub fn parse_report_text(sample_id: &str, text: &str) -> Result<SampleMetrics, ParseError> {
    let modules = split_modules(text);
    let mut notes = Vec::new();

    let basic = modules
        .iter()
        .find(|m| m.name == BASIC_STATISTICS)
        .ok_or_else(|| ParseError::MissingModule(BASIC_STATISTICS.to_string()))?;
    if !basic.closed {
        return Err(ParseError::TruncatedModule(BASIC_STATISTICS.to_string()));
    }

    let total_raw = required_field(basic, "Total Sequences")?;
    let total_sequences = total_raw
        .parse::<u64>()
        .map_err(|e| invalid_number("Total Sequences", total_raw, e))?;

    let gc_raw = required_field(basic, "%GC")?;
    let gc_content = gc_raw
        .parse::<f64>()
        .map_err(|e| invalid_number("%GC", gc_raw, e))?;
    if !(0.0..=100.0).contains(&gc_content) {
        return Err(invalid_number("%GC", gc_raw, "must be between 0 and 100"));
    }

    let adapter_content_max = adapter_content_max(&modules, &mut notes);

    let mut module_flags = BTreeMap::new();
    for module in &modules {
        if !module.closed {
            notes.push(format!("module '{}' is truncated", module.name));
        }
        match module.status.parse::<ModuleStatus>() {
            Ok(status) => {
                module_flags.insert(module.name.to_string(), status);
            }
            Err(reason) => notes.push(format!("module '{}': {}", module.name, reason)),
        }
    }

    Ok(SampleMetrics {
        sample_id: sample_id.to_string(),
        total_sequences,
        gc_content,
        adapter_content_max,
        module_flags,
        notes,
    })
}

fn required_field<'a>(module: &Module<'a>, label: &str) -> Result<&'a str, ParseError> {
    module.field(label).ok_or_else(|| ParseError::MissingField {
        module: module.name.to_string(),
        field: label.to_string(),
    })
}

fn invalid_number(field: &str, value: &str, reason: impl fmt::Display) -> ParseError {
    ParseError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Maximum cell across every position and adapter column.
/// Falls back to 0.0 with a note when the module is absent or has no data rows.
fn adapter_content_max(modules: &[Module<'_>], notes: &mut Vec<String>) -> f64 {
    let Some(module) = modules.iter().find(|m| m.name == ADAPTER_CONTENT) else {
        notes.push(format!(
            "'{}' module absent; adapter_content_max defaulted to 0.0",
            ADAPTER_CONTENT
        ));
        return 0.0;
    };

    // A truncated module still contributes the rows it holds; the
    // truncation note comes from the module flag pass
    let mut max = 0.0f64;
    let mut seen = false;
    for row in module.data_rows() {
        // First column is the position, e.g. "1" or "10-11"
        for cell in row.split('\t').skip(1) {
            if let Ok(value) = cell.trim().parse::<f64>() {
                if value.is_finite() {
                    max = max.max(value);
                    seen = true;
                }
            }
        }
    }

    if !seen {
        notes.push(format!(
            "'{}' module has no data rows; adapter_content_max defaulted to 0.0",
            ADAPTER_CONTENT
        ));
    }

    max
}


#[cfg(test)]
mod tests {
    use super::test_support::report_text;
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_basic_statistics_and_flags() {
        let text = report_text("150000", "48", Some(&["1\t0.0\t0.0\t0.0", "2\t0.5\t0.0\t0.0"]));
        let metrics = parse_report_text("s1", &text).unwrap();

        assert_eq!(metrics.sample_id, "s1");
        assert_eq!(metrics.total_sequences, 150_000);
        assert_eq!(metrics.gc_content, 48.0);
        assert_eq!(metrics.module_flags.len(), 4);
        assert_eq!(metrics.module_flags["Basic Statistics"], ModuleStatus::Pass);
        assert_eq!(metrics.module_flags["Per sequence GC content"], ModuleStatus::Warn);
        assert!(metrics.notes.is_empty());
    }

    #[test]
    fn test_adapter_max_across_positions_and_columns() {
        let rows = ["1\t0.0\t0.1\t0.0", "10-11\t2.25\t0.0\t3.5", "12-13\t1.0\t0.0\t0.0"];
        let metrics = parse_report_text("s1", &report_text("10", "50", Some(&rows))).unwrap();
        assert_eq!(metrics.adapter_content_max, 3.5);
    }

    #[test]
    fn test_missing_adapter_module_defaults_to_zero_with_note() {
        let metrics = parse_report_text("s1", &report_text("10", "50", None)).unwrap();
        assert_eq!(metrics.adapter_content_max, 0.0);
        assert_eq!(metrics.notes.len(), 1);
        assert!(metrics.notes[0].contains("absent"));
    }

    #[test]
    fn test_empty_adapter_module_defaults_to_zero_with_note() {
        let metrics = parse_report_text("s1", &report_text("10", "50", Some(&[]))).unwrap();
        assert_eq!(metrics.adapter_content_max, 0.0);
        assert!(metrics.notes[0].contains("no data rows"));
    }

    #[test]
    fn test_truncated_adapter_module_keeps_rows_read() {
        let text = report_text("150000", "50", None)
            + ">>Adapter Content\tfail\n#Position\tIllumina Universal Adapter\n1\t12.0\n2\t40.0\n3\t41";
        let metrics = parse_report_text("s1", &text).unwrap();

        assert_eq!(metrics.adapter_content_max, 41.0);
        assert_eq!(metrics.module_flags["Adapter Content"], ModuleStatus::Fail);
        assert_eq!(metrics.notes, vec!["module 'Adapter Content' is truncated"]);

        let thresholds = crate::thresholds::ThresholdConfig::new(100_000, 30.0, 70.0, 5.0).unwrap();
        let verdict = crate::evaluate::evaluate(&metrics, &thresholds);
        assert_eq!(verdict.reasons, vec!["adapter content 41.0% exceeds 5.0%"]);
    }

    #[test]
    fn test_missing_basic_statistics() {
        let text = ">>Adapter Content\tpass\n1\t0.0\n>>END_MODULE\n";
        let err = parse_report_text("s1", text).unwrap_err();
        assert!(matches!(err, ParseError::MissingModule(ref m) if m == BASIC_STATISTICS));
    }

    #[test]
    fn test_truncated_basic_statistics() {
        let text = "##FastQC\t0.11.9\n>>Basic Statistics\tpass\n#Measure\tValue\nTotal Seq";
        let err = parse_report_text("s1", text).unwrap_err();
        assert!(matches!(err, ParseError::TruncatedModule(_)));
    }

    #[test]
    fn test_missing_total_sequences() {
        let text = report_text("1", "50", None).replace("Total Sequences\t1\n", "");
        let err = parse_report_text("s1", &text).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { ref field, .. } if field == "Total Sequences"));
    }

    #[test]
    fn test_unparseable_numbers() {
        let err = parse_report_text("s1", &report_text("many", "50", None)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { ref value, .. } if value == "many"));

        let err = parse_report_text("s1", &report_text("10", "-3", None)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { .. }));

        let err = parse_report_text("s1", &report_text("10", "101", None)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { .. }));
    }

    #[test]
    fn test_unknown_status_recorded_as_note() {
        let text = report_text("10", "50", Some(&["1\t0.0\t0.0\t0.0"]))
            .replace(">>Per base sequence quality\tpass", ">>Per base sequence quality\tmaybe");
        let metrics = parse_report_text("s1", &text).unwrap();
        assert!(!metrics.module_flags.contains_key("Per base sequence quality"));
        assert!(metrics.notes.iter().any(|n| n.contains("maybe")));
    }

    #[test]
    fn test_recognize_artifacts() {
        let zip = ReportArtifact::recognize(Path::new("/r/S1_R1_fastqc.zip"), false).unwrap();
        assert_eq!(zip.sample_id, "S1_R1");
        assert_eq!(zip.kind, ReportKind::Archive);

        let dir = ReportArtifact::recognize(Path::new("/r/S2_fastqc"), true).unwrap();
        assert_eq!(dir.sample_id, "S2");
        assert_eq!(dir.kind, ReportKind::Directory);

        let txt = ReportArtifact::recognize(Path::new("/r/S3_fastqc_data.txt"), false).unwrap();
        assert_eq!(txt.sample_id, "S3");
        assert_eq!(txt.kind, ReportKind::DataFile);

        assert!(ReportArtifact::recognize(Path::new("/r/S1_fastqc.html"), false).is_none());
        assert!(ReportArtifact::recognize(Path::new("/r/_fastqc.zip"), false).is_none());
        assert!(ReportArtifact::recognize(Path::new("/r/S1_fastqc.zip"), true).is_none());
    }

    #[test]
    fn test_parse_report_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S1_fastqc.zip");

        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("S1_fastqc/fastqc_report.html", options).unwrap();
        writer.write_all(b"<html></html>").unwrap();
        writer.start_file("S1_fastqc/fastqc_data.txt", options).unwrap();
        writer
            .write_all(report_text("2000", "41", Some(&["1\t4.5\t0.0\t0.0"])).as_bytes())
            .unwrap();
        writer.finish().unwrap();

        let artifact = ReportArtifact::recognize(&path, false).unwrap();
        let metrics = parse_report(&artifact).unwrap();
        assert_eq!(metrics.sample_id, "S1");
        assert_eq!(metrics.total_sequences, 2000);
        assert_eq!(metrics.adapter_content_max, 4.5);
    }

    #[test]
    fn test_corrupt_archive_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_fastqc.zip");
        std::fs::write(&path, b"PK\x03\x04 not really a zip").unwrap();

        let artifact = ReportArtifact::recognize(&path, false).unwrap();
        assert!(matches!(parse_report(&artifact), Err(ParseError::Archive { .. })));
    }

    #[test]
    fn test_archive_without_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S1_fastqc.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("S1_fastqc/summary.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"PASS\tBasic Statistics\n").unwrap();
        writer.finish().unwrap();

        let artifact = ReportArtifact::recognize(&path, false).unwrap();
        assert!(matches!(parse_report(&artifact), Err(ParseError::MissingDataFile(_))));
    }

    #[test]
    fn test_parse_report_from_extracted_directory() {
        let dir = tempfile::tempdir().unwrap();
        let report_dir = dir.path().join("S9_fastqc");
        std::fs::create_dir(&report_dir).unwrap();
        std::fs::write(report_dir.join(DATA_FILE_NAME), report_text("77", "62", None)).unwrap();

        let artifact = ReportArtifact::recognize(&report_dir, true).unwrap();
        let metrics = parse_report(&artifact).unwrap();
        assert_eq!(metrics.total_sequences, 77);
        assert_eq!(metrics.gc_content, 62.0);
    }
}
