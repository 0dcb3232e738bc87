//! Threshold configuration loading
//!
//! Reads an INI file with a required `[thresholds]` section and an optional
//! `[policy]` section:
//!
//! ```ini
//! [thresholds]
//! min_reads = 100000
//! min_gc = 30.0
//! max_gc = 70.0
//! max_adapter_content = 5.0
//!
//! [policy]
//! on_parse_error = continue
//! fail_on_modules = Per base sequence quality, Adapter Content
//! threads = 4
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const THRESHOLDS_SECTION: &str = "thresholds";
pub const POLICY_SECTION: &str = "policy";

/// Numeric bounds a sample must satisfy. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub min_reads: u64,
    pub min_gc: f64,
    pub max_gc: f64,
    pub max_adapter_content: f64,
}

impl ThresholdConfig {
    /// Build a validated threshold set
    pub fn new(
        min_reads: u64,
        min_gc: f64,
        max_gc: f64,
        max_adapter_content: f64,
    ) -> Result<Self, ConfigError> {
        check_percentage("min_gc", min_gc)?;
        check_percentage("max_gc", max_gc)?;
        check_percentage("max_adapter_content", max_adapter_content)?;
        if min_gc > max_gc {
            return Err(ConfigError::GcRangeInverted { min_gc, max_gc });
        }

        Ok(Self {
            min_reads,
            min_gc,
            max_gc,
            max_adapter_content,
        })
    }
}

fn check_percentage(key: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a finite, non-negative number".to_string(),
        });
    }
    Ok(())
}

/// What to do when a single report cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Record the sample as ERROR and keep going
    #[default]
    Continue,
    /// Stop the run at the first unparseable report
    Abort,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!("expected 'continue' or 'abort', got '{}'", other)),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Run-level settings handed to the aggregator alongside the thresholds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPolicy {
    pub on_parse_error: ErrorPolicy,
    /// Module names whose FAIL flag also fails the sample
    pub fail_on_modules: Vec<String>,
    /// Worker count; `None` uses rayon's default
    pub threads: Option<usize>,
}

/// Everything loaded from one config file
#[derive(Debug, Clone, PartialEq)]
pub struct QcConfig {
    pub thresholds: ThresholdConfig,
    pub policy: RunPolicy,
}

impl QcConfig {
    /// Read and validate a config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Parse config text already in memory
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let doc = IniDocument::parse(text)?;

        let section = doc
            .section(THRESHOLDS_SECTION)
            .ok_or_else(|| ConfigError::MissingSection(THRESHOLDS_SECTION.to_string()))?;

        let min_reads = parse_value::<u64>("min_reads", required(section, "min_reads")?)?;
        let min_gc = parse_value::<f64>("min_gc", required(section, "min_gc")?)?;
        let max_gc = parse_value::<f64>("max_gc", required(section, "max_gc")?)?;
        let max_adapter_content = parse_value::<f64>(
            "max_adapter_content",
            required(section, "max_adapter_content")?,
        )?;
        let thresholds = ThresholdConfig::new(min_reads, min_gc, max_gc, max_adapter_content)?;

        let policy = match doc.section(POLICY_SECTION) {
            Some(section) => parse_policy(section)?,
            None => RunPolicy::default(),
        };

        Ok(Self { thresholds, policy })
    }
}

fn parse_policy(section: &IniSection) -> Result<RunPolicy, ConfigError> {
    let mut policy = RunPolicy::default();

    if let Some(value) = section.get("on_parse_error") {
        policy.on_parse_error =
            value
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: "on_parse_error".to_string(),
                    value: value.clone(),
                    reason,
                })?;
    }

    if let Some(value) = section.get("fail_on_modules") {
        policy.fail_on_modules = value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(value) = section.get("threads") {
        let threads = parse_value::<usize>("threads", value)?;
        if threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "threads".to_string(),
                value: value.clone(),
                reason: "must be at least 1".to_string(),
            });
        }
        policy.threads = Some(threads);
    }

    Ok(policy)
}

fn required<'a>(section: &'a IniSection, key: &str) -> Result<&'a str, ConfigError> {
    section
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingKey {
            section: THRESHOLDS_SECTION.to_string(),
            key: key.to_string(),
        })
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

type IniSection = HashMap<String, String>;

/// Minimal INI reader: `[section]` headers, `key = value` or `key: value`,
/// full-line `#` / `;` comments. Keys are case-insensitive.
#[derive(Debug, Default)]
struct IniDocument {
    sections: HashMap<String, IniSection>,
}

impl IniDocument {
    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut doc = Self::default();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| ConfigError::Syntax {
                        line: line_no,
                        msg: format!("malformed section header '{}'", line),
                    })?;
                if doc.sections.contains_key(name) {
                    return Err(ConfigError::Syntax {
                        line: line_no,
                        msg: format!("duplicate section [{}]", name),
                    });
                }
                doc.sections.insert(name.to_string(), IniSection::new());
                current = Some(name.to_string());
                continue;
            }

            let Some(section_name) = current.as_deref() else {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    msg: "key/value pair outside of any section".to_string(),
                });
            };

            let (key, value) = line.split_once(['=', ':']).ok_or_else(|| ConfigError::Syntax {
                line: line_no,
                msg: format!("expected 'key = value', got '{}'", line),
            })?;
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    msg: "empty key".to_string(),
                });
            }

            let section = doc.sections.entry(section_name.to_string()).or_default();
            if section.contains_key(&key) {
                return Err(ConfigError::Syntax {
                    line: line_no,
                    msg: format!("duplicate key '{}' in [{}]", key, section_name),
                });
            }
            section.insert(key, value.trim().to_string());
        }

        Ok(doc)
    }

    fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "[thresholds]\n\
        min_reads = 100000\n\
        min_gc = 30.0\n\
        max_gc = 70.0\n\
        max_adapter_content = 5.0\n";

    #[test]
    fn test_load_valid_thresholds() {
        let config = QcConfig::from_ini_str(VALID).unwrap();
        assert_eq!(config.thresholds.min_reads, 100_000);
        assert_eq!(config.thresholds.min_gc, 30.0);
        assert_eq!(config.thresholds.max_gc, 70.0);
        assert_eq!(config.thresholds.max_adapter_content, 5.0);
        assert_eq!(config.policy, RunPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qc.ini");
        std::fs::write(&path, VALID).unwrap();

        let config = QcConfig::from_file(&path).unwrap();
        assert_eq!(config.thresholds.min_reads, 100_000);
    }

    #[test]
    fn test_missing_file() {
        let err = QcConfig::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_comments_colons_and_key_case() {
        let text = "; header comment\n\
            [thresholds]\n\
            # reads\n\
            MIN_READS: 10\n\
            min_gc=20\n\
            max_gc = 60.5\n\
            max_adapter_content = 1\n";
        let config = QcConfig::from_ini_str(text).unwrap();
        assert_eq!(config.thresholds.min_reads, 10);
        assert_eq!(config.thresholds.max_gc, 60.5);
    }

    #[test]
    fn test_missing_section() {
        let err = QcConfig::from_ini_str("[other]\nmin_reads = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(ref s) if s == "thresholds"));
    }

    #[test]
    fn test_missing_key() {
        let text = "[thresholds]\nmin_reads = 1\nmin_gc = 30\nmax_gc = 70\n";
        let err = QcConfig::from_ini_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key, .. } if key == "max_adapter_content"));
    }

    #[test]
    fn test_non_numeric_value() {
        let text = VALID.replace("min_reads = 100000", "min_reads = lots");
        let err = QcConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "min_reads"));
    }

    #[test]
    fn test_negative_values_rejected() {
        let text = VALID.replace("min_reads = 100000", "min_reads = -5");
        assert!(QcConfig::from_ini_str(&text).is_err());

        let text = VALID.replace("max_adapter_content = 5.0", "max_adapter_content = -1");
        let err = QcConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_inverted_gc_range() {
        let text = VALID.replace("min_gc = 30.0", "min_gc = 75.0");
        let err = QcConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::GcRangeInverted { .. }));
    }

    #[test]
    fn test_equal_gc_bounds_allowed() {
        assert!(ThresholdConfig::new(0, 50.0, 50.0, 0.0).is_ok());
    }

    #[test]
    fn test_duplicate_key_is_syntax_error() {
        let text = format!("{}min_gc = 10\n", VALID);
        let err = QcConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 6, .. }));
    }

    #[test]
    fn test_key_outside_section() {
        let err = QcConfig::from_ini_str("min_reads = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_policy_section() {
        let text = format!(
            "{}\n[policy]\non_parse_error = abort\nfail_on_modules = Per base sequence quality, Adapter Content ,\nthreads = 3\n",
            VALID
        );
        let config = QcConfig::from_ini_str(&text).unwrap();
        assert_eq!(config.policy.on_parse_error, ErrorPolicy::Abort);
        assert_eq!(
            config.policy.fail_on_modules,
            vec!["Per base sequence quality".to_string(), "Adapter Content".to_string()]
        );
        assert_eq!(config.policy.threads, Some(3));
    }

    #[test]
    fn test_policy_rejects_bad_values() {
        let text = format!("{}[policy]\non_parse_error = maybe\n", VALID);
        assert!(QcConfig::from_ini_str(&text).is_err());

        let text = format!("{}[policy]\nthreads = 0\n", VALID);
        assert!(QcConfig::from_ini_str(&text).is_err());
    }

    #[test]
    fn test_error_policy_accepts_only_documented_values() {
        assert_eq!("continue".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Continue));
        assert_eq!(" Abort ".parse::<ErrorPolicy>(), Ok(ErrorPolicy::Abort));
        assert!("soft".parse::<ErrorPolicy>().is_err());
        assert!("fail-fast".parse::<ErrorPolicy>().is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a loaded config never has min_gc above max_gc
            #[test]
            fn prop_gc_bounds_ordered(min_gc in 0.0f64..100.0, max_gc in 0.0f64..100.0) {
                let text = format!(
                    "[thresholds]\nmin_reads = 1\nmin_gc = {}\nmax_gc = {}\nmax_adapter_content = 5\n",
                    min_gc, max_gc
                );
                match QcConfig::from_ini_str(&text) {
                    Ok(config) => {
                        prop_assert!(min_gc <= max_gc);
                        prop_assert!(config.thresholds.min_gc <= config.thresholds.max_gc);
                        prop_assert_eq!(config.thresholds.min_gc, min_gc);
                        prop_assert_eq!(config.thresholds.max_gc, max_gc);
                    }
                    Err(err) => {
                        prop_assert!(min_gc > max_gc);
                        let inverted = matches!(err, ConfigError::GcRangeInverted { .. });
                        prop_assert!(inverted);
                    }
                }
            }
        }
    }
}
