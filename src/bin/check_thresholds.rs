//! QC Threshold Check Tool
//!
//! Evaluates a directory of FastQC reports against the thresholds in an INI
//! config and writes a per-sample PASS/FAIL/ERROR summary as JSON.
//! Failing samples are a data outcome; the exit code is non-zero only when
//! the run itself cannot produce a summary.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use qc_threshold_tools::{ErrorPolicy, SummaryAggregator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let matches = Command::new("qc-check-thresholds")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Check FastQC results against quality thresholds")
        .author("Megan Johnson")
        .arg(
            Arg::new("fastqc_dir")
                .short('i')
                .long("fastqc-dir")
                .visible_alias("input-dir")
                .value_name("DIRECTORY")
                .help("Directory with FastQC reports (_fastqc.zip, _fastqc/, _fastqc_data.txt)")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("INI")
                .help("INI file with a [thresholds] section")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("JSON")
                .help("Output JSON file with per-sample QC status")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("N")
                .help("Worker threads for report parsing (overrides [policy] threads)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("fail_fast")
                .long("fail-fast")
                .help("Abort on the first unparseable report instead of recording it as ERROR")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    init_logging(matches.get_flag("verbose"));

    let fastqc_dir = path_arg(&matches, "fastqc_dir")?;
    let config_path = path_arg(&matches, "config")?;
    let output_file = path_arg(&matches, "output")?;

    let mut aggregator = SummaryAggregator::from_config_file(&config_path)
        .with_context(|| format!("Failed to load thresholds from {}", config_path.display()))?;
    if matches.get_flag("fail_fast") {
        aggregator.policy.on_parse_error = ErrorPolicy::Abort;
    }
    if let Some(&threads) = matches.get_one::<usize>("threads") {
        if threads == 0 {
            anyhow::bail!("--threads must be at least 1");
        }
        aggregator.policy.threads = Some(threads);
    }

    println!("📊 QC Threshold Check");
    println!("FastQC reports: {}", fastqc_dir.display());
    println!("Config: {}", config_path.display());
    println!("Output: {}", output_file.display());
    println!(
        "Thresholds: min_reads={}, GC=[{}, {}], max_adapter_content={}",
        aggregator.thresholds.min_reads,
        aggregator.thresholds.min_gc,
        aggregator.thresholds.max_gc,
        aggregator.thresholds.max_adapter_content
    );
    println!("On parse error: {}", aggregator.policy.on_parse_error);

    let summary = aggregator.run(&fastqc_dir, &output_file)?;

    println!("✅ QC threshold check complete!");
    println!("  Total samples: {}", summary.summary.total_samples);
    println!("  Passed samples: {}", summary.summary.passed_samples);
    println!("  Failed samples: {}", summary.summary.failed_samples);
    println!("  Errored samples: {}", summary.summary.error_samples);
    println!("  Pass rate: {:.1}%", summary.summary.pass_rate);
    println!("💾 Summary saved to: {}", output_file.display());

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn path_arg(matches: &ArgMatches, id: &str) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(id)
        .cloned()
        .with_context(|| format!("missing required argument '{}'", id))
}
