#![forbid(unsafe_code)]

use std::path::PathBuf;

use rv_harness::{
    DecoderRegistry, HarnessConfig, append_run_history, enforce_green, run_acceptance,
    write_report,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config_path: Option<PathBuf> = None;
    let mut data_root: Option<PathBuf> = None;
    let mut fixture_root: Option<PathBuf> = None;
    let mut artifact_root: Option<PathBuf> = None;
    let mut decoder_filter: Option<String> = None;
    let mut product_ids: Option<Vec<String>> = None;
    let mut no_fail_on_missing_data = false;
    let mut fail_on_multiple_intended = false;
    let mut write_artifacts = false;
    let mut write_history = false;
    let mut require_green = false;
    let mut log_json = false;

    let mut args = std::env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().ok_or("--config requires a YAML file path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--data-dir" => {
                let value = args.next().ok_or("--data-dir requires a directory")?;
                data_root = Some(PathBuf::from(value));
            }
            "--fixtures" => {
                let value = args.next().ok_or("--fixtures requires a directory")?;
                fixture_root = Some(PathBuf::from(value));
            }
            "--artifacts" => {
                let value = args.next().ok_or("--artifacts requires a directory")?;
                artifact_root = Some(PathBuf::from(value));
            }
            "--decoder" => {
                let value = args
                    .next()
                    .ok_or("--decoder requires a name prefix (e.g. scene-document)")?;
                decoder_filter = Some(value);
            }
            "--product-ids" => {
                let value = args
                    .next()
                    .ok_or("--product-ids requires a comma-separated list")?;
                product_ids = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_owned)
                        .collect(),
                );
            }
            "--no-fail-on-missing-data" => {
                no_fail_on_missing_data = true;
            }
            "--fail-on-multiple-intended" => {
                fail_on_multiple_intended = true;
            }
            "--write-report" => {
                write_artifacts = true;
            }
            "--write-history" => {
                write_history = true;
            }
            "--require-green" => {
                require_green = true;
            }
            "--log-json" => {
                log_json = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    init_tracing(log_json);

    let mut config = match &config_path {
        Some(path) => HarnessConfig::from_yaml_path(path)?,
        None => HarnessConfig::default_paths(),
    };
    if let Some(path) = data_root {
        config.data_root = path;
    }
    if let Some(path) = fixture_root {
        config.fixture_root = path;
    }
    if let Some(path) = artifact_root {
        config.artifact_root = path;
    }
    if decoder_filter.is_some() {
        config.decoder_filter = decoder_filter;
    }
    if product_ids.is_some() {
        config.product_ids = product_ids;
    }
    if no_fail_on_missing_data {
        config.fail_on_missing_data = false;
    }
    if fail_on_multiple_intended {
        config.fail_on_multiple_intended = true;
    }

    let registry = DecoderRegistry::with_builtin();
    let report = run_acceptance(&config, &registry)?;
    println!(
        "suite={} decoders={} products={} passed={} failed={} warned={} green={}",
        report.suite,
        report.decoder_count,
        report.product_count,
        report.passed,
        report.failed,
        report.warned,
        report.is_green()
    );
    for result in report.results.iter().filter(|result| result.mismatch.is_some()) {
        println!(
            "{:?} {:?}: {}",
            result.status,
            result.check,
            result.mismatch.as_deref().unwrap_or_default()
        );
    }

    if write_artifacts {
        let written = write_report(&config, &report)?;
        println!(
            "wrote report={} mismatch_corpus={}",
            written.report_path.display(),
            written.mismatch_corpus_path.display()
        );
    }

    if write_artifacts || write_history {
        let history_path = append_run_history(&config, &report)?;
        println!("wrote run_history={}", history_path.display());
    }

    if require_green {
        enforce_green(&report)?;
    }

    Ok(())
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_help() {
    println!(
        "rv-acceptance-cli\n\
         Usage:\n\
         \trv-acceptance-cli [--config acceptance.yaml] [--data-dir DIR] [--decoder NAME] [--write-report] [--require-green]\n\
         Options:\n\
         \t--config <file>               Read settings from a YAML file (flags override it)\n\
         \t--data-dir <dir>              Directory the test products resolve against\n\
         \t--fixtures <dir>              Directory with one test definition folder per decoder\n\
         \t--artifacts <dir>             Directory for reports and run history\n\
         \t--decoder <prefix>            Only test decoders whose name starts with <prefix>\n\
         \t--product-ids <a,b>           Only test these product ids (case-insensitive)\n\
         \t--no-fail-on-missing-data     Skip missing test products instead of aborting\n\
         \t--fail-on-multiple-intended   Fail when more than one decoder declares a product INTENDED\n\
         \t--write-report                Write acceptance_report.json and acceptance_mismatches.json\n\
         \t--write-history               Append a run summary to run_history.jsonl\n\
         \t--require-green               Fail with non-zero exit when any case fails\n\
         \t--log-json                    Emit logs as JSON (filter with RUST_LOG, default info)\n\
         \t-h, --help                    Show this help"
    );
}
