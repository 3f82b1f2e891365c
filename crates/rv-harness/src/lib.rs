#![forbid(unsafe_code)]

//! Acceptance harness for raster product decoders.
//!
//! For every registered [`Decoder`] the harness loads its test definition
//! (products plus expectation documents), then runs three checks:
//!
//! 1. at most one decoder declares a product `INTENDED`,
//! 2. each decoder's actual decode qualification matches the declared one,
//! 3. every product a decoder declares decodable is read and verified
//!    against its expected content.
//!
//! Results are collected into an [`AcceptanceReport`] that can be written
//! as JSON artifacts and appended to a JSONL run history.

pub mod catalogue;
pub mod decoder;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rv_expect::ExpectationError;
use rv_types::DecodeQualification;
use rv_verify::{Failure, verify};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use catalogue::{AcceptanceSuite, DecoderDefinition, ProductCatalogue, TestProduct};
pub use decoder::{Decoder, DecoderRegistry, SceneDocumentDecoder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory the products' relative paths resolve against.
    pub data_root: PathBuf,
    /// One sub-directory per decoder with `products.json` and the
    /// expectation documents.
    pub fixture_root: PathBuf,
    pub artifact_root: PathBuf,
    pub fail_on_missing_data: bool,
    pub fail_on_multiple_intended: bool,
    /// Only decoders whose name starts with this prefix are tested.
    pub decoder_filter: Option<String>,
    /// Only these product ids are tested (case-insensitive).
    pub product_ids: Option<Vec<String>>,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let crate_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            data_root: crate_root.join("fixtures/data"),
            fixture_root: crate_root.join("fixtures/decoders"),
            artifact_root: crate_root.join("../../artifacts/acceptance"),
            fail_on_missing_data: true,
            fail_on_multiple_intended: false,
            decoder_filter: None,
            product_ids: None,
        }
    }

    /// Reads a YAML config. Missing keys keep their [`default_paths`]
    /// value; relative paths resolve against the file's directory.
    ///
    /// [`default_paths`]: Self::default_paths
    pub fn from_yaml_path(path: &Path) -> Result<Self, HarnessError> {
        let mut config: Self = serde_yaml::from_str(&fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            for dir in [
                &mut config.data_root,
                &mut config.fixture_root,
                &mut config.artifact_root,
            ] {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn accepts_decoder(&self, name: &str) -> bool {
        self.decoder_filter
            .as_deref()
            .is_none_or(|prefix| name.starts_with(prefix))
    }

    #[must_use]
    pub fn accepts_product(&self, id: &str) -> bool {
        self.product_ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|wanted| wanted.eq_ignore_ascii_case(id)))
    }

    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.artifact_root.join("acceptance_report.json")
    }

    #[must_use]
    pub fn mismatch_corpus_path(&self) -> PathBuf {
        self.artifact_root.join("acceptance_mismatches.json")
    }

    #[must_use]
    pub fn run_history_path(&self) -> PathBuf {
        self.artifact_root.join("run_history.jsonl")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Expectation(#[from] ExpectationError),
    #[error("data root is not a directory: {}", path.display())]
    DataRoot { path: PathBuf },
    #[error("test product '{id}' does not exist: {}", path.display())]
    MissingTestData { id: String, path: PathBuf },
    #[error("decoder '{decoder}' has no expectation document for '{id}': {}", path.display())]
    MissingExpectation {
        decoder: String,
        id: String,
        path: PathBuf,
    },
    #[error(
        "test product '{id}' already defined with path '{registered}', got '{conflicting}'"
    )]
    ConflictingProduct {
        id: String,
        registered: String,
        conflicting: String,
    },
    #[error("expectation document {} declares id '{actual}', expected '{expected}'", path.display())]
    ExpectationIdMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("decoder '{name}' is already registered")]
    DuplicateDecoder { name: String },
    #[error("acceptance gate failed: {0}")]
    Gate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceCheck {
    SingleIntendedDecoder,
    DecodeQualification,
    IntendedContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
    /// Reported but does not turn the run red.
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub check: AcceptanceCheck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
    pub product_id: String,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
}

impl CaseResult {
    fn pass(check: AcceptanceCheck, decoder: Option<&str>, product_id: &str) -> Self {
        Self {
            check,
            decoder: decoder.map(str::to_owned),
            product_id: product_id.to_owned(),
            status: CaseStatus::Pass,
            mismatch: None,
            failures: Vec::new(),
        }
    }

    fn with_status(mut self, status: CaseStatus, message: impl std::fmt::Display) -> Self {
        self.status = status;
        self.mismatch = Some(format!("[{}] {message}", self.product_id));
        self
    }

    fn fail(self, message: impl std::fmt::Display) -> Self {
        self.with_status(CaseStatus::Fail, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceReport {
    pub suite: String,
    pub decoder_count: usize,
    pub product_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub warned: usize,
    pub results: Vec<CaseResult>,
}

impl AcceptanceReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && !self.results.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results
            .iter()
            .filter(|result| result.status == CaseStatus::Fail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub ts_unix_ms: u64,
    pub suite: String,
    pub decoder_count: usize,
    pub product_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub warned: usize,
    pub green: bool,
    pub report_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenReport {
    pub report_path: PathBuf,
    pub mismatch_corpus_path: PathBuf,
}

/// Runs every acceptance check for the decoders in `registry`.
pub fn run_acceptance(
    config: &HarnessConfig,
    registry: &DecoderRegistry,
) -> Result<AcceptanceReport, HarnessError> {
    if !config.data_root.is_dir() {
        return Err(HarnessError::DataRoot {
            path: config.data_root.clone(),
        });
    }

    let started = Instant::now();
    let suite = AcceptanceSuite::load(config, registry)?;
    tracing::info!(
        decoders = suite.definitions.len(),
        products = suite.catalogue.len(),
        "loaded acceptance suite"
    );

    let mut results = check_single_intended_decoder(config, &suite);
    results.extend(check_decode_qualifications(config, registry, &suite));
    results.extend(check_intended_content(config, registry, &suite));

    let count = |status: CaseStatus| results.iter().filter(|r| r.status == status).count();
    let report = AcceptanceReport {
        suite: config
            .decoder_filter
            .as_deref()
            .map_or_else(|| "acceptance".to_owned(), |filter| format!("acceptance:{filter}")),
        decoder_count: suite.definitions.len(),
        product_count: suite.catalogue.len(),
        passed: count(CaseStatus::Pass),
        failed: count(CaseStatus::Fail),
        warned: count(CaseStatus::Warn),
        results,
    };
    tracing::info!(
        passed = report.passed,
        failed = report.failed,
        warned = report.warned,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "acceptance run finished"
    );
    Ok(report)
}

/// At most one decoder may declare a product `INTENDED`. A violation is a
/// warning unless `fail_on_multiple_intended` is set.
#[must_use]
pub fn check_single_intended_decoder(
    config: &HarnessConfig,
    suite: &AcceptanceSuite,
) -> Vec<CaseResult> {
    let mut results = Vec::new();
    for product in suite.catalogue.iter().filter(|product| product.is_testable()) {
        let intended: Vec<&str> = suite
            .definitions
            .iter()
            .filter(|definition| {
                definition.expectation(&product.id).is_some_and(|expected| {
                    expected.decode_qualification == DecodeQualification::Intended
                })
            })
            .map(|definition| definition.decoder.as_str())
            .collect();

        let result = CaseResult::pass(
            AcceptanceCheck::SingleIntendedDecoder,
            intended.first().copied(),
            &product.id,
        );
        if intended.len() > 1 {
            let status = if config.fail_on_multiple_intended {
                CaseStatus::Fail
            } else {
                CaseStatus::Warn
            };
            tracing::warn!(id = %product.id, decoders = ?intended, "multiple INTENDED decoders");
            results.push(result.with_status(
                status,
                format_args!(
                    "more than one decoder declares INTENDED: {}",
                    intended.join(", ")
                ),
            ));
        } else {
            results.push(result);
        }
    }
    results
}

/// Compares each decoder's actual qualification with the declared one for
/// every existing product it has an expectation document for.
#[must_use]
pub fn check_decode_qualifications(
    config: &HarnessConfig,
    registry: &DecoderRegistry,
    suite: &AcceptanceSuite,
) -> Vec<CaseResult> {
    let mut results = Vec::new();
    for definition in &suite.definitions {
        let Some(decoder) = registry.get(&definition.decoder) else {
            continue;
        };
        tracing::info!(decoder = decoder.name(), "checking decode qualifications");
        for product in suite.catalogue.iter() {
            if !product.is_testable() {
                tracing::info!(id = %product.id, "not existent, skipped");
                continue;
            }
            let actual = decoder.decode_qualification(&product.path_in(&config.data_root));
            match definition.expectation(&product.id) {
                Some(expected) => {
                    let result = CaseResult::pass(
                        AcceptanceCheck::DecodeQualification,
                        Some(decoder.name()),
                        &product.id,
                    );
                    if expected.decode_qualification == actual {
                        results.push(result);
                    } else {
                        results.push(result.fail(format_args!(
                            "decoder '{}' decode qualification: expected <{}> but was <{}>",
                            decoder.name(),
                            expected.decode_qualification,
                            actual
                        )));
                    }
                }
                None if actual != DecodeQualification::Unable => {
                    tracing::info!(
                        decoder = decoder.name(),
                        id = %product.id,
                        qualification = %actual,
                        "can read product but it is not defined in tests"
                    );
                }
                None => {}
            }
        }
    }
    results
}

/// Reads every product a decoder declares decodable and verifies it against
/// the declared content. Failure messages are prefixed with `[product-id]`.
#[must_use]
pub fn check_intended_content(
    config: &HarnessConfig,
    registry: &DecoderRegistry,
    suite: &AcceptanceSuite,
) -> Vec<CaseResult> {
    let mut results = Vec::new();
    for definition in &suite.definitions {
        let Some(decoder) = registry.get(&definition.decoder) else {
            continue;
        };
        tracing::info!(decoder = decoder.name(), "checking intended product content");
        for product_id in definition.decodable_product_ids() {
            let result = CaseResult::pass(
                AcceptanceCheck::IntendedContent,
                Some(decoder.name()),
                product_id,
            );
            let Some(product) = suite.catalogue.get(product_id) else {
                results.push(result.fail("test product not defined"));
                continue;
            };
            if !product.is_testable() {
                tracing::info!(id = %product.id, "not existent, skipped");
                continue;
            }

            let started = Instant::now();
            let dataset = match decoder.read(&product.path_in(&config.data_root)) {
                Ok(dataset) => dataset,
                Err(err) => {
                    results.push(result.fail(format_args!(
                        "decoder '{}' failed to read product: {err}",
                        decoder.name()
                    )));
                    continue;
                }
            };
            let failures = definition
                .expectation(product_id)
                .and_then(|expected| expected.expected_content.as_ref())
                .map(|content| verify(content, product_id, dataset.as_ref()))
                .unwrap_or_default();
            drop(dataset);
            tracing::debug!(
                id = product_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "verified product content"
            );

            if failures.is_empty() {
                results.push(result);
            } else {
                let message = failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                let mut failed = result.fail(message);
                failed.failures = failures;
                results.push(failed);
            }
        }
    }
    results
}

/// Writes the report and the failed-case corpus under `artifact_root`.
pub fn write_report(
    config: &HarnessConfig,
    report: &AcceptanceReport,
) -> Result<WrittenReport, HarnessError> {
    fs::create_dir_all(&config.artifact_root)?;

    let report_path = config.report_path();
    fs::write(&report_path, serde_json::to_string_pretty(report)?)?;

    let mismatches: Vec<&CaseResult> = report.failures().collect();
    let corpus = serde_json::json!({
        "suite": report.suite,
        "mismatch_count": mismatches.len(),
        "mismatches": mismatches,
    });
    let mismatch_corpus_path = config.mismatch_corpus_path();
    fs::write(&mismatch_corpus_path, serde_json::to_string_pretty(&corpus)?)?;

    Ok(WrittenReport {
        report_path,
        mismatch_corpus_path,
    })
}

/// Appends one JSONL summary row for `report` to the run history.
pub fn append_run_history(
    config: &HarnessConfig,
    report: &AcceptanceReport,
) -> Result<PathBuf, HarnessError> {
    let history_path = config.run_history_path();
    if let Some(parent) = history_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&history_path)?;

    let report_json = serde_json::to_vec(report)?;
    let entry = RunHistoryEntry {
        ts_unix_ms: now_unix_ms(),
        suite: report.suite.clone(),
        decoder_count: report.decoder_count,
        product_count: report.product_count,
        passed: report.passed,
        failed: report.failed,
        warned: report.warned,
        green: report.is_green(),
        report_hash: format!("sha256:{}", hash_bytes(&report_json)),
    };
    writeln!(file, "{}", serde_json::to_string(&entry)?)?;

    Ok(history_path)
}

pub fn enforce_green(report: &AcceptanceReport) -> Result<(), HarnessError> {
    if report.is_green() {
        return Ok(());
    }
    if report.results.is_empty() {
        return Err(HarnessError::Gate(format!(
            "suite {} ran no cases",
            report.suite
        )));
    }
    let failures: Vec<&str> = report
        .failures()
        .filter_map(|result| result.mismatch.as_deref())
        .collect();
    Err(HarnessError::Gate(format!(
        "suite {} failed cases={}: {}",
        report.suite,
        report.failed,
        failures.join(" | ")
    )))
}

fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
