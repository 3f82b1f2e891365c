//! Test products and per-decoder test definitions.
//!
//! Each decoder owns a fixture directory `<fixture_root>/<decoder>/` holding
//! `products.json` (a JSON array of [`TestProduct`]) and one
//! `<product-id>.json` expectation document per listed product. Products are
//! de-duplicated by id into one [`ProductCatalogue`] shared by all decoders.

use std::fs;
use std::path::{Path, PathBuf};

use rv_expect::ExpectedDataset;
use serde::{Deserialize, Serialize};

use crate::decoder::DecoderRegistry;
use crate::{HarnessConfig, HarnessError};

pub const PRODUCT_LIST_FILE: &str = "products.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProduct {
    pub id: String,
    /// Location below the data root.
    pub relative_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// CPU architectures (`std::env::consts::ARCH` names) the product is
    /// skipped on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_for_platforms: Vec<String>,
    #[serde(skip, default = "present")]
    exists: bool,
}

fn present() -> bool {
    true
}

impl TestProduct {
    #[must_use]
    pub fn new(id: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            relative_path: relative_path.into(),
            description: None,
            disabled_for_platforms: Vec::new(),
            exists: true,
        }
    }

    /// False once the product file was found missing under the data root.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn mark_missing(&mut self) {
        self.exists = false;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled_on(std::env::consts::ARCH)
    }

    #[must_use]
    pub fn is_enabled_on(&self, arch: &str) -> bool {
        !self
            .disabled_for_platforms
            .iter()
            .any(|disabled| disabled.eq_ignore_ascii_case(arch))
    }

    /// Two registrations of one id conflict when they point at different
    /// files.
    #[must_use]
    pub fn is_different(&self, other: &Self) -> bool {
        self.id != other.id || self.relative_path != other.relative_path
    }

    #[must_use]
    pub fn path_in(&self, data_root: &Path) -> PathBuf {
        data_root.join(&self.relative_path)
    }

    /// Present on disk and not disabled for this platform.
    #[must_use]
    pub fn is_testable(&self) -> bool {
        self.exists && self.is_enabled()
    }
}

/// Products of all decoders, unique by id, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductCatalogue {
    products: Vec<TestProduct>,
}

impl ProductCatalogue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `product` unless its id is already known. Returns whether it was
    /// added; re-registering an id with another path is an error.
    pub fn register(&mut self, product: TestProduct) -> Result<bool, HarnessError> {
        match self.get(&product.id) {
            Some(stored) if stored.is_different(&product) => Err(HarnessError::ConflictingProduct {
                id: product.id,
                registered: stored.relative_path.clone(),
                conflicting: product.relative_path,
            }),
            Some(_) => Ok(false),
            None => {
                self.products.push(product);
                Ok(true)
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TestProduct> {
        self.products.iter().find(|product| product.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestProduct> {
        self.products.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Products and expectation documents declared for one decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderDefinition {
    pub decoder: String,
    pub products: Vec<TestProduct>,
    pub expectations: Vec<ExpectedDataset>,
}

impl DecoderDefinition {
    #[must_use]
    pub fn expectation(&self, product_id: &str) -> Option<&ExpectedDataset> {
        self.expectations
            .iter()
            .find(|expected| expected.id == product_id)
    }

    /// Ids declared `INTENDED` or `SUITABLE` for this decoder.
    pub fn decodable_product_ids(&self) -> impl Iterator<Item = &str> {
        self.expectations
            .iter()
            .filter(|expected| expected.decode_qualification.can_decode())
            .map(|expected| expected.id.as_str())
    }
}

/// Everything the acceptance checks run over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptanceSuite {
    pub definitions: Vec<DecoderDefinition>,
    pub catalogue: ProductCatalogue,
}

impl AcceptanceSuite {
    /// Loads the definitions of every registered decoder accepted by the
    /// config's decoder filter.
    pub fn load(config: &HarnessConfig, registry: &DecoderRegistry) -> Result<Self, HarnessError> {
        let mut suite = Self::default();
        for decoder in registry.iter() {
            if !config.accepts_decoder(decoder.name()) {
                continue;
            }
            let Some(definition) = load_definition(config, decoder.name())? else {
                continue;
            };
            for product in &definition.products {
                suite.catalogue.register(product.clone())?;
            }
            suite.definitions.push(definition);
        }
        Ok(suite)
    }
}

/// Reads `<fixture_root>/<decoder>/`. `Ok(None)` when the decoder has no
/// fixture directory.
pub fn load_definition(
    config: &HarnessConfig,
    decoder: &str,
) -> Result<Option<DecoderDefinition>, HarnessError> {
    let dir = config.fixture_root.join(decoder);
    let list_path = dir.join(PRODUCT_LIST_FILE);
    if !list_path.is_file() {
        tracing::warn!(decoder, path = %list_path.display(), "decoder does not define test data");
        return Ok(None);
    }

    let mut products: Vec<TestProduct> = serde_json::from_str(&fs::read_to_string(&list_path)?)?;
    products.retain(|product| config.accepts_product(&product.id));
    for product in &mut products {
        let product_path = product.path_in(&config.data_root);
        if product_path.exists() {
            continue;
        }
        product.mark_missing();
        if config.fail_on_missing_data {
            return Err(HarnessError::MissingTestData {
                id: product.id.clone(),
                path: product_path,
            });
        }
        tracing::warn!(id = %product.id, path = %product_path.display(), "test product does not exist");
    }

    let mut expectations = Vec::with_capacity(products.len());
    for product in &products {
        let document_path = dir.join(format!("{}.json", product.id));
        if !document_path.is_file() {
            return Err(HarnessError::MissingExpectation {
                decoder: decoder.to_owned(),
                id: product.id.clone(),
                path: document_path,
            });
        }
        let expected = ExpectedDataset::from_path(&document_path)?;
        if expected.id != product.id {
            return Err(HarnessError::ExpectationIdMismatch {
                path: document_path,
                expected: product.id.clone(),
                actual: expected.id,
            });
        }
        expectations.push(expected);
    }

    tracing::debug!(decoder, products = products.len(), "loaded test definition");
    Ok(Some(DecoderDefinition {
        decoder: decoder.to_owned(),
        products,
        expectations,
    }))
}
