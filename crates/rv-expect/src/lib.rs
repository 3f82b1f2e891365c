#![forbid(unsafe_code)]

//! Expectation documents.
//!
//! Every field is optional: a key missing from the document means "do not
//! check". Fields where an explicit `null` carries meaning use [`Declared`]
//! so that "absent" and "declared null" stay distinguishable.

use std::fs;
use std::path::Path;

use rv_types::{Color, DecodeQualification, TypeError, float_text, parse_flag, parse_number};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExpectationError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("expectation document has an empty id")]
    EmptyId,
}

/// Tri-state field: not declared, declared as `null`, or declared with a
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declared<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Declared<T> {
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The declared value; `None` for both absent and null.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent | Self::Null => None,
        }
    }
}

impl<T> Default for Declared<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> From<Option<T>> for Declared<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Declared<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

impl<T: Serialize> Serialize for Declared<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(value) => value.serialize(serializer),
            Self::Absent | Self::Null => serializer.serialize_none(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarText {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl From<ScalarText> for String {
    fn from(value: ScalarText) -> Self {
        match value {
            ScalarText::Text(text) => text,
            ScalarText::Number(number) => number.to_string(),
            ScalarText::Bool(flag) => flag.to_string(),
        }
    }
}

/// Scalar kept as text: strings pass through, numbers and booleans are
/// rendered. `null` reads as undeclared.
fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<ScalarText>::deserialize(deserializer)?.map(String::from))
}

fn required_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    ScalarText::deserialize(deserializer).map(String::from)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedDataset {
    pub id: String,
    #[serde(default)]
    pub decode_qualification: DecodeQualification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_content: Option<ExpectedContent>,
}

impl ExpectedDataset {
    pub fn from_json_str(body: &str) -> Result<Self, ExpectationError> {
        let dataset: Self = serde_json::from_str(body)?;
        if dataset.id.trim().is_empty() {
            return Err(ExpectationError::EmptyId);
        }
        Ok(dataset)
    }

    pub fn from_path(path: &Path) -> Result<Self, ExpectationError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_height: Option<i64>,
    #[serde(default, skip_serializing_if = "Declared::is_absent")]
    pub start_time: Declared<String>,
    #[serde(default, skip_serializing_if = "Declared::is_absent")]
    pub end_time: Declared<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_coding: Option<ExpectedGeoCoding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flag_codings: Vec<ExpectedSampleCoding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_codings: Vec<ExpectedSampleCoding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tie_point_grids: Vec<ExpectedTiePointGrid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<ExpectedBand>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masks: Vec<ExpectedMask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<ExpectedMetadata>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedGeoCoding {
    #[serde(default)]
    pub coordinates: Vec<ExpectedGeoCoordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_accuracy: Option<f64>,
}

impl ExpectedGeoCoding {
    /// Tolerance for the reverse projection check; `None` (undeclared or
    /// negative) disables the check.
    #[must_use]
    pub fn reverse_accuracy(&self) -> Option<f64> {
        self.reverse_accuracy.filter(|accuracy| *accuracy >= 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGeoCoordinate {
    pub x: f64,
    pub y: f64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSampleCoding {
    pub name: String,
    #[serde(default)]
    pub samples: Vec<ExpectedSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSample {
    pub name: String,
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExpectedSample {
    /// Description to compare, if a non-empty one was declared.
    #[must_use]
    pub fn checked_description(&self) -> Option<&str> {
        self.description.as_deref().filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTiePointGrid {
    pub name: String,
    #[serde(default, skip_serializing_if = "Declared::is_absent")]
    pub description: Declared<String>,
    #[serde(default, skip_serializing_if = "Declared::is_absent")]
    pub geophysical_unit: Declared<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub no_data_value: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub no_data_value_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sampling_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sampling_y: Option<f64>,
    #[serde(default)]
    pub expected_pixels: Vec<ExpectedPixel>,
}

impl ExpectedTiePointGrid {
    pub fn no_data_value(&self) -> Option<Result<f64, TypeError>> {
        self.no_data_value.as_deref().map(parse_number)
    }

    #[must_use]
    pub fn no_data_value_used(&self) -> Option<bool> {
        self.no_data_value_used.as_deref().map(parse_flag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedBand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Declared::is_absent")]
    pub description: Declared<String>,
    #[serde(default, skip_serializing_if = "Declared::is_absent")]
    pub geophysical_unit: Declared<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub no_data_value: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub no_data_value_used: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub spectral_wavelength: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub spectral_bandwidth: Option<String>,
    #[serde(default)]
    pub expected_pixels: Vec<ExpectedPixel>,
}

impl ExpectedBand {
    pub fn no_data_value(&self) -> Option<Result<f64, TypeError>> {
        self.no_data_value.as_deref().map(parse_number)
    }

    #[must_use]
    pub fn no_data_value_used(&self) -> Option<bool> {
        self.no_data_value_used.as_deref().map(parse_flag)
    }

    pub fn spectral_wavelength(&self) -> Option<Result<f32, TypeError>> {
        self.spectral_wavelength
            .as_deref()
            .map(|text| parse_number(text).map(|value| value as f32))
    }

    pub fn spectral_bandwidth(&self) -> Option<Result<f32, TypeError>> {
        self.spectral_bandwidth
            .as_deref()
            .map(|text| parse_number(text).map(|value| value as f32))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedMask {
    pub name: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExpectedMask {
    #[must_use]
    pub fn checked_description(&self) -> Option<&str> {
        self.description.as_deref().filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedMetadata {
    pub path: String,
    #[serde(deserialize_with = "required_text")]
    pub value: String,
}

/// Expected sample at an integer pixel. A NaN value expects the pixel to be
/// invalid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPixel {
    pub x: i64,
    pub y: i64,
    #[serde(with = "float_text::single")]
    pub value: f32,
}

impl ExpectedPixel {
    #[must_use]
    pub const fn new(x: i64, y: i64, value: f32) -> Self {
        Self { x, y, value }
    }
}
