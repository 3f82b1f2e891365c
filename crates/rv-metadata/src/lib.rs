#![forbid(unsafe_code)]

mod path;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use path::{MetadataPath, PathError, PathSegment, resolve_attribute, tokenize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Bool(bool),
    Int(i64),
    #[serde(rename = "uint")]
    UInt(u64),
    Float(f64),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl AttributeValue {
    /// Textual rendering used for metadata comparisons. Arrays render as
    /// comma-separated elements.
    #[must_use]
    pub fn elem_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::IntArray(values) => write_joined(f, values),
            Self::FloatArray(values) => write_joined(f, values),
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            f.write_str(",")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub name: String,
    pub value: AttributeValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetadataAttribute {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            unit: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named node of the metadata tree. Child elements and attributes keep
/// insertion order and may repeat names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataElement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<MetadataElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<MetadataAttribute>,
}

impl MetadataElement {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_element(mut self, element: Self) -> Self {
        self.elements.push(element);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: MetadataAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn add_element(&mut self, element: Self) {
        self.elements.push(element);
    }

    pub fn add_attribute(&mut self, attribute: MetadataAttribute) {
        self.attributes.push(attribute);
    }

    #[must_use]
    pub fn elements(&self) -> &[Self] {
        &self.elements
    }

    #[must_use]
    pub fn attributes(&self) -> &[MetadataAttribute] {
        &self.attributes
    }

    /// First child element with the given name.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&Self> {
        self.nth_element(name, 1)
    }

    /// First attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&MetadataAttribute> {
        self.nth_attribute(name, 1)
    }

    /// The `occurrence`-th (1-based) direct child element named `name`.
    #[must_use]
    pub fn nth_element(&self, name: &str, occurrence: usize) -> Option<&Self> {
        let idx = occurrence.checked_sub(1)?;
        self.elements
            .iter()
            .filter(|element| element.name == name)
            .nth(idx)
    }

    /// The `occurrence`-th (1-based) attribute named `name`.
    #[must_use]
    pub fn nth_attribute(&self, name: &str, occurrence: usize) -> Option<&MetadataAttribute> {
        let idx = occurrence.checked_sub(1)?;
        self.attributes
            .iter()
            .filter(|attribute| attribute.name == name)
            .nth(idx)
    }
}
