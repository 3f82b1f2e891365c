//! Slash-delimited addressing of metadata attributes.
//!
//! A path is a sequence of element names followed by one attribute name,
//! e.g. `Processing/Step[2]/Version`. Each segment may carry a 1-based
//! occurrence suffix `[k]` selecting the k-th same-named sibling; without a
//! suffix the first match is used. A slash inside a name is written as a
//! doubled separator: `a//b/c` addresses element `a/b`, attribute `c`.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::{MetadataAttribute, MetadataElement};

const SEPARATOR: char = '/';

static INDEXED_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\[([+-]?\d+)\]$").expect("indexed segment pattern is a valid regex")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("metadata path is empty")]
    Empty,
    #[error("metadata path '{path}' has a separator without a neighbouring name")]
    DanglingSeparator { path: String },
    #[error("metadata path '{path}': segment '{segment}' has an unparsable index")]
    UnparsableIndex { path: String, segment: String },
    #[error("metadata path '{path}': segment '{segment}' index must be >= 1, got {index}")]
    NonPositiveIndex {
        path: String,
        segment: String,
        index: i64,
    },
    #[error("metadata path '{path}': element '{segment}' not found")]
    ElementNotFound { path: String, segment: String },
    #[error("metadata path '{path}': attribute '{segment}' not found")]
    AttributeNotFound { path: String, segment: String },
}

impl PathError {
    /// The path text itself is invalid, independent of any tree.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Empty
                | Self::DanglingSeparator { .. }
                | Self::UnparsableIndex { .. }
                | Self::NonPositiveIndex { .. }
        )
    }

    /// A well-formed segment did not resolve against the tree.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound { .. } | Self::AttributeNotFound { .. }
        )
    }
}

/// Split a path on `/`, joining the neighbours of every empty token back
/// together with a literal slash.
pub fn tokenize(path: &str) -> Result<Vec<String>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let splits = path.split(SEPARATOR).collect::<Vec<_>>();
    let dangling = || PathError::DanglingSeparator {
        path: path.to_owned(),
    };

    let mut tokens: Vec<String> = Vec::with_capacity(splits.len());
    let mut idx = 0;
    while idx < splits.len() {
        let current = splits[idx];
        if current.is_empty() {
            let previous = tokens.pop().ok_or_else(dangling)?;
            let next = splits.get(idx + 1).ok_or_else(dangling)?;
            tokens.push(format!("{previous}{SEPARATOR}{next}"));
            idx += 2;
        } else {
            tokens.push(current.to_owned());
            idx += 1;
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    name: String,
    occurrence: Option<NonZeroUsize>,
    token: String,
}

impl PathSegment {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            token: name.clone(),
            name,
            occurrence: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based occurrence among same-named siblings; 1 when no suffix was
    /// given.
    #[must_use]
    pub fn occurrence(&self) -> usize {
        self.occurrence.map_or(1, NonZeroUsize::get)
    }

    #[must_use]
    pub fn has_explicit_occurrence(&self) -> bool {
        self.occurrence.is_some()
    }

    /// The segment as written in the path, bracket suffix included.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    fn parse_in(path: &str, token: &str) -> Result<Self, PathError> {
        let Some(captures) = INDEXED_SEGMENT.captures(token) else {
            return Ok(Self::named(token));
        };

        let name = captures.get(1).map_or("", |m| m.as_str());
        let digits = captures.get(2).map_or("", |m| m.as_str());
        let index = digits
            .parse::<i64>()
            .map_err(|_| PathError::UnparsableIndex {
                path: path.to_owned(),
                segment: token.to_owned(),
            })?;
        if index < 1 {
            return Err(PathError::NonPositiveIndex {
                path: path.to_owned(),
                segment: token.to_owned(),
                index,
            });
        }
        let occurrence = usize::try_from(index)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| PathError::UnparsableIndex {
                path: path.to_owned(),
                segment: token.to_owned(),
            })?;

        Ok(Self {
            name: name.to_owned(),
            occurrence: Some(occurrence),
            token: token.to_owned(),
        })
    }
}

impl FromStr for PathSegment {
    type Err = PathError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::parse_in(token, token)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.occurrence {
            Some(k) => write!(f, "{}[{k}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A parsed metadata path: zero or more element segments and one trailing
/// attribute segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPath {
    raw: String,
    elements: Vec<PathSegment>,
    attribute: PathSegment,
}

impl MetadataPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let mut segments = tokenize(path)?
            .iter()
            .map(|token| PathSegment::parse_in(path, token))
            .collect::<Result<Vec<_>, _>>()?;
        let attribute = segments.pop().ok_or(PathError::Empty)?;

        Ok(Self {
            raw: path.to_owned(),
            elements: segments,
            attribute,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn elements(&self) -> &[PathSegment] {
        &self.elements
    }

    #[must_use]
    pub fn attribute(&self) -> &PathSegment {
        &self.attribute
    }

    /// Walk the element segments starting at `root`.
    pub fn resolve_element<'a>(
        &self,
        root: &'a MetadataElement,
    ) -> Result<&'a MetadataElement, PathError> {
        let mut current = root;
        for segment in &self.elements {
            current = current
                .nth_element(segment.name(), segment.occurrence())
                .ok_or_else(|| PathError::ElementNotFound {
                    path: self.raw.clone(),
                    segment: segment.to_string(),
                })?;
        }
        Ok(current)
    }

    /// Resolve the trailing attribute. An indexed attribute segment such as
    /// `band[2]` that finds no second `band` falls back to an attribute
    /// literally named `band[2]`.
    pub fn resolve<'a>(
        &self,
        root: &'a MetadataElement,
    ) -> Result<&'a MetadataAttribute, PathError> {
        let element = self.resolve_element(root)?;
        element
            .nth_attribute(self.attribute.name(), self.attribute.occurrence())
            .or_else(|| {
                if self.attribute.has_explicit_occurrence() {
                    element.attribute(self.attribute.token())
                } else {
                    None
                }
            })
            .ok_or_else(|| PathError::AttributeNotFound {
                path: self.raw.clone(),
                segment: self.attribute.to_string(),
            })
    }
}

impl fmt::Display for MetadataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub fn resolve_attribute<'a>(
    root: &'a MetadataElement,
    path: &str,
) -> Result<&'a MetadataAttribute, PathError> {
    MetadataPath::parse(path)?.resolve(root)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{MetadataPath, PathError, PathSegment, resolve_attribute, tokenize};
    use crate::{MetadataAttribute, MetadataElement};

    fn dsd_tree() -> MetadataElement {
        let mut outer = MetadataElement::new("DSD");
        for idx in 1..=4 {
            outer.add_element(
                MetadataElement::new("DSD")
                    .with_attribute(MetadataAttribute::new("Name", format!("ABC_{idx}"))),
            );
        }
        MetadataElement::new("metadata")
            .with_element(outer)
            .with_element(
                MetadataElement::new("test_2")
                    .with_attribute(MetadataAttribute::new("attrib", "abc"))
                    .with_attribute(MetadataAttribute::new("attrib", "def"))
                    .with_attribute(MetadataAttribute::new("attrib", "ghi")),
            )
            .with_element(
                MetadataElement::new("a/b").with_attribute(MetadataAttribute::new("c", "slashed")),
            )
    }

    #[test]
    fn doubled_separator_escapes_a_slash() {
        assert_eq!(tokenize("a//b/c").expect("tokens"), vec!["a/b", "c"]);
        assert_eq!(tokenize("a/b/c").expect("tokens"), vec!["a", "b", "c"]);
        assert_eq!(tokenize("x//y//z").expect("tokens"), vec!["x/y/z"]);
    }

    #[test]
    fn dangling_separators_are_malformed() {
        for path in ["/a", "a/", "a//"] {
            let err = tokenize(path).expect_err("dangling separator");
            assert!(err.is_malformed(), "{path}: {err}");
        }
        assert_eq!(tokenize(""), Err(PathError::Empty));
    }

    #[test]
    fn indexed_element_selects_kth_sibling() {
        let root = dsd_tree();
        let attribute = resolve_attribute(&root, "DSD/DSD[2]/Name").expect("resolves");
        assert_eq!(attribute.value.elem_string(), "ABC_2");

        let last = resolve_attribute(&root, "DSD/DSD[4]/Name").expect("resolves");
        assert_eq!(last.value.elem_string(), "ABC_4");

        let first = resolve_attribute(&root, "DSD/DSD/Name").expect("resolves");
        assert_eq!(first.value.elem_string(), "ABC_1");
    }

    #[test]
    fn indexed_attribute_selects_kth_attribute() {
        let root = dsd_tree();
        let attribute = resolve_attribute(&root, "test_2/attrib[3]").expect("resolves");
        assert_eq!(attribute.value.elem_string(), "ghi");
        let first = resolve_attribute(&root, "test_2/attrib").expect("resolves");
        assert_eq!(first.value.elem_string(), "abc");
    }

    #[test]
    fn indexed_attribute_falls_back_to_literal_name() {
        let root = MetadataElement::new("root").with_element(
            MetadataElement::new("bands")
                .with_attribute(MetadataAttribute::new("band", "first"))
                .with_attribute(MetadataAttribute::new("band[2]", "literal")),
        );
        let attribute = resolve_attribute(&root, "bands/band[2]").expect("literal attribute");
        assert_eq!(attribute.value.elem_string(), "literal");

        let indexed = resolve_attribute(&root, "bands/band[1]").expect("first band");
        assert_eq!(indexed.value.elem_string(), "first");

        let err = resolve_attribute(&root, "bands/band[3]").expect_err("no third band");
        assert!(matches!(err, PathError::AttributeNotFound { ref segment, .. } if segment == "band[3]"));
    }

    #[test]
    fn indexed_element_has_no_literal_fallback() {
        let root = MetadataElement::new("root")
            .with_element(MetadataElement::new("DSD[2]").with_attribute(MetadataAttribute::new("Name", "x")));
        let err = resolve_attribute(&root, "DSD[2]/Name").expect_err("no second DSD");
        assert!(matches!(err, PathError::ElementNotFound { .. }));
    }

    #[test]
    fn escaped_name_resolves() {
        let root = dsd_tree();
        let attribute = resolve_attribute(&root, "a//b/c").expect("resolves");
        assert_eq!(attribute.value.elem_string(), "slashed");
    }

    #[test]
    fn missing_segment_names_the_offending_segment() {
        let root = dsd_tree();
        let err = resolve_attribute(&root, "DSD/DSD[5]/Name").expect_err("fifth DSD is absent");
        assert_eq!(
            err,
            PathError::ElementNotFound {
                path: "DSD/DSD[5]/Name".to_owned(),
                segment: "DSD[5]".to_owned(),
            }
        );
        assert!(err.is_not_found());

        let err = resolve_attribute(&root, "DSD/DSD[1]/Nope").expect_err("attribute absent");
        assert!(matches!(err, PathError::AttributeNotFound { ref segment, .. } if segment == "Nope"));
    }

    #[test]
    fn non_positive_index_is_rejected_eagerly() {
        let err = MetadataPath::parse("DSD/DSD[0]/Name").expect_err("zero index");
        assert!(matches!(err, PathError::NonPositiveIndex { index: 0, .. }));
        let err = MetadataPath::parse("DSD[-3]/Name").expect_err("negative index");
        assert!(matches!(err, PathError::NonPositiveIndex { index: -3, .. }));
        let err = MetadataPath::parse("DSD[99999999999999999999]/Name").expect_err("overflow");
        assert!(matches!(err, PathError::UnparsableIndex { .. }));
    }

    #[test]
    fn non_numeric_brackets_are_part_of_the_name() {
        let segment: PathSegment = "band[red]".parse().expect("segment");
        assert_eq!(segment.name(), "band[red]");
        assert!(!segment.has_explicit_occurrence());
        assert_eq!(segment.occurrence(), 1);
    }

    #[test]
    fn parsed_path_splits_elements_from_attribute() {
        let path = MetadataPath::parse("Processing/Step[2]/Version").expect("path");
        let names = path
            .elements()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Processing", "Step[2]"]);
        assert_eq!(path.attribute().name(), "Version");
        assert_eq!(path.as_str(), "Processing/Step[2]/Version");
    }

    #[test]
    fn single_segment_addresses_root_attribute() {
        let root = MetadataElement::new("root").with_attribute(MetadataAttribute::new("id", "x"));
        let attribute = resolve_attribute(&root, "id").expect("root attribute");
        assert_eq!(attribute.value.elem_string(), "x");
    }

    proptest! {
        #[test]
        fn escaped_names_round_trip(
            names in prop::collection::vec("[A-Za-z0-9_]{1,6}(/[A-Za-z0-9_]{1,6}){0,2}", 1..5)
        ) {
            let path = names
                .iter()
                .map(|name| name.replace('/', "//"))
                .collect::<Vec<_>>()
                .join("/");
            let tokens = tokenize(&path).expect("well-formed path");
            prop_assert_eq!(tokens, names);
        }
    }
}
