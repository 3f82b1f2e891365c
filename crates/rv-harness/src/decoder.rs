//! Decoder boundary. Decoders are registered explicitly; there is no
//! discovery step.

use std::path::Path;

use rv_dataset::{Dataset, DatasetError, MemoryDataset};
use rv_types::DecodeQualification;

use crate::HarnessError;

/// A format reader under acceptance test.
pub trait Decoder {
    /// Stable identifier. Also names the decoder's fixture directory.
    fn name(&self) -> &str;

    fn decode_qualification(&self, path: &Path) -> DecodeQualification;

    fn read(&self, path: &Path) -> Result<Box<dyn Dataset>, DatasetError>;
}

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the decoders shipped with the harness.
    #[must_use]
    pub fn with_builtin() -> Self {
        Self {
            decoders: vec![Box::new(SceneDocumentDecoder)],
        }
    }

    pub fn register(&mut self, decoder: Box<dyn Decoder>) -> Result<(), HarnessError> {
        if self.get(decoder.name()).is_some() {
            return Err(HarnessError::DuplicateDecoder {
                name: decoder.name().to_owned(),
            });
        }
        self.decoders.push(decoder);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Decoder> {
        self.iter().find(|decoder| decoder.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Decoder> {
        self.decoders.iter().map(|decoder| decoder.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|decoder| decoder.name()))
            .finish()
    }
}

pub const SCENE_DOCUMENT_SUFFIX: &str = ".scene.json";

/// Reads serialized [`MemoryDataset`] documents (`*.scene.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneDocumentDecoder;

impl Decoder for SceneDocumentDecoder {
    fn name(&self) -> &str {
        "scene-document"
    }

    fn decode_qualification(&self, path: &Path) -> DecodeQualification {
        let is_scene_document = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(SCENE_DOCUMENT_SUFFIX));
        if is_scene_document && path.is_file() {
            DecodeQualification::Intended
        } else {
            DecodeQualification::Unable
        }
    }

    fn read(&self, path: &Path) -> Result<Box<dyn Dataset>, DatasetError> {
        if self.decode_qualification(path) == DecodeQualification::Unable {
            return Err(DatasetError::Unreadable {
                path: path.display().to_string(),
                reason: format!("not a {SCENE_DOCUMENT_SUFFIX} file"),
            });
        }
        Ok(Box::new(MemoryDataset::from_path(path)?))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rv_dataset::Named;
    use rv_types::DecodeQualification;

    use super::{Decoder, DecoderRegistry, SceneDocumentDecoder};
    use crate::HarnessError;

    #[test]
    fn scene_documents_are_intended_and_other_files_unable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scene = dir.path().join("tiny.scene.json");
        fs::write(&scene, r#"{"name": "tiny", "sceneWidth": 1, "sceneHeight": 1}"#)
            .expect("write scene");
        let other = dir.path().join("tiny.json");
        fs::write(&other, "{}").expect("write other");

        let decoder = SceneDocumentDecoder;
        assert_eq!(decoder.decode_qualification(&scene), DecodeQualification::Intended);
        assert_eq!(decoder.decode_qualification(&other), DecodeQualification::Unable);
        assert_eq!(
            decoder.decode_qualification(&dir.path().join("missing.scene.json")),
            DecodeQualification::Unable
        );

        let dataset = decoder.read(&scene).expect("read scene");
        assert_eq!(dataset.name(), "tiny");
        assert!(decoder.read(&other).is_err());
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = DecoderRegistry::with_builtin();
        assert_eq!(registry.len(), 1);
        let err = registry
            .register(Box::new(SceneDocumentDecoder))
            .expect_err("duplicate decoder");
        assert!(matches!(err, HarnessError::DuplicateDecoder { ref name } if name == "scene-document"));
        assert!(registry.get("scene-document").is_some());
        assert!(DecoderRegistry::new().is_empty());
    }
}
