#![no_main]

use libfuzzer_sys::fuzz_target;
use rv_metadata::{MetadataAttribute, MetadataElement, MetadataPath, resolve_attribute};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let root = MetadataElement::new("metadata").with_element(
        MetadataElement::new("DSD")
            .with_element(MetadataElement::new("DSD").with_attribute(MetadataAttribute::new("Name", "ABC_1")))
            .with_element(MetadataElement::new("DSD").with_attribute(MetadataAttribute::new("Name", "ABC_2"))),
    );

    match MetadataPath::parse(text) {
        Ok(path) => {
            assert_eq!(path.as_str(), text);
            if let Err(err) = path.resolve(&root) {
                assert!(err.is_not_found(), "parsed path failed to resolve with {err:?}");
            }
        }
        Err(err) => {
            assert!(err.is_malformed(), "parse failed with a lookup error {err:?}");
            assert!(resolve_attribute(&root, text).is_err());
        }
    }
});
