#![forbid(unsafe_code)]

//! Acceptance oracle for raster product decoders.
//!
//! A decoder turns a product file into a [`Dataset`]. An
//! [`ExpectedDataset`] document declares what that dataset must contain;
//! [`verify`] walks both and returns every mismatch as a [`Failure`]. The
//! [`harness`] module runs whole decoder suites from fixture directories.

pub use rv_dataset::{
    AffineGeoCoding, BandView, CodingSample, Dataset, DatasetError, GeoCoding, MaskView,
    MemoryBand, MemoryDataset, MemoryMask, MemoryTiePointGrid, Named, RasterProperties,
    SampleCoding, SampledRaster, TiePointGridView,
};
pub use rv_expect::{
    Declared, ExpectationError, ExpectedBand, ExpectedContent, ExpectedDataset, ExpectedGeoCoding,
    ExpectedGeoCoordinate, ExpectedMask, ExpectedMetadata, ExpectedPixel, ExpectedSample,
    ExpectedSampleCoding, ExpectedTiePointGrid,
};
pub use rv_metadata::{
    AttributeValue, MetadataAttribute, MetadataElement, MetadataPath, PathError, resolve_attribute,
};
pub use rv_types::{
    AffineTransform, Color, DecodeQualification, FIXED_TOLERANCE, GeoPos, PixelPos, TypeError,
    approx_eq, format_utc, tolerance,
};
pub use rv_verify::{Failure, FailureKind, verify};

pub mod harness {
    pub use rv_harness::*;
}
