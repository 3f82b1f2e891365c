#![forbid(unsafe_code)]

//! Query surface the content verifier needs from a decoded dataset.
//!
//! Decoders hand out a `Box<dyn Dataset>`; the verifier only reads through
//! these traits and never takes ownership of the dataset. The [`memory`]
//! module provides a serde-backed implementation used by the scene-document
//! decoder and by tests.

pub mod memory;

use chrono::NaiveDateTime;
use rv_metadata::MetadataElement;
use rv_types::{AffineTransform, Color, GeoPos, PixelPos, TypeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{AffineGeoCoding, MemoryBand, MemoryDataset, MemoryMask, MemoryTiePointGrid};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("pixel ({x},{y}) is outside raster '{raster}' of size {width}x{height}")]
    PixelOutOfBounds {
        raster: String,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
    #[error("raster '{raster}' holds {actual} samples, expected {expected}")]
    SampleCountMismatch {
        raster: String,
        expected: usize,
        actual: usize,
    },
    #[error("raster '{raster}' is malformed: {reason}")]
    MalformedRaster { raster: String, reason: String },
    #[error("cannot read '{path}': {reason}")]
    Unreadable { path: String, reason: String },
}

pub trait Named {
    fn name(&self) -> &str;
}

/// A 2D raster that can be sampled at integer pixel positions.
pub trait SampledRaster: Named {
    fn raster_width(&self) -> i64;

    fn raster_height(&self) -> i64;

    fn contains_pixel(&self, x: i64, y: i64) -> bool {
        (0..self.raster_width()).contains(&x) && (0..self.raster_height()).contains(&y)
    }

    /// False for out-of-raster positions and for pixels masked out by the
    /// raster's validity rules.
    fn is_pixel_valid(&self, x: i64, y: i64) -> bool;

    fn sample_f32(&self, x: i64, y: i64) -> Result<f32, DatasetError>;
}

/// Descriptive properties shared by bands and tie-point grids.
pub trait RasterProperties: SampledRaster {
    fn description(&self) -> Option<&str>;

    fn unit(&self) -> Option<&str>;

    fn no_data_value(&self) -> f64;

    fn is_no_data_value_used(&self) -> bool;
}

pub trait TiePointGridView: RasterProperties {
    fn offset_x(&self) -> f64;

    fn offset_y(&self) -> f64;

    fn sub_sampling_x(&self) -> f64;

    fn sub_sampling_y(&self) -> f64;
}

pub trait BandView: RasterProperties {
    fn spectral_wavelength(&self) -> f32;

    fn spectral_bandwidth(&self) -> f32;

    /// Maps this band's image pixels into the dataset's model (map) space.
    fn image_to_model(&self) -> AffineTransform;
}

pub trait MaskView: Named {
    /// Identifier of the rendering rule behind the mask, e.g. `"Maths"`.
    fn image_type(&self) -> &str;

    fn color(&self) -> Color;

    fn description(&self) -> Option<&str>;
}

/// Bidirectional pixel/geographic mapping of a scene.
pub trait GeoCoding {
    fn geo_pos(&self, pixel: PixelPos) -> GeoPos;

    /// Reverse projection. Positions that cannot be projected come back as
    /// `PixelPos(NaN, NaN)`.
    fn pixel_pos(&self, geo: GeoPos) -> PixelPos;

    /// Image-to-map transform, when the geocoding is map based.
    fn image_to_map(&self) -> Option<AffineTransform>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingSample {
    pub name: String,
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CodingSample {
    #[must_use]
    pub fn new(name: impl Into<String>, value: u32) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Named enumeration of sample meanings, used for both flag and index
/// codings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCoding {
    pub name: String,
    #[serde(default)]
    pub samples: Vec<CodingSample>,
}

impl SampleCoding {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sample(mut self, sample: CodingSample) -> Self {
        self.samples.push(sample);
        self
    }

    #[must_use]
    pub fn sample(&self, name: &str) -> Option<&CodingSample> {
        self.samples.iter().find(|sample| sample.name == name)
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }
}

impl Named for SampleCoding {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A decoded raster product.
pub trait Dataset: Named {
    fn scene_width(&self) -> i64;

    fn scene_height(&self) -> i64;

    fn start_time(&self) -> Option<NaiveDateTime>;

    fn end_time(&self) -> Option<NaiveDateTime>;

    fn scene_geo_coding(&self) -> Option<&dyn GeoCoding>;

    fn flag_coding(&self, name: &str) -> Option<&SampleCoding>;

    fn index_coding(&self, name: &str) -> Option<&SampleCoding>;

    fn tie_point_grid(&self, name: &str) -> Option<&dyn TiePointGridView>;

    fn band(&self, name: &str) -> Option<&dyn BandView>;

    fn mask(&self, name: &str) -> Option<&dyn MaskView>;

    fn metadata_root(&self) -> &MetadataElement;

    /// True when at least one band is not sized like the scene raster.
    fn is_multi_size(&self) -> bool;

    /// True when every band's model space is the scene's map CRS.
    fn is_scene_crs_shared_model_crs(&self) -> bool;
}
