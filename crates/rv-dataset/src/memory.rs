use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use rv_metadata::MetadataElement;
use rv_types::{AffineTransform, Color, GeoPos, PixelPos, float_text};
use serde::{Deserialize, Serialize};

use crate::{
    BandView, Dataset, DatasetError, GeoCoding, MaskView, Named, RasterProperties, SampleCoding,
    SampledRaster, TiePointGridView,
};

fn nan() -> f64 {
    f64::NAN
}

fn unit_sub_sampling() -> f64 {
    1.0
}

fn checked_len(raster: &str, width: i64, height: i64) -> Result<usize, DatasetError> {
    let len = usize::try_from(width)
        .ok()
        .zip(usize::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h));
    len.ok_or_else(|| DatasetError::MalformedRaster {
        raster: raster.to_owned(),
        reason: format!("invalid size {width}x{height}"),
    })
}

fn row_major_index(width: i64, x: i64, y: i64) -> Option<usize> {
    let index = y.checked_mul(width)?.checked_add(x)?;
    usize::try_from(index).ok()
}

fn matches_no_data(value: f32, no_data: f64) -> bool {
    let no_data = no_data as f32;
    value == no_data || (value.is_nan() && no_data.is_nan())
}

/// Affine map geocoding: `image_to_map` takes pixel `(x, y)` to
/// `(lon, lat)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffineGeoCoding {
    pub image_to_map: AffineTransform,
}

impl AffineGeoCoding {
    #[must_use]
    pub const fn new(image_to_map: AffineTransform) -> Self {
        Self { image_to_map }
    }
}

impl GeoCoding for AffineGeoCoding {
    fn geo_pos(&self, pixel: PixelPos) -> GeoPos {
        let (lon, lat) = self.image_to_map.transform(pixel.x, pixel.y);
        GeoPos::new(lat, lon)
    }

    fn pixel_pos(&self, geo: GeoPos) -> PixelPos {
        match self.image_to_map.inverse() {
            Ok(map_to_image) => {
                let (x, y) = map_to_image.transform(geo.lon, geo.lat);
                PixelPos::new(x, y)
            }
            Err(_) => PixelPos::new(f64::NAN, f64::NAN),
        }
    }

    fn image_to_map(&self) -> Option<AffineTransform> {
        Some(self.image_to_map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryBand {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub width: i64,
    pub height: i64,
    #[serde(with = "float_text::samples")]
    pub samples: Vec<f32>,
    /// Per-pixel validity, row-major. Absent means every in-raster pixel
    /// passes this check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_mask: Option<Vec<bool>>,
    #[serde(default = "nan", with = "float_text")]
    pub no_data_value: f64,
    #[serde(default)]
    pub no_data_value_used: bool,
    #[serde(default)]
    pub spectral_wavelength: f32,
    #[serde(default)]
    pub spectral_bandwidth: f32,
    #[serde(default)]
    pub image_to_model: AffineTransform,
}

impl MemoryBand {
    #[must_use]
    pub fn new(name: impl Into<String>, width: i64, height: i64, samples: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            description: None,
            unit: None,
            width,
            height,
            samples,
            valid_mask: None,
            no_data_value: f64::NAN,
            no_data_value_used: false,
            spectral_wavelength: 0.0,
            spectral_bandwidth: 0.0,
            image_to_model: AffineTransform::identity(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn with_no_data(mut self, value: f64) -> Self {
        self.no_data_value = value;
        self.no_data_value_used = true;
        self
    }

    #[must_use]
    pub fn with_valid_mask(mut self, mask: Vec<bool>) -> Self {
        self.valid_mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_spectral(mut self, wavelength: f32, bandwidth: f32) -> Self {
        self.spectral_wavelength = wavelength;
        self.spectral_bandwidth = bandwidth;
        self
    }

    #[must_use]
    pub fn with_image_to_model(mut self, transform: AffineTransform) -> Self {
        self.image_to_model = transform;
        self
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        let expected = checked_len(&self.name, self.width, self.height)?;
        if self.samples.len() != expected {
            return Err(DatasetError::SampleCountMismatch {
                raster: self.name.clone(),
                expected,
                actual: self.samples.len(),
            });
        }
        match &self.valid_mask {
            Some(mask) if mask.len() != expected => Err(DatasetError::MalformedRaster {
                raster: self.name.clone(),
                reason: format!("validity mask holds {} bits, expected {expected}", mask.len()),
            }),
            _ => Ok(()),
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if self.contains_pixel(x, y) {
            row_major_index(self.width, x, y)
        } else {
            None
        }
    }
}

impl Named for MemoryBand {
    fn name(&self) -> &str {
        &self.name
    }
}

impl SampledRaster for MemoryBand {
    fn raster_width(&self) -> i64 {
        self.width
    }

    fn raster_height(&self) -> i64 {
        self.height
    }

    fn is_pixel_valid(&self, x: i64, y: i64) -> bool {
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        let masked_in = self
            .valid_mask
            .as_ref()
            .is_none_or(|mask| mask.get(idx).copied().unwrap_or(false));
        if !masked_in {
            return false;
        }
        match self.samples.get(idx) {
            Some(value) => !(self.no_data_value_used && matches_no_data(*value, self.no_data_value)),
            None => false,
        }
    }

    fn sample_f32(&self, x: i64, y: i64) -> Result<f32, DatasetError> {
        self.index(x, y)
            .and_then(|idx| self.samples.get(idx).copied())
            .ok_or_else(|| DatasetError::PixelOutOfBounds {
                raster: self.name.clone(),
                x,
                y,
                width: self.width,
                height: self.height,
            })
    }
}

impl RasterProperties for MemoryBand {
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn no_data_value(&self) -> f64 {
        self.no_data_value
    }

    fn is_no_data_value_used(&self) -> bool {
        self.no_data_value_used
    }
}

impl BandView for MemoryBand {
    fn spectral_wavelength(&self) -> f32 {
        self.spectral_wavelength
    }

    fn spectral_bandwidth(&self) -> f32 {
        self.spectral_bandwidth
    }

    fn image_to_model(&self) -> AffineTransform {
        self.image_to_model
    }
}

/// Sparse grid of tie points, bilinearly interpolated onto the scene raster.
///
/// Tie point `(i, j)` sits at scene position
/// `(offset_x + i * sub_sampling_x, offset_y + j * sub_sampling_y)`; scene
/// pixels are sampled at their centers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTiePointGrid {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub grid_width: i64,
    pub grid_height: i64,
    #[serde(with = "float_text::samples")]
    pub tie_points: Vec<f32>,
    pub raster_width: i64,
    pub raster_height: i64,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default = "unit_sub_sampling")]
    pub sub_sampling_x: f64,
    #[serde(default = "unit_sub_sampling")]
    pub sub_sampling_y: f64,
    #[serde(default = "nan", with = "float_text")]
    pub no_data_value: f64,
    #[serde(default)]
    pub no_data_value_used: bool,
}

impl MemoryTiePointGrid {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        grid_width: i64,
        grid_height: i64,
        tie_points: Vec<f32>,
        raster_width: i64,
        raster_height: i64,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            unit: None,
            grid_width,
            grid_height,
            tie_points,
            raster_width,
            raster_height,
            offset_x: 0.0,
            offset_y: 0.0,
            sub_sampling_x: 1.0,
            sub_sampling_y: 1.0,
            no_data_value: f64::NAN,
            no_data_value_used: false,
        }
    }

    #[must_use]
    pub fn with_geometry(mut self, offset_x: f64, offset_y: f64, sub_x: f64, sub_y: f64) -> Self {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self.sub_sampling_x = sub_x;
        self.sub_sampling_y = sub_y;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.grid_width < 1 || self.grid_height < 1 {
            return Err(DatasetError::MalformedRaster {
                raster: self.name.clone(),
                reason: format!("empty grid {}x{}", self.grid_width, self.grid_height),
            });
        }
        if !(self.sub_sampling_x > 0.0 && self.sub_sampling_y > 0.0) {
            return Err(DatasetError::MalformedRaster {
                raster: self.name.clone(),
                reason: "sub-sampling must be positive".to_owned(),
            });
        }
        checked_len(&self.name, self.raster_width, self.raster_height)?;
        let expected = checked_len(&self.name, self.grid_width, self.grid_height)?;
        if self.tie_points.len() != expected {
            return Err(DatasetError::SampleCountMismatch {
                raster: self.name.clone(),
                expected,
                actual: self.tie_points.len(),
            });
        }
        Ok(())
    }

    fn tie_point(&self, i: i64, j: i64) -> f64 {
        row_major_index(self.grid_width, i, j)
            .and_then(|idx| self.tie_points.get(idx))
            .map_or(f64::NAN, |value| f64::from(*value))
    }

    fn interpolate(&self, x: i64, y: i64) -> f32 {
        let fi = (x as f64 + 0.5 - self.offset_x) / self.sub_sampling_x;
        let fj = (y as f64 + 0.5 - self.offset_y) / self.sub_sampling_y;
        let (i0, i1, wi) = grid_cell(fi, self.grid_width);
        let (j0, j1, wj) = grid_cell(fj, self.grid_height);

        let top = (1.0 - wi) * self.tie_point(i0, j0) + wi * self.tie_point(i1, j0);
        let bottom = (1.0 - wi) * self.tie_point(i0, j1) + wi * self.tie_point(i1, j1);
        ((1.0 - wj) * top + wj * bottom) as f32
    }
}

/// Lower and upper tie-point index around fractional grid position `f`, with
/// the weight of the upper one. Indices are clamped to the grid; positions
/// beyond the border extrapolate from the outermost cell.
fn grid_cell(f: f64, extent: i64) -> (i64, i64, f64) {
    if extent < 2 {
        return (0, 0, 0.0);
    }
    let base = f.floor().clamp(0.0, (extent - 2) as f64) as i64;
    (base, base + 1, f - base as f64)
}

impl Named for MemoryTiePointGrid {
    fn name(&self) -> &str {
        &self.name
    }
}

impl SampledRaster for MemoryTiePointGrid {
    fn raster_width(&self) -> i64 {
        self.raster_width
    }

    fn raster_height(&self) -> i64 {
        self.raster_height
    }

    fn is_pixel_valid(&self, x: i64, y: i64) -> bool {
        if !self.contains_pixel(x, y) {
            return false;
        }
        !(self.no_data_value_used && matches_no_data(self.interpolate(x, y), self.no_data_value))
    }

    fn sample_f32(&self, x: i64, y: i64) -> Result<f32, DatasetError> {
        if !self.contains_pixel(x, y) {
            return Err(DatasetError::PixelOutOfBounds {
                raster: self.name.clone(),
                x,
                y,
                width: self.raster_width,
                height: self.raster_height,
            });
        }
        Ok(self.interpolate(x, y))
    }
}

impl RasterProperties for MemoryTiePointGrid {
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn no_data_value(&self) -> f64 {
        self.no_data_value
    }

    fn is_no_data_value_used(&self) -> bool {
        self.no_data_value_used
    }
}

impl TiePointGridView for MemoryTiePointGrid {
    fn offset_x(&self) -> f64 {
        self.offset_x
    }

    fn offset_y(&self) -> f64 {
        self.offset_y
    }

    fn sub_sampling_x(&self) -> f64 {
        self.sub_sampling_x
    }

    fn sub_sampling_y(&self) -> f64 {
        self.sub_sampling_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMask {
    pub name: String,
    pub image_type: String,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MemoryMask {
    #[must_use]
    pub fn new(name: impl Into<String>, image_type: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            image_type: image_type.into(),
            color,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Named for MemoryMask {
    fn name(&self) -> &str {
        &self.name
    }
}

impl MaskView for MemoryMask {
    fn image_type(&self) -> &str {
        &self.image_type
    }

    fn color(&self) -> Color {
        self.color
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Fully materialized dataset. Serialized as a scene document
/// (`*.scene.json`) with camelCase keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDataset {
    pub name: String,
    pub scene_width: i64,
    pub scene_height: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_coding: Option<AffineGeoCoding>,
    #[serde(default)]
    pub flag_codings: Vec<SampleCoding>,
    #[serde(default)]
    pub index_codings: Vec<SampleCoding>,
    #[serde(default)]
    pub tie_point_grids: Vec<MemoryTiePointGrid>,
    #[serde(default)]
    pub bands: Vec<MemoryBand>,
    #[serde(default)]
    pub masks: Vec<MemoryMask>,
    #[serde(default)]
    pub metadata: MetadataElement,
    #[serde(default)]
    pub shared_model_crs: bool,
}

impl MemoryDataset {
    #[must_use]
    pub fn new(name: impl Into<String>, scene_width: i64, scene_height: i64) -> Self {
        Self {
            name: name.into(),
            scene_width,
            scene_height,
            start_time: None,
            end_time: None,
            geo_coding: None,
            flag_codings: Vec::new(),
            index_codings: Vec::new(),
            tie_point_grids: Vec::new(),
            bands: Vec::new(),
            masks: Vec::new(),
            metadata: MetadataElement::new("metadata"),
            shared_model_crs: false,
        }
    }

    pub fn from_json_str(body: &str) -> Result<Self, DatasetError> {
        let dataset: Self = serde_json::from_str(body)?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Check buffer sizes against declared raster dimensions.
    pub fn validate(&self) -> Result<(), DatasetError> {
        checked_len(&self.name, self.scene_width, self.scene_height)?;
        for band in &self.bands {
            band.validate()?;
        }
        for grid in &self.tie_point_grids {
            grid.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn with_band(mut self, band: MemoryBand) -> Self {
        self.bands.push(band);
        self
    }

    #[must_use]
    pub fn with_tie_point_grid(mut self, grid: MemoryTiePointGrid) -> Self {
        self.tie_point_grids.push(grid);
        self
    }

    #[must_use]
    pub fn with_mask(mut self, mask: MemoryMask) -> Self {
        self.masks.push(mask);
        self
    }

    #[must_use]
    pub fn with_flag_coding(mut self, coding: SampleCoding) -> Self {
        self.flag_codings.push(coding);
        self
    }

    #[must_use]
    pub fn with_index_coding(mut self, coding: SampleCoding) -> Self {
        self.index_codings.push(coding);
        self
    }

    #[must_use]
    pub fn with_geo_coding(mut self, geo_coding: AffineGeoCoding) -> Self {
        self.geo_coding = Some(geo_coding);
        self
    }

    #[must_use]
    pub fn with_times(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, root: MetadataElement) -> Self {
        self.metadata = root;
        self
    }
}

impl Named for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Dataset for MemoryDataset {
    fn scene_width(&self) -> i64 {
        self.scene_width
    }

    fn scene_height(&self) -> i64 {
        self.scene_height
    }

    fn start_time(&self) -> Option<NaiveDateTime> {
        self.start_time
    }

    fn end_time(&self) -> Option<NaiveDateTime> {
        self.end_time
    }

    fn scene_geo_coding(&self) -> Option<&dyn GeoCoding> {
        self.geo_coding
            .as_ref()
            .map(|geo_coding| geo_coding as &dyn GeoCoding)
    }

    fn flag_coding(&self, name: &str) -> Option<&SampleCoding> {
        self.flag_codings.iter().find(|coding| coding.name == name)
    }

    fn index_coding(&self, name: &str) -> Option<&SampleCoding> {
        self.index_codings.iter().find(|coding| coding.name == name)
    }

    fn tie_point_grid(&self, name: &str) -> Option<&dyn TiePointGridView> {
        self.tie_point_grids
            .iter()
            .find(|grid| grid.name == name)
            .map(|grid| grid as &dyn TiePointGridView)
    }

    fn band(&self, name: &str) -> Option<&dyn BandView> {
        self.bands
            .iter()
            .find(|band| band.name == name)
            .map(|band| band as &dyn BandView)
    }

    fn mask(&self, name: &str) -> Option<&dyn MaskView> {
        self.masks
            .iter()
            .find(|mask| mask.name == name)
            .map(|mask| mask as &dyn MaskView)
    }

    fn metadata_root(&self) -> &MetadataElement {
        &self.metadata
    }

    fn is_multi_size(&self) -> bool {
        self.bands
            .iter()
            .any(|band| band.width != self.scene_width || band.height != self.scene_height)
    }

    fn is_scene_crs_shared_model_crs(&self) -> bool {
        self.shared_model_crs
    }
}
