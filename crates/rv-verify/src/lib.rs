#![forbid(unsafe_code)]

//! Content verifier.
//!
//! [`verify`] compares one decoded dataset with the content section of its
//! expectation document. Only declared fields are checked. Mismatches never
//! abort the walk: each one becomes a [`Failure`] and verification moves on,
//! so a single run reports the complete discrepancy set.

use std::fmt;

use rv_dataset::{
    BandView, Dataset, GeoCoding, MaskView, RasterProperties, SampleCoding, SampledRaster,
    TiePointGridView,
};
use rv_expect::{
    Declared, ExpectedBand, ExpectedContent, ExpectedGeoCoding, ExpectedMask, ExpectedMetadata,
    ExpectedPixel, ExpectedSampleCoding, ExpectedTiePointGrid,
};
use rv_metadata::{MetadataPath, PathError};
use rv_types::{
    AffineTransform, FIXED_TOLERANCE, PixelPos, TypeError, approx_eq, format_utc, parse_number,
    tolerance,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A declared band, coding, mask, grid or metadata node is missing.
    StructuralAbsence,
    ValueMismatch,
    MalformedPath,
    /// A declared text field does not parse as the number it stands for.
    MalformedExpectation,
    /// The dataset cannot support a declared section at all.
    PreconditionViolation,
    /// The dataset failed while a pixel was being read.
    SampleAccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl Failure {
    #[must_use]
    pub fn new(kind: FailureKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            expected: None,
            actual: None,
        }
    }

    #[must_use]
    pub fn mismatch(label: impl Into<String>, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self {
            kind: FailureKind::ValueMismatch,
            label: label.into(),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.actual = Some(detail.to_string());
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, &self.actual) {
            (Some(expected), Some(actual)) => {
                write!(f, "{}: expected <{expected}> but was <{actual}>", self.label)
            }
            (None, Some(detail)) => write!(f, "{}: {detail}", self.label),
            _ => f.write_str(&self.label),
        }
    }
}

/// Verify `dataset` against `expected`, labelling failures with
/// `dataset_label`. The result is empty when every declared field matches.
#[must_use]
pub fn verify(expected: &ExpectedContent, dataset_label: &str, dataset: &dyn Dataset) -> Vec<Failure> {
    let mut verifier = ContentVerifier {
        label: dataset_label,
        dataset,
        failures: Vec::new(),
    };
    verifier.scene_properties(expected);
    if let Some(geo_coding) = &expected.geo_coding {
        verifier.geo_coding(geo_coding);
    }
    for coding in &expected.flag_codings {
        verifier.sample_coding("FlagCoding", coding, dataset.flag_coding(&coding.name));
    }
    for coding in &expected.index_codings {
        verifier.sample_coding("IndexCoding", coding, dataset.index_coding(&coding.name));
    }
    for grid in &expected.tie_point_grids {
        verifier.tie_point_grid(grid);
    }
    for band in &expected.bands {
        verifier.band(band);
    }
    for mask in &expected.masks {
        verifier.mask(mask);
    }
    for entry in &expected.metadata {
        verifier.metadata(entry);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        dataset = dataset_label,
        failures = verifier.failures.len(),
        "verified dataset content"
    );

    verifier.failures
}

struct ContentVerifier<'a> {
    label: &'a str,
    dataset: &'a dyn Dataset,
    failures: Vec<Failure>,
}

impl ContentVerifier<'_> {
    fn fail(&mut self, failure: Failure) {
        #[cfg(feature = "tracing")]
        tracing::trace!(kind = ?failure.kind, label = %failure.label, "content mismatch");
        self.failures.push(failure);
    }

    fn expect_eq<T: PartialEq + fmt::Display>(&mut self, label: String, expected: T, actual: T) {
        if expected != actual {
            self.fail(Failure::mismatch(label, expected, actual));
        }
    }

    fn expect_close(&mut self, label: String, expected: f64, actual: f64, tolerance: f64) {
        if !approx_eq(expected, actual, tolerance) {
            self.fail(Failure::mismatch(label, expected, actual));
        }
    }

    fn expect_text(&mut self, label: String, expected: &Declared<String>, actual: Option<&str>) {
        let matches = match expected {
            Declared::Absent => true,
            Declared::Null => actual.is_none(),
            Declared::Value(text) => actual == Some(text.as_str()),
        };
        if !matches {
            self.fail(Failure::mismatch(
                label,
                declared_text(expected),
                actual.unwrap_or("null"),
            ));
        }
    }

    fn malformed(&mut self, label: String, error: &TypeError) {
        self.fail(Failure::new(FailureKind::MalformedExpectation, label).with_detail(error));
    }

    fn scene_properties(&mut self, expected: &ExpectedContent) {
        if let Some(width) = expected.scene_width {
            self.expect_eq(format!("{} SceneWidth", self.label), width, self.dataset.scene_width());
        }
        if let Some(height) = expected.scene_height {
            self.expect_eq(format!("{} SceneHeight", self.label), height, self.dataset.scene_height());
        }
        let start = self.dataset.start_time().map(|time| format_utc(&time));
        self.expect_text(format!("{} StartTime", self.label), &expected.start_time, start.as_deref());
        let end = self.dataset.end_time().map(|time| format_utc(&time));
        self.expect_text(format!("{} EndTime", self.label), &expected.end_time, end.as_deref());
    }

    fn geo_coding(&mut self, expected: &ExpectedGeoCoding) {
        if expected.coordinates.is_empty() {
            return;
        }
        let dataset = self.dataset;
        let Some(geo_coding) = dataset.scene_geo_coding() else {
            self.fail(Failure::new(
                FailureKind::PreconditionViolation,
                format!("{} has no GeoCoding", self.label),
            ));
            return;
        };

        let reverse_accuracy = expected.reverse_accuracy();
        for coordinate in &expected.coordinates {
            let pixel = PixelPos::new(coordinate.x, coordinate.y);
            let actual_geo = geo_coding.geo_pos(pixel);
            let at_pixel = format!("at Pixel({},{})", coordinate.x, coordinate.y);
            self.expect_close(
                format!("{} GeoPos.Lat {at_pixel}", self.label),
                coordinate.lat,
                actual_geo.lat,
                FIXED_TOLERANCE,
            );
            self.expect_close(
                format!("{} GeoPos.Lon {at_pixel}", self.label),
                coordinate.lon,
                actual_geo.lon,
                FIXED_TOLERANCE,
            );

            if let Some(accuracy) = reverse_accuracy {
                let actual_pixel = geo_coding.pixel_pos(actual_geo);
                let at_geo = format!("at GeoPos({},{})", actual_geo.lat, actual_geo.lon);
                self.expect_close(
                    format!("{} Pixel.X {at_geo}", self.label),
                    coordinate.x,
                    actual_pixel.x,
                    accuracy,
                );
                self.expect_close(
                    format!("{} Pixel.Y {at_geo}", self.label),
                    coordinate.y,
                    actual_pixel.y,
                    accuracy,
                );
            }
        }
    }

    fn sample_coding(&mut self, group: &str, expected: &ExpectedSampleCoding, actual: Option<&SampleCoding>) {
        let prefix = format!("{} {group} '{}'", self.label, expected.name);
        let Some(actual) = actual else {
            self.fail(Failure::new(
                FailureKind::StructuralAbsence,
                format!("{prefix} does not exist"),
            ));
            return;
        };

        self.expect_eq(
            format!("{prefix} number of samples"),
            expected.samples.len(),
            actual.num_samples(),
        );
        for sample in &expected.samples {
            let sample_prefix = format!("{prefix} sample '{}'", sample.name);
            let Some(actual_sample) = actual.sample(&sample.name) else {
                self.fail(Failure::new(
                    FailureKind::StructuralAbsence,
                    format!("{sample_prefix} does not exist"),
                ));
                continue;
            };
            self.expect_eq(format!("{sample_prefix} Value"), sample.value, actual_sample.value);
            if let Some(description) = sample.checked_description() {
                self.expect_eq(
                    format!("{sample_prefix} Description"),
                    description,
                    actual_sample.description.as_deref().unwrap_or("null"),
                );
            }
        }
    }

    /// Scalar properties shared by bands and tie-point grids.
    fn raster_properties<R: RasterProperties + ?Sized>(
        &mut self,
        prefix: &str,
        raster: &R,
        description: &Declared<String>,
        unit: &Declared<String>,
        no_data_value: Option<Result<f64, TypeError>>,
        no_data_value_used: Option<bool>,
    ) {
        self.expect_text(format!("{prefix} Description"), description, raster.description());
        self.expect_text(format!("{prefix} Unit"), unit, raster.unit());
        match no_data_value {
            Some(Ok(value)) => self.expect_close(
                format!("{prefix} NoDataValue"),
                value,
                raster.no_data_value(),
                FIXED_TOLERANCE,
            ),
            Some(Err(error)) => self.malformed(format!("{prefix} NoDataValue"), &error),
            None => {}
        }
        if let Some(used) = no_data_value_used {
            self.expect_eq(
                format!("{prefix} NoDataValueUsed"),
                used,
                raster.is_no_data_value_used(),
            );
        }
    }

    /// Read one pixel, substituting NaN for invalid pixels.
    fn read_pixel<R: SampledRaster + ?Sized>(raster: &R, x: i64, y: i64) -> Result<f32, String> {
        if !raster.is_pixel_valid(x, y) {
            return Ok(f32::NAN);
        }
        raster.sample_f32(x, y).map_err(|error| error.to_string())
    }

    fn expect_pixel(&mut self, label: String, pixel: &ExpectedPixel, read: Result<f32, String>) {
        match read {
            Ok(actual) => self.expect_close(
                label,
                f64::from(pixel.value),
                f64::from(actual),
                FIXED_TOLERANCE,
            ),
            Err(detail) => self.fail(Failure::new(FailureKind::SampleAccess, label).with_detail(detail)),
        }
    }

    fn tie_point_grid(&mut self, expected: &ExpectedTiePointGrid) {
        let dataset = self.dataset;
        let Some(grid) = dataset.tie_point_grid(&expected.name) else {
            self.fail(Failure::new(
                FailureKind::StructuralAbsence,
                format!("{} TiePointGrid '{}' does not exist", self.label, expected.name),
            ));
            return;
        };

        let prefix = format!("{} {}", self.label, expected.name);
        self.raster_properties(
            &prefix,
            grid,
            &expected.description,
            &expected.geophysical_unit,
            expected.no_data_value(),
            expected.no_data_value_used(),
        );
        let geometry = [
            ("OffsetX", expected.offset_x, grid.offset_x()),
            ("OffsetY", expected.offset_y, grid.offset_y()),
            ("SubSamplingX", expected.sub_sampling_x, grid.sub_sampling_x()),
            ("SubSamplingY", expected.sub_sampling_y, grid.sub_sampling_y()),
        ];
        for (field, declared, actual) in geometry {
            if let Some(value) = declared {
                self.expect_close(format!("{prefix} {field}"), value, actual, FIXED_TOLERANCE);
            }
        }

        for pixel in &expected.expected_pixels {
            let read = Self::read_pixel(grid, pixel.x, pixel.y);
            self.expect_pixel(format!("{prefix} Pixel({},{})", pixel.x, pixel.y), pixel, read);
        }
    }

    fn band(&mut self, expected: &ExpectedBand) {
        let dataset = self.dataset;
        let Some(band) = dataset.band(&expected.name) else {
            self.fail(Failure::new(
                FailureKind::StructuralAbsence,
                format!("{} Band '{}' does not exist", self.label, expected.name),
            ));
            return;
        };

        let prefix = format!("{} {}", self.label, expected.name);
        self.raster_properties(
            &prefix,
            band,
            &expected.description,
            &expected.geophysical_unit,
            expected.no_data_value(),
            expected.no_data_value_used(),
        );
        match expected.spectral_wavelength() {
            Some(Ok(value)) => self.expect_close(
                format!("{prefix} SpectralWavelength"),
                f64::from(value),
                f64::from(band.spectral_wavelength()),
                FIXED_TOLERANCE,
            ),
            Some(Err(error)) => self.malformed(format!("{prefix} SpectralWavelength"), &error),
            None => {}
        }
        match expected.spectral_bandwidth() {
            Some(Ok(value)) => self.expect_close(
                format!("{prefix} SpectralBandWidth"),
                f64::from(value),
                f64::from(band.spectral_bandwidth()),
                FIXED_TOLERANCE,
            ),
            Some(Err(error)) => self.malformed(format!("{prefix} SpectralBandWidth"), &error),
            None => {}
        }

        let remap = dataset.is_multi_size() && dataset.is_scene_crs_shared_model_crs();
        for pixel in &expected.expected_pixels {
            let mut label = format!("{prefix} Pixel({},{})", pixel.x, pixel.y);
            let read = if remap {
                match self.scene_to_band_pixel(band.image_to_model(), pixel.x, pixel.y) {
                    Ok((x, y)) => {
                        label.push_str(&format!(" transf({x},{y})"));
                        Self::read_pixel(band, x, y)
                    }
                    Err(detail) => Err(detail),
                }
            } else {
                Self::read_pixel(band, pixel.x, pixel.y)
            };
            self.expect_pixel(label, pixel, read);
        }
    }

    /// Scene pixel to band pixel through the shared model space: scene
    /// image-to-model, then the inverse of the band's image-to-model,
    /// floored.
    fn scene_to_band_pixel(
        &self,
        band_image_to_model: AffineTransform,
        x: i64,
        y: i64,
    ) -> Result<(i64, i64), String> {
        let scene_image_to_model = self
            .dataset
            .scene_geo_coding()
            .and_then(|geo_coding| geo_coding.image_to_map())
            .ok_or_else(|| "scene has no image-to-model transform".to_owned())?;
        let band_model_to_image = band_image_to_model
            .inverse()
            .map_err(|error| error.to_string())?;
        let (bx, by) = scene_image_to_model
            .then(&band_model_to_image)
            .transform(x as f64, y as f64);
        Ok((bx.floor() as i64, by.floor() as i64))
    }

    fn mask(&mut self, expected: &ExpectedMask) {
        let prefix = format!("{} Mask '{}'", self.label, expected.name);
        let dataset = self.dataset;
        let Some(mask) = dataset.mask(&expected.name) else {
            self.fail(Failure::new(
                FailureKind::StructuralAbsence,
                format!("{prefix} does not exist"),
            ));
            return;
        };

        self.expect_eq(format!("{prefix} Type"), expected.image_type.as_str(), mask.image_type());
        self.expect_eq(format!("{prefix} Color"), expected.color, mask.color());
        if let Some(description) = expected.checked_description() {
            self.expect_eq(
                format!("{prefix} Description"),
                description,
                mask.description().unwrap_or("null"),
            );
        }
    }

    fn metadata(&mut self, expected: &ExpectedMetadata) {
        let prefix = format!("{} Metadata path '{}'", self.label, expected.path);
        let root = self.dataset.metadata_root();
        let resolved = MetadataPath::parse(&expected.path).and_then(|path| path.resolve(root));
        let attribute = match resolved {
            Ok(attribute) => attribute,
            Err(error) => {
                self.fail(Failure::new(path_failure_kind(&error), prefix).with_detail(error));
                return;
            }
        };

        let actual = attribute.value.elem_string();
        if !metadata_text_matches(&expected.value, &actual) {
            self.fail(Failure::mismatch(format!("{prefix} Value"), &expected.value, actual));
        }
    }
}

fn declared_text(value: &Declared<String>) -> &str {
    value.value().map_or("null", String::as_str)
}

fn path_failure_kind(error: &PathError) -> FailureKind {
    if error.is_malformed() {
        FailureKind::MalformedPath
    } else {
        FailureKind::StructuralAbsence
    }
}

/// Exact text match, falling back to a numeric comparison with the adaptive
/// tolerance when both sides are finite numbers.
fn metadata_text_matches(expected: &str, actual: &str) -> bool {
    if expected == actual {
        return true;
    }
    match (parse_number(expected), parse_number(actual)) {
        (Ok(e), Ok(a)) if e.is_finite() && a.is_finite() => approx_eq(e, a, tolerance(e)),
        _ => false,
    }
}
