use chrono::NaiveDate;
use rv_dataset::{
    AffineGeoCoding, BandView, CodingSample, Dataset, GeoCoding, MaskView, MemoryBand,
    MemoryDataset, MemoryMask, MemoryTiePointGrid, Named, SampleCoding, SampledRaster,
    TiePointGridView,
};
use rv_expect::{ExpectedContent, ExpectedDataset};
use rv_metadata::{MetadataAttribute, MetadataElement};
use rv_types::{AffineTransform, Color, GeoPos, PixelPos};
use rv_verify::{Failure, FailureKind, verify};

fn content(body: &str) -> ExpectedContent {
    let document = format!(r#"{{"id": "P", "decodeQualification": "INTENDED", "expectedContent": {body}}}"#);
    ExpectedDataset::from_json_str(&document)
        .expect("expectation document")
        .expected_content
        .expect("content section")
}

fn kinds(failures: &[Failure]) -> Vec<FailureKind> {
    failures.iter().map(|failure| failure.kind).collect()
}

fn dsd_metadata() -> MetadataElement {
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
            MetadataElement::new("MPH")
                .with_attribute(MetadataAttribute::new("ABS_ORBIT", 4711_i64))
                .with_attribute(MetadataAttribute::new("CENTER_LAT", 53.456789123)),
        )
}

fn sample_dataset() -> MemoryDataset {
    MemoryDataset::new("P", 10, 20)
        .with_band(
            MemoryBand::new("radiance", 10, 20, (0..200).map(|v| v as f32 * 0.5).collect())
                .with_description("TOA radiance")
                .with_unit("mW/(m^2*sr*nm)")
                .with_spectral(412.5, 9.9)
                .with_no_data(0.0),
        )
        .with_flag_coding(
            SampleCoding::new("l1_flags")
                .with_sample(CodingSample::new("INVALID", 1).with_description("no data"))
                .with_sample(CodingSample::new("LAND", 2)),
        )
        .with_mask(
            MemoryMask::new("land", "Maths", Color::rgb(0, 255, 0)).with_description("land pixels"),
        )
        .with_metadata(dsd_metadata())
}

#[test]
fn matching_dimensions_pass() {
    let failures = verify(
        &content(r#"{"sceneWidth": 10, "sceneHeight": 20}"#),
        "P",
        &MemoryDataset::new("P", 10, 20),
    );
    assert!(failures.is_empty(), "{failures:?}");
}

#[test]
fn height_mismatch_yields_exactly_one_failure() {
    let failures = verify(
        &content(r#"{"sceneWidth": 10, "sceneHeight": 20}"#),
        "P",
        &MemoryDataset::new("P", 10, 21),
    );
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert_eq!(failures[0].kind, FailureKind::ValueMismatch);
    assert!(failures[0].label.to_lowercase().contains("height"), "{}", failures[0]);
    assert_eq!(failures[0].expected.as_deref(), Some("20"));
    assert_eq!(failures[0].actual.as_deref(), Some("21"));
}

#[test]
fn undeclared_sections_are_not_checked() {
    let failures = verify(&content("{}"), "P", &MemoryDataset::new("P", 1, 1));
    assert!(failures.is_empty(), "{failures:?}");
}

#[test]
fn times_compare_as_formatted_text() {
    let start = NaiveDate::from_ymd_opt(1983, 8, 23)
        .and_then(|date| date.and_hms_opt(12, 10, 10))
        .expect("timestamp");
    let dataset = MemoryDataset::new("P", 1, 1).with_times(Some(start), None);

    let passing = content(r#"{"startTime": "23-AUG-1983 12:10:10.000000", "endTime": null}"#);
    assert!(verify(&passing, "P", &dataset).is_empty());

    let failing = content(r#"{"startTime": "23-AUG-1983 12:10:11.000000", "endTime": "x"}"#);
    let failures = verify(&failing, "P", &dataset);
    assert_eq!(failures.len(), 2, "{failures:?}");
    assert_eq!(failures[0].label, "P StartTime");
    assert_eq!(failures[1].label, "P EndTime");
    assert_eq!(failures[1].actual.as_deref(), Some("null"));
}

#[test]
fn nan_pixel_expectation_matches_invalid_pixels_and_nan_samples() {
    // radiance(0,0) == 0.0 == no-data, so it is invalid.
    let dataset = sample_dataset();
    let invalid_nan = content(
        r#"{"bands": [{"name": "radiance", "expectedPixels": [{"x": 0, "y": 0, "value": "NaN"}]}]}"#,
    );
    assert!(verify(&invalid_nan, "P", &dataset).is_empty());

    let valid_nan = content(
        r#"{"bands": [{"name": "radiance", "expectedPixels": [{"x": 1, "y": 0, "value": "NaN"}]}]}"#,
    );
    let failures = verify(&valid_nan, "P", &dataset);
    assert_eq!(kinds(&failures), vec![FailureKind::ValueMismatch]);
    assert_eq!(failures[0].label, "P radiance Pixel(1,0)");

    let invalid_number = content(
        r#"{"bands": [{"name": "radiance", "expectedPixels": [{"x": 0, "y": 0, "value": 0.0}]}]}"#,
    );
    assert_eq!(verify(&invalid_number, "P", &dataset).len(), 1);

    // A valid pixel whose stored sample is NaN reads as NaN too.
    let nan_sample = MemoryDataset::new("P", 1, 1).with_band(MemoryBand::new("sst", 1, 1, vec![f32::NAN]));
    assert!(nan_sample.band("sst").expect("band").is_pixel_valid(0, 0));
    let sst_nan = content(
        r#"{"bands": [{"name": "sst", "expectedPixels": [{"x": 0, "y": 0, "value": "NaN"}]}]}"#,
    );
    assert!(verify(&sst_nan, "P", &nan_sample).is_empty());
}

#[test]
fn oversized_band_pixel_is_reported_not_panicked_on() {
    let dataset =
        MemoryDataset::new("P", 1, 1).with_band(MemoryBand::new("huge", i64::MAX, 2, vec![]));
    let expected = content(
        r#"{"bands": [{"name": "huge", "expectedPixels": [{"x": 1, "y": 1, "value": 1.0}]}]}"#,
    );
    let failures = verify(&expected, "P", &dataset);
    assert_eq!(kinds(&failures), vec![FailureKind::ValueMismatch]);
    assert_eq!(failures[0].label, "P huge Pixel(1,1)");
}

#[test]
fn band_properties_are_checked_when_declared() {
    let dataset = sample_dataset();
    let passing = content(
        r#"{"bands": [{
            "name": "radiance",
            "description": "TOA radiance",
            "geophysicalUnit": "mW/(m^2*sr*nm)",
            "noDataValue": "0.0",
            "noDataValueUsed": "TRUE",
            "spectralWavelength": 412.5,
            "spectralBandwidth": "9.9",
            "expectedPixels": [{"x": 3, "y": 1, "value": 6.5}]
        }]}"#,
    );
    let failures = verify(&passing, "P", &dataset);
    assert!(failures.is_empty(), "{failures:?}");

    let failing = content(
        r#"{"bands": [{
            "name": "radiance",
            "description": null,
            "noDataValue": "zero",
            "noDataValueUsed": "false",
            "spectralWavelength": 560
        }]}"#,
    );
    let failures = verify(&failing, "P", &dataset);
    assert_eq!(
        kinds(&failures),
        vec![
            FailureKind::ValueMismatch,
            FailureKind::MalformedExpectation,
            FailureKind::ValueMismatch,
            FailureKind::ValueMismatch,
        ],
        "{failures:?}"
    );
    assert_eq!(failures[0].label, "P radiance Description");
    assert_eq!(failures[1].label, "P radiance NoDataValue");
    assert_eq!(failures[3].label, "P radiance SpectralWavelength");
}

#[test]
fn missing_entities_are_structural_absences_and_do_not_stop_the_walk() {
    let dataset = sample_dataset();
    let expected = content(
        r#"{
            "sceneWidth": 11,
            "flagCodings": [{"name": "nope"}],
            "indexCodings": [{"name": "classes"}],
            "tiePointGrids": [{"name": "latitude"}],
            "bands": [{"name": "reflectance"}],
            "masks": [{"name": "cloud", "type": "Maths", "color": {"red": 1, "green": 1, "blue": 1}}],
            "metadata": [{"path": "SPH/NAME", "value": "x"}]
        }"#,
    );
    let failures = verify(&expected, "P", &dataset);
    assert_eq!(
        kinds(&failures),
        vec![
            FailureKind::ValueMismatch,
            FailureKind::StructuralAbsence,
            FailureKind::StructuralAbsence,
            FailureKind::StructuralAbsence,
            FailureKind::StructuralAbsence,
            FailureKind::StructuralAbsence,
            FailureKind::StructuralAbsence,
        ],
        "{failures:?}"
    );
    assert_eq!(failures[1].label, "P FlagCoding 'nope' does not exist");
    assert_eq!(failures[2].label, "P IndexCoding 'classes' does not exist");
    assert_eq!(failures[4].label, "P Band 'reflectance' does not exist");
    assert!(failures[6].to_string().contains("'SPH'"), "{}", failures[6]);
}

#[test]
fn sample_codings_check_count_values_and_non_empty_descriptions() {
    let dataset = sample_dataset();
    let passing = content(
        r#"{"flagCodings": [{"name": "l1_flags", "samples": [
            {"name": "INVALID", "value": 1, "description": "no data"},
            {"name": "LAND", "value": 2, "description": ""}
        ]}]}"#,
    );
    assert!(verify(&passing, "P", &dataset).is_empty());

    let failing = content(
        r#"{"flagCodings": [{"name": "l1_flags", "samples": [
            {"name": "INVALID", "value": 4, "description": "invalid"}
        ]}]}"#,
    );
    let failures = verify(&failing, "P", &dataset);
    let labels = failures
        .iter()
        .map(|failure| failure.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec![
            "P FlagCoding 'l1_flags' number of samples",
            "P FlagCoding 'l1_flags' sample 'INVALID' Value",
            "P FlagCoding 'l1_flags' sample 'INVALID' Description",
        ]
    );
}

#[test]
fn masks_check_type_color_and_description() {
    let dataset = sample_dataset();
    let passing = content(
        r#"{"masks": [{"name": "land", "type": "Maths", "color": {"red": 0, "green": 255, "blue": 0, "alpha": 255}}]}"#,
    );
    assert!(verify(&passing, "P", &dataset).is_empty());

    let failing = content(
        r#"{"masks": [{"name": "land", "type": "Range", "color": {"red": 0, "green": 0, "blue": 255},
            "description": "water"}]}"#,
    );
    let failures = verify(&failing, "P", &dataset);
    assert_eq!(failures.len(), 3, "{failures:?}");
    assert_eq!(failures[1].expected.as_deref(), Some("rgba(0,0,255,255)"));
}

#[test]
fn metadata_resolves_the_indexed_sibling() {
    let dataset = sample_dataset();
    let failures = verify(
        &content(r#"{"metadata": [{"path": "DSD/DSD[2]/Name", "value": "ABC_3"}]}"#),
        "P",
        &dataset,
    );
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert_eq!(failures[0].kind, FailureKind::ValueMismatch);
    assert_eq!(failures[0].expected.as_deref(), Some("ABC_3"));
    assert_eq!(failures[0].actual.as_deref(), Some("ABC_2"));

    let passing = content(
        r#"{"metadata": [
            {"path": "DSD/DSD[2]/Name", "value": "ABC_2"},
            {"path": "MPH/ABS_ORBIT", "value": 4711},
            {"path": "MPH/CENTER_LAT", "value": "53.45679"}
        ]}"#,
    );
    let failures = verify(&passing, "P", &dataset);
    assert!(failures.is_empty(), "{failures:?}");
}

#[test]
fn metadata_path_errors_are_classified() {
    let dataset = sample_dataset();
    let failures = verify(
        &content(
            r#"{"metadata": [
                {"path": "DSD/DSD[0]/Name", "value": "x"},
                {"path": "DSD/", "value": "x"},
                {"path": "DSD/DSD[9]/Name", "value": "x"}
            ]}"#,
        ),
        "P",
        &dataset,
    );
    assert_eq!(
        kinds(&failures),
        vec![
            FailureKind::MalformedPath,
            FailureKind::MalformedPath,
            FailureKind::StructuralAbsence,
        ]
    );
    assert!(failures[2].to_string().contains("DSD[9]"), "{}", failures[2]);
}

#[test]
fn verification_is_idempotent() {
    let dataset = sample_dataset();
    let expected = content(
        r#"{
            "sceneHeight": 3,
            "bands": [{"name": "radiance", "expectedPixels": [{"x": 2, "y": 2, "value": 1.0}]}],
            "metadata": [{"path": "DSD/DSD[2]/Name", "value": "ABC_3"}]
        }"#,
    );
    let first = verify(&expected, "P", &dataset);
    let second = verify(&expected, "P", &dataset);
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[test]
fn tie_point_grids_compare_geometry_and_interpolated_pixels() {
    let tie_points = (0..9).map(|v| v as f32).collect();
    let dataset = MemoryDataset::new("P", 5, 5).with_tie_point_grid(
        MemoryTiePointGrid::new("latitude", 3, 3, tie_points, 5, 5)
            .with_geometry(0.5, 0.5, 2.0, 2.0)
            .with_unit("deg"),
    );
    let expected = content(
        r#"{"tiePointGrids": [{
            "name": "latitude",
            "geophysicalUnit": "deg",
            "offsetX": 0.5, "offsetY": 0.5, "subSamplingX": 2.0, "subSamplingY": 4.0,
            "expectedPixels": [
                {"x": 1, "y": 1, "value": 2.0},
                {"x": 7, "y": 0, "value": "NaN"},
                {"x": 0, "y": 2, "value": 3.5}
            ]
        }]}"#,
    );
    let failures = verify(&expected, "P", &dataset);
    let labels = failures
        .iter()
        .map(|failure| failure.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["P latitude SubSamplingY", "P latitude Pixel(0,2)"]);
}

#[test]
fn multi_size_bands_remap_through_the_shared_model_space() {
    let coarse = MemoryBand::new("coarse", 2, 2, vec![1.0, 2.0, 3.0, 4.0])
        .with_image_to_model(AffineTransform::scale_translate(20.0, -20.0, 0.0, 40.0));
    let mut dataset = MemoryDataset::new("P", 4, 4)
        .with_geo_coding(AffineGeoCoding::new(AffineTransform::scale_translate(
            10.0, -10.0, 0.0, 40.0,
        )))
        .with_band(coarse);
    dataset.shared_model_crs = true;

    let expected = content(
        r#"{"bands": [{"name": "coarse", "expectedPixels": [
            {"x": 3, "y": 3, "value": 4.0},
            {"x": 1, "y": 2, "value": 3.0}
        ]}]}"#,
    );
    let failures = verify(&expected, "P", &dataset);
    assert!(failures.is_empty(), "{failures:?}");

    let mismatch = content(
        r#"{"bands": [{"name": "coarse", "expectedPixels": [{"x": 3, "y": 3, "value": 1.0}]}]}"#,
    );
    let failures = verify(&mismatch, "P", &dataset);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].label, "P coarse Pixel(3,3) transf(1,1)");

    // Without a shared model CRS the scene pixel is used as is and (3,3)
    // falls outside the 2x2 band.
    dataset.shared_model_crs = false;
    let failures = verify(&expected, "P", &dataset);
    assert_eq!(failures.len(), 2, "{failures:?}");
    assert_eq!(failures[0].actual.as_deref(), Some("NaN"));
}

#[test]
fn remap_without_scene_transform_is_a_sample_access_failure() {
    let mut dataset = MemoryDataset::new("P", 4, 4)
        .with_band(MemoryBand::new("coarse", 2, 2, vec![1.0, 2.0, 3.0, 4.0]));
    dataset.shared_model_crs = true;
    let expected = content(
        r#"{"bands": [{"name": "coarse", "expectedPixels": [{"x": 0, "y": 0, "value": 1.0}]}]}"#,
    );
    let failures = verify(&expected, "P", &dataset);
    assert_eq!(kinds(&failures), vec![FailureKind::SampleAccess]);
}

/// Identity geocoding (lon = x, lat = y) whose reverse projection drifts
/// along x.
struct DriftingGeoCoding {
    drift: f64,
}

impl GeoCoding for DriftingGeoCoding {
    fn geo_pos(&self, pixel: PixelPos) -> GeoPos {
        GeoPos::new(pixel.y, pixel.x)
    }

    fn pixel_pos(&self, geo: GeoPos) -> PixelPos {
        PixelPos::new(geo.lon + self.drift, geo.lat)
    }

    fn image_to_map(&self) -> Option<AffineTransform> {
        None
    }
}

struct DriftingDataset {
    inner: MemoryDataset,
    geo_coding: DriftingGeoCoding,
}

impl Named for DriftingDataset {
    fn name(&self) -> &str {
        self.inner.name()
    }
}

impl Dataset for DriftingDataset {
    fn scene_width(&self) -> i64 {
        self.inner.scene_width()
    }

    fn scene_height(&self) -> i64 {
        self.inner.scene_height()
    }

    fn start_time(&self) -> Option<chrono::NaiveDateTime> {
        self.inner.start_time()
    }

    fn end_time(&self) -> Option<chrono::NaiveDateTime> {
        self.inner.end_time()
    }

    fn scene_geo_coding(&self) -> Option<&dyn GeoCoding> {
        Some(&self.geo_coding)
    }

    fn flag_coding(&self, name: &str) -> Option<&SampleCoding> {
        self.inner.flag_coding(name)
    }

    fn index_coding(&self, name: &str) -> Option<&SampleCoding> {
        self.inner.index_coding(name)
    }

    fn tie_point_grid(&self, name: &str) -> Option<&dyn TiePointGridView> {
        self.inner.tie_point_grid(name)
    }

    fn band(&self, name: &str) -> Option<&dyn BandView> {
        self.inner.band(name)
    }

    fn mask(&self, name: &str) -> Option<&dyn MaskView> {
        self.inner.mask(name)
    }

    fn metadata_root(&self) -> &MetadataElement {
        self.inner.metadata_root()
    }

    fn is_multi_size(&self) -> bool {
        self.inner.is_multi_size()
    }

    fn is_scene_crs_shared_model_crs(&self) -> bool {
        self.inner.is_scene_crs_shared_model_crs()
    }
}

fn drifting(drift: f64) -> DriftingDataset {
    DriftingDataset {
        inner: MemoryDataset::new("P", 100, 100),
        geo_coding: DriftingGeoCoding { drift },
    }
}

#[test]
fn reverse_projection_drift_is_checked_against_declared_accuracy() {
    let expected = content(
        r#"{"geoCoding": {"reverseAccuracy": 0.05,
            "coordinates": [{"x": 12.5, "y": 40.5, "lat": 40.5, "lon": 12.5}]}}"#,
    );
    assert!(verify(&expected, "P", &drifting(0.03)).is_empty());

    let failures = verify(&expected, "P", &drifting(0.10));
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert_eq!(failures[0].label, "P Pixel.X at GeoPos(40.5,12.5)");
}

#[test]
fn reverse_projection_is_skipped_without_accuracy() {
    let expected = content(
        r#"{"geoCoding": {"coordinates": [{"x": 12.5, "y": 40.5, "lat": 40.5, "lon": 12.5}]}}"#,
    );
    assert!(verify(&expected, "P", &drifting(5.0)).is_empty());
}

#[test]
fn forward_projection_mismatch_names_the_pixel() {
    let expected = content(
        r#"{"geoCoding": {"coordinates": [{"x": 1.5, "y": 2.5, "lat": 2.5, "lon": 1.6}]}}"#,
    );
    let failures = verify(&expected, "P", &drifting(0.0));
    assert_eq!(failures.len(), 1, "{failures:?}");
    assert_eq!(failures[0].label, "P GeoPos.Lon at Pixel(1.5,2.5)");
}

#[test]
fn declared_coordinates_require_a_geocoding() {
    let expected = content(
        r#"{"sceneWidth": 2, "geoCoding": {"coordinates": [{"x": 0, "y": 0, "lat": 0, "lon": 0}]}}"#,
    );
    let failures = verify(&expected, "P", &MemoryDataset::new("P", 1, 1));
    assert_eq!(
        kinds(&failures),
        vec![FailureKind::ValueMismatch, FailureKind::PreconditionViolation]
    );
    assert_eq!(failures[1].label, "P has no GeoCoding");
}
