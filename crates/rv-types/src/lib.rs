#![forbid(unsafe_code)]

pub mod float_text;

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Absolute tolerance used for every float comparison that does not scale
/// with the expected magnitude (geo positions, pixel samples, band and grid
/// scalar properties).
pub const FIXED_TOLERANCE: f64 = 1e-6;

/// Tolerance scale as a power of ten: parts per million.
const RELATIVE_TOLERANCE_EXPONENT: i32 = -6;
const TOLERANCE_SIGNIFICANT_DIGITS: usize = 4;

/// How well a decoder claims to handle a given input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum DecodeQualification {
    #[default]
    Unable,
    Suitable,
    Intended,
}

impl DecodeQualification {
    /// Case-insensitive parse; absent, empty and unknown text all map to
    /// [`DecodeQualification::Unable`].
    #[must_use]
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some(text) if text.eq_ignore_ascii_case("SUITABLE") => Self::Suitable,
            Some(text) if text.eq_ignore_ascii_case("INTENDED") => Self::Intended,
            _ => Self::Unable,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unable => "UNABLE",
            Self::Suitable => "SUITABLE",
            Self::Intended => "INTENDED",
        }
    }

    /// Whether a decoder with this qualification is expected to open the
    /// product at all.
    #[must_use]
    pub fn can_decode(self) -> bool {
        !matches!(self, Self::Unable)
    }
}

impl From<Option<String>> for DecodeQualification {
    fn from(value: Option<String>) -> Self {
        Self::parse_lenient(value.as_deref())
    }
}

impl From<DecodeQualification> for String {
    fn from(value: DecodeQualification) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for DecodeQualification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f64,
    pub y: f64,
}

impl PixelPos {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for PixelPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pixel({},{})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for GeoPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeoPos({},{})", self.lat, self.lon)
    }
}

fn opaque_alpha() -> u8 {
    u8::MAX
}

/// RGBA display color of a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    #[serde(default = "opaque_alpha")]
    pub alpha: u8,
}

impl Color {
    #[must_use]
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: u8::MAX,
        }
    }

    #[must_use]
    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rgba({},{},{},{})",
            self.red, self.green, self.blue, self.alpha
        )
    }
}

/// 2D affine transform in the `java.awt.geom` coefficient layout:
///
/// ```text
/// x' = m00 * x + m01 * y + m02
/// y' = m10 * x + m11 * y + m12
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m11: f64,
    pub m02: f64,
    pub m12: f64,
}

impl AffineTransform {
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            m00: 1.0,
            m10: 0.0,
            m01: 0.0,
            m11: 1.0,
            m02: 0.0,
            m12: 0.0,
        }
    }

    /// Axis-aligned scale followed by a translation, the usual shape of an
    /// image-to-map transform.
    #[must_use]
    pub const fn scale_translate(scale_x: f64, scale_y: f64, translate_x: f64, translate_y: f64) -> Self {
        Self {
            m00: scale_x,
            m10: 0.0,
            m01: 0.0,
            m11: scale_y,
            m02: translate_x,
            m12: translate_y,
        }
    }

    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    #[must_use]
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m00 * x + self.m01 * y + self.m02,
            self.m10 * x + self.m11 * y + self.m12,
        )
    }

    pub fn inverse(&self) -> Result<Self, TypeError> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(TypeError::NonInvertibleTransform { determinant: det });
        }
        Ok(Self {
            m00: self.m11 / det,
            m10: -self.m10 / det,
            m01: -self.m01 / det,
            m11: self.m00 / det,
            m02: (self.m01 * self.m12 - self.m11 * self.m02) / det,
            m12: (self.m10 * self.m02 - self.m00 * self.m12) / det,
        })
    }

    /// Transform that applies `self` first and `next` second.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        Self {
            m00: next.m00 * self.m00 + next.m01 * self.m10,
            m10: next.m10 * self.m00 + next.m11 * self.m10,
            m01: next.m00 * self.m01 + next.m01 * self.m11,
            m11: next.m10 * self.m01 + next.m11 * self.m11,
            m02: next.m00 * self.m02 + next.m01 * self.m12 + next.m02,
            m12: next.m10 * self.m02 + next.m11 * self.m12 + next.m12,
        }
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("affine transform is not invertible (determinant={determinant})")]
    NonInvertibleTransform { determinant: f64 },
    #[error("cannot parse {value:?} as a number")]
    InvalidNumber { value: String },
}

/// Render a UTC timestamp as `dd-MMM-yyyy HH:mm:ss.ffffff` with an
/// upper-case month, e.g. `23-AUG-1983 12:10:10.000000`.
#[must_use]
pub fn format_utc(timestamp: &NaiveDateTime) -> String {
    timestamp
        .format("%d-%b-%Y %H:%M:%S%.6f")
        .to_string()
        .to_uppercase()
}

/// Adaptive tolerance for comparing a value of the given magnitude:
/// parts-per-million of `|expected_magnitude|`, rounded half-up to four
/// significant digits, never below [`FIXED_TOLERANCE`].
#[must_use]
pub fn tolerance(expected_magnitude: f64) -> f64 {
    shifted_round_half_up(
        expected_magnitude.abs(),
        RELATIVE_TOLERANCE_EXPONENT,
        TOLERANCE_SIGNIFICANT_DIGITS,
    )
    .max(FIXED_TOLERANCE)
}

/// `value * 10^shift` rounded half-up to `digits` significant digits.
///
/// Works on the shortest decimal rendering of `value`, so a tie written as
/// `1000.5` stays a tie instead of landing just below it in binary.
/// Expects a non-negative `value`.
fn shifted_round_half_up(value: f64, shift: i32, digits: usize) -> f64 {
    let scaled = value * 10_f64.powi(shift);
    if value == 0.0 || !value.is_finite() {
        return scaled;
    }
    let text = format!("{value:e}");
    let Some((mantissa, exponent)) = text.split_once('e') else {
        return scaled;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scaled;
    };

    let mantissa_digits: Vec<u64> = mantissa
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(u64::from)
        .collect();
    let kept = mantissa_digits.len().min(digits);
    let mut significand = mantissa_digits[..kept]
        .iter()
        .fold(0_u64, |acc, digit| acc * 10 + digit);
    if mantissa_digits.get(digits).is_some_and(|digit| *digit >= 5) {
        significand += 1;
    }
    let unit_exponent = exponent + shift - (kept as i32 - 1);
    format!("{significand}e{unit_exponent}")
        .parse::<f64>()
        .unwrap_or(scaled)
}

/// Parse numeric text the way expectation documents write it: surrounding
/// whitespace is ignored and `NaN`, `Infinity` and `-Infinity` are accepted.
pub fn parse_number(text: &str) -> Result<f64, TypeError> {
    float_text::parse_text(text).ok_or_else(|| TypeError::InvalidNumber {
        value: text.to_owned(),
    })
}

/// Boolean text: `true` in any letter case is true, anything else is false.
#[must_use]
pub fn parse_flag(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("true")
}

/// Float equality with an absolute tolerance. Two NaNs compare equal, a NaN
/// never equals a number, and equal infinities compare equal.
#[must_use]
pub fn approx_eq(expected: f64, actual: f64, tolerance: f64) -> bool {
    if expected.is_nan() || actual.is_nan() {
        return expected.is_nan() && actual.is_nan();
    }
    expected == actual || (expected - actual).abs() <= tolerance
}
