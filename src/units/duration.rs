use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Worked time expressed as a share of a nominal working day. `7:00:00` is one day.
pub type FractionalDay = f64;

/// Text the timesheet prints for a logged duration, for example `7:30:00` or `142:05:10`.
static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+:[0-9]+:[0-9]+$").expect("Duration pattern should compile"));

/// Constants used when turning a duration into [FractionalDay].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversion {
    /// Hours in one fractional day.
    pub day_length: f64,
    /// Decimal places kept after conversion.
    pub precision: u32,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            day_length: 7.,
            precision: 2,
        }
    }
}

/// Checks whether `text` looks like a logged duration. Callers are expected to filter with this
/// before trusting the output of [to_fractional_day].
pub fn is_duration(text: &str) -> bool {
    DURATION_PATTERN.is_match(text)
}

/// Converts `H:M:S` into fractional days.
///
/// Input is not validated. A missing or non numeric field produces NaN and hours too large for
/// `f64` produce infinity, callers check with [f64::is_finite]. Fields past the third one are
/// ignored.
pub fn to_fractional_day(duration: &str, conversion: Conversion) -> FractionalDay {
    let mut fields = duration.split(':').map(parse_field);
    let [hours, minutes, seconds] =
        [fields.next(), fields.next(), fields.next()].map(|v| v.unwrap_or(f64::NAN));

    round_to(
        (hours + minutes / 60. + seconds / 3600.) / conversion.day_length,
        conversion.precision,
    )
}

/// Rounds half away from zero. NaN stays NaN.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Blank fields count as zero. Anything but plain digits is NaN, so `inf` or `1e3` never pass.
fn parse_field(field: &str) -> f64 {
    let field = field.trim();
    if field.is_empty() {
        return 0.;
    }
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return f64::NAN;
    }
    field.parse::<f64>().unwrap_or(f64::NAN)
}
