use tracing::trace;

use crate::units::duration::{is_duration, to_fractional_day, Conversion, FractionalDay};

use super::dom::{visible_text, Annotations, Page, Selectors};

/// Converts the duration of every day in the displayed month and plans an annotation for it.
pub struct DayAnnotator {
    conversion: Conversion,
}

impl DayAnnotator {
    pub fn new(conversion: Conversion) -> Self {
        Self { conversion }
    }

    /// Returns amount of days with a valid duration. Days without logged time are skipped.
    pub fn annotate<'a>(
        &self,
        page: &'a Page,
        selectors: &Selectors,
        annotations: &mut Annotations<'a>,
    ) -> u32 {
        let mut valid_days = 0;
        for day in page.current_month_days(selectors) {
            let text = visible_text(day);
            if !is_duration(&text) {
                trace!("Skipping day with text {text:?}");
                continue;
            }

            let value = to_fractional_day(&text, self.conversion);
            if !value.is_finite() {
                trace!("Skipping day with out of range duration {text:?}");
                continue;
            }
            annotations.add(day, day_annotation(value));
            valid_days += 1;
        }
        valid_days
    }
}

pub fn day_annotation(value: FractionalDay) -> String {
    format!("{value}j")
}

pub fn month_annotation(value: FractionalDay, days: u32) -> String {
    format!("{value}j/{days}")
}
