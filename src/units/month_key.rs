use std::{fmt::Display, str::FromStr};

use chrono::Month;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("month label {0:?} is not of the form \"<Month>, <Year>\"")]
    MissingSeparator(String),
    #[error("unknown month name {0:?}")]
    UnknownMonth(String),
    #[error("invalid year {0:?}")]
    InvalidYear(String),
    #[error("month key {0:?} is not of the form \"<year>-<month>\"")]
    InvalidKey(String),
}

/// Key used for storing a month record. Displayed as `<year>-<month>` without padding, so
/// `2024-10` sorts before `2024-2` when compared as strings. [Ord] on the key itself is
/// chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: u32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: u32, month: Month) -> Self {
        Self {
            year,
            month: month.number_from_month(),
        }
    }

    /// Parses a period label such as `March, 2024`. Month names are English and case sensitive.
    pub fn from_label(label: &str) -> Result<Self, LabelError> {
        let label = label.trim();
        let Some((name, year)) = label.split_once(", ") else {
            return Err(LabelError::MissingSeparator(label.into()));
        };

        let month = month_from_name(name).ok_or_else(|| LabelError::UnknownMonth(name.into()))?;
        let year = parse_year(year)?;

        Ok(Self::new(year, month))
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LabelError::InvalidKey(s.into());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let month = month
            .parse::<u8>()
            .ok()
            .and_then(|month| Month::try_from(month).ok())
            .ok_or_else(invalid)?;
        let year = parse_year(year).map_err(|_| invalid())?;
        Ok(Self::new(year, month))
    }
}

fn month_from_name(name: &str) -> Option<Month> {
    (1..=12u8)
        .filter_map(|n| Month::try_from(n).ok())
        .find(|month| month.name() == name)
}

fn parse_year(year: &str) -> Result<u32, LabelError> {
    if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LabelError::InvalidYear(year.into()));
    }
    year.parse().map_err(|_| LabelError::InvalidYear(year.into()))
}
