use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::duration::Conversion;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

/// How the `from .. to ..` period of the total is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PeriodOrder {
    /// First and last stored key compared as plain strings. `2024-10` comes before `2024-9`.
    #[default]
    Lexicographic,
    /// First and last month in calendar order.
    Chronological,
}

/// CSS selectors describing the timesheet page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub month_total: String,
    pub day: String,
    /// Duration leaf, looked up inside each day.
    pub day_hours: String,
    /// Class marking days that roll over from the neighbouring months.
    pub outside_month_class: String,
    pub period_label: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            month_total: ".month-total.day-hours".into(),
            day: ".selectable-day".into(),
            day_hours: ".day-hours".into(),
            outside_month_class: "not-current-month".into(),
            period_label: ".month-selector .ttt-selector-area".into(),
        }
    }
}

/// Everything the scanning pipeline can be tuned with. Loaded from an optional JSON file, missing
/// fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub conversion: Conversion,
    #[serde(rename = "retry_delay_ms", with = "millis_ser")]
    pub retry_delay: Duration,
    /// `None` retries for as long as the cycle is alive.
    pub max_attempts: Option<u32>,
    pub store_retries: u32,
    #[serde(rename = "store_backoff_ms", with = "millis_ser")]
    pub store_backoff: Duration,
    #[serde(rename = "watch_interval_ms", with = "millis_ser")]
    pub watch_interval: Duration,
    pub period_order: PeriodOrder,
    pub selectors: SelectorConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            conversion: Conversion::default(),
            retry_delay: Duration::from_millis(1000),
            max_attempts: Some(300),
            store_retries: 3,
            store_backoff: Duration::from_millis(250),
            watch_interval: Duration::from_millis(1000),
            period_order: PeriodOrder::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl ScanConfig {
    /// `max_attempts` of 0 means the same as on the command line: retry forever.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config: Self = match path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                serde_json::from_slice(&bytes)?
            }
            None => Self::default(),
        };
        config.max_attempts = config.max_attempts.filter(|max| *max > 0);
        Ok(config)
    }
}

mod millis_ser {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
