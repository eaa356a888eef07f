use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::PeriodOrder,
    units::{
        duration::{round_to, FractionalDay},
        month_key::MonthKey,
    },
};

/// Time logged during one month, as last seen on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthRecord {
    /// Label the page showed for the month, for example `March, 2024`.
    pub name: String,
    pub time: FractionalDay,
    /// Days of the month with logged time.
    pub days: u32,
}

/// Every month ever scanned, keyed by [MonthKey] in its string form. Iteration order is the
/// string order of the keys.
pub type MonthsTable = BTreeMap<String, MonthRecord>;

/// Sum over the whole [MonthsTable]. It's a derived value and can always be rebuilt from the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalSummary {
    pub period: String,
    pub time: FractionalDay,
    pub days: u32,
}

impl TotalSummary {
    /// Folds the table into a summary. Returns `None` when nothing has been stored yet.
    pub fn from_months(months: &MonthsTable, order: PeriodOrder, precision: u32) -> Option<Self> {
        let (first, last) = period_bounds(months, order)?;

        let time = months.values().map(|month| month.time).sum::<f64>();
        let days = months.values().map(|month| month.days).sum();

        Some(Self {
            period: format!("from {first} to {last}"),
            time: round_to(time, precision),
            days,
        })
    }
}

fn period_bounds(months: &MonthsTable, order: PeriodOrder) -> Option<(String, String)> {
    let lexicographic = || {
        let first = months.keys().next()?;
        let last = months.keys().next_back()?;
        Some((first.clone(), last.clone()))
    };

    match order {
        PeriodOrder::Lexicographic => lexicographic(),
        PeriodOrder::Chronological => {
            let keys = months
                .keys()
                .filter_map(|key| key.parse::<MonthKey>().ok())
                .collect::<Vec<_>>();
            match (keys.iter().min(), keys.iter().max()) {
                (Some(first), Some(last)) => Some((first.to_string(), last.to_string())),
                // Keys written by something else. Strings are still better than nothing
                _ => lexicographic(),
            }
        }
    }
}
