//!  Storage is organized through [store::PersistentStore].
//!  The basic idea is:
//!   - The store is a json key-value object that outlives page loads.
//!   - `months` holds a [entities::MonthRecord] per month key, last write wins.
//!   - `total` holds the [entities::TotalSummary] derived from `months`, rewritten after every
//!     month update by [aggregator::MonthAggregator].

pub mod aggregator;
pub mod entities;
pub mod store;

use entities::{MonthsTable, TotalSummary};
use store::{PersistentStore, StoreError};

pub const MONTHS_KEY: &str = "months";
pub const TOTAL_KEY: &str = "total";

pub async fn read_months(store: &dyn PersistentStore) -> Result<MonthsTable, StoreError> {
    match store.get(MONTHS_KEY).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(MonthsTable::new()),
    }
}

pub async fn read_total(store: &dyn PersistentStore) -> Result<Option<TotalSummary>, StoreError> {
    match store.get(TOTAL_KEY).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}
