use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::{
    config::{PeriodOrder, ScanConfig},
    units::{
        duration::FractionalDay,
        month_key::{LabelError, MonthKey},
    },
    utils::clock::Clock,
};

use super::{
    entities::{MonthRecord, MonthsTable, TotalSummary},
    read_months,
    store::{PersistentStore, StoreError},
    MONTHS_KEY, TOTAL_KEY,
};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("malformed month label: {0}")]
    MalformedLabel(#[from] LabelError),
    #[error("store failed after {attempts} attempts: {source}")]
    Store {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed {
        key: String,
        record: MonthRecord,
        total: TotalSummary,
    },
    /// Month total wasn't a finite duration. Nothing was written.
    Skipped,
}

/// Settings of [MonthAggregator], taken from [ScanConfig].
#[derive(Debug, Clone, Copy)]
pub struct AggregatorSettings {
    pub precision: u32,
    pub period_order: PeriodOrder,
    pub store_retries: u32,
    pub store_backoff: Duration,
}

impl From<&ScanConfig> for AggregatorSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            precision: config.conversion.precision,
            period_order: config.period_order,
            store_retries: config.store_retries,
            store_backoff: config.store_backoff,
        }
    }
}

/// Stores month records and keeps the total in sync with them.
pub struct MonthAggregator {
    store: Arc<dyn PersistentStore>,
    settings: AggregatorSettings,
    clock: Box<dyn Clock>,
}

impl MonthAggregator {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        settings: AggregatorSettings,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }

    /// Upserts the month under the key derived from `label` and rewrites the total.
    ///
    /// The total is written separately from the months. If writing it fails the months stay
    /// updated and the total catches up on the next commit or [Self::recompute_total].
    #[instrument(skip(self))]
    pub async fn commit(
        &self,
        label: &str,
        month_time: FractionalDay,
        days: u32,
    ) -> Result<CommitOutcome, CommitError> {
        if !month_time.is_finite() {
            info!("Month total {month_time} is not a usable duration, nothing to store");
            return Ok(CommitOutcome::Skipped);
        }

        let key = MonthKey::from_label(label)
            .inspect_err(|e| warn!("Refusing to store month: {e}"))?
            .to_string();
        let record = MonthRecord {
            name: label.trim().to_string(),
            time: month_time,
            days,
        };

        let store = self.store.as_ref();
        let months = self
            .with_retries("months", || upsert_month(store, key.clone(), record.clone()))
            .await?;

        // The table always holds at least the month we've just written.
        let total = TotalSummary::from_months(
            &months,
            self.settings.period_order,
            self.settings.precision,
        )
        .unwrap_or_else(|| TotalSummary {
            period: format!("from {key} to {key}"),
            time: record.time,
            days: record.days,
        });

        let written = &total;
        self.with_retries("total", || write_total(store, written))
            .await?;

        info!("Stored {key} as {record:?}, total is now {total:?}");
        Ok(CommitOutcome::Committed { key, record, total })
    }

    /// Rebuilds the total from the stored months. Nothing is written when no month is stored.
    pub async fn recompute_total(&self) -> Result<Option<TotalSummary>, CommitError> {
        let store = self.store.as_ref();
        let months = self
            .with_retries("months", || read_months(store))
            .await?;

        let Some(total) = TotalSummary::from_months(
            &months,
            self.settings.period_order,
            self.settings.precision,
        ) else {
            return Ok(None);
        };

        let written = &total;
        self.with_retries("total", || write_total(store, written))
            .await?;
        Ok(Some(total))
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, CommitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut backoff = self.settings.store_backoff;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(v) => return Ok(v),
                Err(e) if attempts <= self.settings.store_retries => {
                    warn!("Failed to access {what} (attempt {attempts}), retrying in {backoff:?}: {e}");
                    self.clock.sleep(backoff).await;
                    backoff *= 2;
                }
                Err(source) => {
                    error!("Giving up on {what} after {attempts} attempts: {source}");
                    return Err(CommitError::Store { attempts, source });
                }
            }
        }
    }
}

async fn upsert_month(
    store: &dyn PersistentStore,
    key: String,
    record: MonthRecord,
) -> Result<MonthsTable, StoreError> {
    let merged = store
        .update(
            MONTHS_KEY,
            Box::new(move |current| {
                let mut months = match current {
                    Some(value) => serde_json::from_value::<MonthsTable>(value)?,
                    None => MonthsTable::new(),
                };
                months.insert(key, record);
                Ok(serde_json::to_value(months)?)
            }),
        )
        .await?;
    Ok(serde_json::from_value(merged)?)
}

async fn write_total(store: &dyn PersistentStore, total: &TotalSummary) -> Result<(), StoreError> {
    store.set(TOTAL_KEY, serde_json::to_value(total)?).await
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::{
        config::{PeriodOrder, ScanConfig},
        tracker::storage::{
            entities::{MonthRecord, TotalSummary},
            read_months, read_total,
            store::{Merge, MemoryStore, PersistentStore, StoreError},
        },
        units::duration::{to_fractional_day, Conversion},
        utils::clock::test_clock::TestClock,
    };

    use super::{AggregatorSettings, CommitError, CommitOutcome, MonthAggregator};

    fn aggregator(store: Arc<dyn PersistentStore>, clock: TestClock) -> MonthAggregator {
        MonthAggregator::new(
            store,
            AggregatorSettings::from(&ScanConfig::default()),
            Box::new(clock),
        )
    }

    #[tokio::test]
    async fn test_commit_writes_month_and_total() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());

        let outcome = aggregator.commit("March, 2024", 20., 20).await?;

        let record = MonthRecord {
            name: "March, 2024".into(),
            time: 20.,
            days: 20,
        };
        let total = TotalSummary {
            period: "from 2024-3 to 2024-3".into(),
            time: 20.,
            days: 20,
        };
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                key: "2024-3".into(),
                record: record.clone(),
                total: total.clone(),
            }
        );
        assert_eq!(read_months(store.as_ref()).await?.get("2024-3"), Some(&record));
        assert_eq!(read_total(store.as_ref()).await?, Some(total));
        assert_eq!(store.writes(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_commits_accumulate_and_overwrite() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());

        aggregator.commit("February, 2024", 18.43, 19).await?;
        aggregator.commit("October, 2024", 1., 1).await?;
        aggregator.commit("October, 2024", 21.33, 22).await?;

        let months = read_months(store.as_ref()).await?;
        assert_eq!(months.len(), 2);
        assert_eq!(months["2024-10"].days, 22);

        let total = read_total(store.as_ref()).await?.unwrap();
        assert_eq!(total.days, 41);
        assert_eq!(total.time, 39.76);
        assert_eq!(total.period, "from 2024-10 to 2024-2");
        Ok(())
    }

    #[tokio::test]
    async fn test_recommit_is_stable() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());

        aggregator.commit("March, 2024", 20., 20).await?;
        let months = read_months(store.as_ref()).await?;
        let total = read_total(store.as_ref()).await?;

        aggregator.commit("March, 2024", 20., 20).await?;
        assert_eq!(read_months(store.as_ref()).await?, months);
        assert_eq!(read_total(store.as_ref()).await?, total);
        Ok(())
    }

    #[tokio::test]
    async fn test_nan_is_skipped() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());

        let outcome = aggregator.commit("March, 2024", f64::NAN, 20).await?;
        assert_eq!(outcome, CommitOutcome::Skipped);
        assert_eq!(store.writes(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_overflowing_month_total_is_skipped() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());
        let huge = format!("{}:00:00", "9".repeat(400));
        let month_time = to_fractional_day(&huge, Conversion::default());
        assert!(month_time.is_infinite());

        let outcome = aggregator.commit("March, 2024", month_time, 20).await?;
        assert_eq!(outcome, CommitOutcome::Skipped);
        assert_eq!(store.writes(), 0);

        // The store stays usable for the next month
        aggregator.commit("April, 2024", 1., 1).await?;
        assert_eq!(read_months(store.as_ref()).await?["2024-4"].time, 1.);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_label_writes_nothing() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());

        let outcome = aggregator.commit("Mars, 2024", 20., 20).await;
        assert!(matches!(outcome, Err(CommitError::MalformedLabel(_))));
        assert_eq!(store.writes(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_chronological_period() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let settings = AggregatorSettings {
            period_order: PeriodOrder::Chronological,
            ..AggregatorSettings::from(&ScanConfig::default())
        };
        let aggregator = MonthAggregator::new(store.clone(), settings, Box::new(TestClock::new()));

        aggregator.commit("February, 2024", 1., 1).await?;
        aggregator.commit("October, 2024", 1., 1).await?;

        let total = read_total(store.as_ref()).await?.unwrap();
        assert_eq!(total.period, "from 2024-2 to 2024-10");
        Ok(())
    }

    /// Fails the first `failures` writes, then behaves like [MemoryStore].
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    impl FlakyStore {
        fn fail(&self) -> Result<(), StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Io(std::io::Error::other("disk is gone")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PersistentStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            self.fail()?;
            self.inner.set(key, value).await
        }

        async fn update(&self, key: &str, merge: Merge) -> Result<Value, StoreError> {
            self.fail()?;
            self.inner.update(key, merge).await
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_retried_with_backoff() -> Result<()> {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(2),
        });
        let clock = TestClock::new();
        let aggregator = aggregator(store.clone(), clock.clone());

        aggregator.commit("March, 2024", 20., 20).await?;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(250), Duration::from_millis(500)]
        );
        assert_eq!(
            store.inner.get("total").await?,
            Some(json!({ "period": "from 2024-3 to 2024-3", "time": 20.0, "days": 20 }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced_when_retries_run_out() -> Result<()> {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(100),
        });
        let clock = TestClock::new();
        let aggregator = aggregator(store.clone(), clock.clone());

        let outcome = aggregator.commit("March, 2024", 20., 20).await;
        assert!(matches!(outcome, Err(CommitError::Store { attempts: 4, .. })));
        assert_eq!(clock.sleeps().len(), 3);
        assert_eq!(store.inner.writes(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_total() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let aggregator = aggregator(store.clone(), TestClock::new());
        assert_eq!(aggregator.recompute_total().await?, None);

        store
            .set(
                "months",
                json!({
                    "2024-1": { "name": "January, 2024", "time": 1.5, "days": 2 },
                    "2024-3": { "name": "March, 2024", "time": 2.25, "days": 3 }
                }),
            )
            .await?;

        let total = aggregator.recompute_total().await?.unwrap();
        assert_eq!(total.days, 5);
        assert_eq!(total.time, 3.75);
        assert_eq!(read_total(store.as_ref()).await?, Some(total));
        Ok(())
    }
}
