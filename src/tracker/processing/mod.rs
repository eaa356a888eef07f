use std::{future::Future, pin::Pin};

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use poller::{CycleOutcome, DomPoller};

use super::collection::trigger::Trigger;

pub mod poller;
pub mod scan;

type Cycle<'a> = Pin<Box<dyn Future<Output = Result<CycleOutcome>> + 'a>>;

/// Receives triggers and runs a scan cycle for each of them. At most one cycle is in flight: a
/// new trigger drops the running cycle, so stored data always comes from the latest view of the
/// page.
pub struct CycleRunner {
    receiver: Receiver<Trigger>,
    poller: DomPoller,
    shutdown: CancellationToken,
}

impl CycleRunner {
    pub fn new(receiver: Receiver<Trigger>, poller: DomPoller, shutdown: CancellationToken) -> Self {
        Self {
            receiver,
            poller,
            shutdown,
        }
    }

    /// Runs until the trigger channel closes. A cycle that's running at that point is allowed
    /// to finish, it stops at its next retry once shutdown is requested.
    pub async fn run(self) -> Result<()> {
        let Self {
            mut receiver,
            poller,
            shutdown,
        } = self;

        let mut current: Option<Cycle<'_>> = None;
        loop {
            tokio::select! {
                trigger = receiver.recv() => {
                    let Some(trigger) = trigger else {
                        break;
                    };
                    if current.is_some() {
                        info!("{trigger:?} supersedes the running cycle");
                    }
                    let span = info_span!("Scan cycle", ?trigger);
                    current = Some(Box::pin(poller.run_cycle(&shutdown).instrument(span)));
                }
                outcome = async {
                    match current.as_mut() {
                        Some(cycle) => cycle.await,
                        None => std::future::pending().await,
                    }
                } => {
                    current = None;
                    report(outcome);
                }
            }
        }

        if let Some(cycle) = current {
            report(cycle.await);
        }
        receiver.close();
        Ok(())
    }
}

fn report(outcome: Result<CycleOutcome>) {
    match outcome {
        Ok(CycleOutcome::Scanned(report)) => {
            info!("Cycle finished for {} ({:?})", report.label, report.commit)
        }
        Ok(CycleOutcome::GaveUp { attempts }) => {
            info!("Cycle abandoned after {attempts} attempts")
        }
        Ok(CycleOutcome::Cancelled) => info!("Cycle cancelled"),
        Err(e) => error!("Scan cycle failed {e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::Result;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        config::ScanConfig,
        page::{dom::Selectors, MockPageSource},
        tracker::{
            collection::trigger::Trigger,
            processing::scan::tests::month_page,
            storage::{
                aggregator::{AggregatorSettings, MonthAggregator},
                read_months, read_total,
                store::MemoryStore,
            },
        },
        utils::clock::DefaultClock,
    };

    use super::{poller::DomPoller, scan::Scanner, CycleRunner};

    /// Page that renders March only after `ready_after` loads, April is always rendered.
    fn source(loads: Arc<AtomicUsize>, ready_after: usize) -> MockPageSource {
        let march = month_page("March, 2024", "140:00:00", "7:00:00", 20);
        let april = month_page("April, 2024", "7:00:00", "7:00:00", 1);
        let mut source = MockPageSource::new();
        source.expect_load().returning(move || {
            let load = loads.fetch_add(1, Ordering::SeqCst) + 1;
            if load <= ready_after {
                Ok(Some("<html><body></body></html>".into()))
            } else if load == ready_after + 1 {
                Ok(Some(march.clone()))
            } else {
                Ok(Some(april.clone()))
            }
        });
        source.expect_publish().returning(|_| Ok(()));
        source
    }

    fn runner(
        source: MockPageSource,
        store: Arc<MemoryStore>,
        receiver: mpsc::Receiver<Trigger>,
        shutdown: &CancellationToken,
    ) -> CycleRunner {
        let config = ScanConfig::default();
        let scanner = Scanner::new(
            Box::new(source),
            Selectors::compile(&config.selectors).unwrap(),
            config.conversion,
            MonthAggregator::new(store, AggregatorSettings::from(&config), Box::new(DefaultClock)),
        );
        let poller = DomPoller::new(scanner, config.retry_delay, None, Box::new(DefaultClock));
        CycleRunner::new(receiver, poller, shutdown.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_cycle_per_trigger() -> Result<()> {
        let loads = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        let runner = runner(source(loads.clone(), 0), store.clone(), receiver, &shutdown);

        let (result, _) = tokio::join!(runner.run(), async move {
            sender.send(Trigger::Initial).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            sender.send(Trigger::PageChanged).await.unwrap();
        });
        result?;

        assert_eq!(loads.load(Ordering::SeqCst), 2);
        let months = read_months(store.as_ref()).await?;
        assert_eq!(months.len(), 2);
        assert_eq!(
            read_total(store.as_ref()).await?.unwrap().period,
            "from 2024-3 to 2024-4"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_trigger_supersedes_polling_cycle() -> Result<()> {
        let loads = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel(10);
        // March never gets a chance, the first cycle is still polling when April is opened
        let runner = runner(source(loads.clone(), usize::MAX - 1), store.clone(), receiver, &shutdown);

        let (result, _) = tokio::join!(runner.run(), async {
            sender.send(Trigger::Initial).await.unwrap();
            tokio::time::sleep(Duration::from_millis(3500)).await;
            sender.send(Trigger::PageChanged).await.unwrap();
            tokio::time::sleep(Duration::from_millis(3500)).await;
            shutdown.cancel();
            drop(sender);
        });
        result?;

        assert_eq!(store.writes(), 0);
        // 4 loads from the first cycle and 4 from the second one
        assert_eq!(loads.load(Ordering::SeqCst), 8);
        Ok(())
    }
}
