use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use collection::{trigger::Trigger, watcher::PageWatcher};
use processing::{
    poller::{CycleOutcome, DomPoller},
    scan::Scanner,
    CycleRunner,
};
use storage::{
    aggregator::{AggregatorSettings, MonthAggregator},
    store::PersistentStore,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    config::ScanConfig,
    page::{dom::Selectors, FilePageSource, PageSource},
    utils::clock::{Clock, DefaultClock},
};

pub mod collection;
pub mod processing;
pub mod shutdown;
pub mod storage;

/// Scans `page` once, retrying until it's ready, the attempts run out or Ctrl-C is pressed.
pub async fn scan_page(
    page: PathBuf,
    output: Option<PathBuf>,
    store: Arc<dyn PersistentStore>,
    config: &ScanConfig,
) -> Result<CycleOutcome> {
    let shutdown_token = CancellationToken::new();
    let source = FilePageSource::new(page, output);
    let poller = create_poller(Box::new(source), store, config, DefaultClock)?;

    let (_, outcome) = tokio::join!(shutdown::detect_shutdown(shutdown_token.clone()), async {
        let outcome = poller.run_cycle(&shutdown_token).await;
        shutdown_token.cancel();
        outcome
    });
    outcome
}

/// Represents the starting point for watching a page. Every new snapshot of `page` starts a scan
/// cycle, until Ctrl-C is pressed.
pub async fn start_watch(
    page: PathBuf,
    output: Option<PathBuf>,
    store: Arc<dyn PersistentStore>,
    config: &ScanConfig,
) -> Result<()> {
    let shutdown_token = CancellationToken::new();

    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        watch(page, output, store, config, &shutdown_token, DefaultClock),
    );
    result
}

async fn watch(
    page: PathBuf,
    output: Option<PathBuf>,
    store: Arc<dyn PersistentStore>,
    config: &ScanConfig,
    shutdown_token: &CancellationToken,
    clock: impl Clock + Clone,
) -> Result<()> {
    let (sender, receiver) = mpsc::channel::<Trigger>(10);

    let watcher = create_watcher(sender, page.clone(), shutdown_token, config, clock.clone());

    let source = FilePageSource::new(page, output);
    let poller = create_poller(Box::new(source), store, config, clock)?;
    let runner = CycleRunner::new(receiver, poller, shutdown_token.clone());

    let (watch_result, processing_result) = tokio::join!(watcher.run(), runner.run());

    if let Err(watch_result) = &watch_result {
        error!("Page watcher got an error {:?}", watch_result);
    }

    if let Err(processing_result) = &processing_result {
        error!("Cycle runner got an error {:?}", processing_result);
    }

    watch_result.and(processing_result)
}

fn create_watcher(
    sender: mpsc::Sender<Trigger>,
    page: PathBuf,
    shutdown_token: &CancellationToken,
    config: &ScanConfig,
    clock: impl Clock,
) -> PageWatcher {
    PageWatcher::new(
        sender,
        page,
        shutdown_token.clone(),
        config.watch_interval,
        Box::new(clock),
    )
}

fn create_poller(
    source: Box<dyn PageSource>,
    store: Arc<dyn PersistentStore>,
    config: &ScanConfig,
    clock: impl Clock + Clone,
) -> Result<DomPoller> {
    let selectors = Selectors::compile(&config.selectors)?;
    let aggregator = create_aggregator(store, config, clock.clone());
    let scanner = Scanner::new(source, selectors, config.conversion, aggregator);
    Ok(DomPoller::new(
        scanner,
        config.retry_delay,
        config.max_attempts,
        Box::new(clock),
    ))
}

pub fn create_aggregator(
    store: Arc<dyn PersistentStore>,
    config: &ScanConfig,
    clock: impl Clock,
) -> MonthAggregator {
    MonthAggregator::new(store, AggregatorSettings::from(config), Box::new(clock))
}
