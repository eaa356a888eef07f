use std::{path::PathBuf, time::Duration, time::SystemTime};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::utils::clock::Clock;

use super::trigger::Trigger;

/// Watches the page snapshot and sends a [Trigger] whenever a new one gets saved.
pub struct PageWatcher {
    next: mpsc::Sender<Trigger>,
    page: PathBuf,
    shutdown: CancellationToken,
    check_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl PageWatcher {
    pub fn new(
        next: mpsc::Sender<Trigger>,
        page: PathBuf,
        shutdown: CancellationToken,
        check_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            page,
            shutdown,
            check_frequency,
            time_provider,
        }
    }

    async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.page)
            .await
            .and_then(|metadata| metadata.modified())
            .ok()
    }

    async fn send(&self, trigger: Trigger) -> Result<()> {
        debug!("Sending trigger {trigger:?}");
        self.next
            .send(trigger)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }

    /// Executes the watcher event loop. The first trigger is sent right away, so the page gets
    /// scanned even if it never changes.
    pub async fn run(self) -> Result<()> {
        let mut last_modified = self.modified().await;
        self.send(Trigger::Initial).await?;

        let mut check_point = self.time_provider.instant();
        loop {
            check_point += self.check_frequency;

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop the cycle runner.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(check_point) => ()
            }

            let modified = self.modified().await;
            if modified == last_modified {
                continue;
            }
            last_modified = modified;

            if modified.is_some() {
                info!("New snapshot of {:?}", self.page);
                self.send(Trigger::PageChanged).await?;
            }
        }
    }
}
