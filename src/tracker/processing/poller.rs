use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::clock::Clock;

use super::scan::{ScanReport, ScanStep, Scanner};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Scanned(ScanReport),
    /// The page never became ready within the allowed attempts.
    GaveUp { attempts: u32 },
    Cancelled,
}

/// Keeps scanning the page until it's ready. Every "not ready" answer schedules exactly one retry
/// after the configured delay.
pub struct DomPoller {
    scanner: Scanner,
    retry_delay: Duration,
    max_attempts: Option<u32>,
    clock: Box<dyn Clock>,
}

impl DomPoller {
    pub fn new(
        scanner: Scanner,
        retry_delay: Duration,
        max_attempts: Option<u32>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            scanner,
            retry_delay,
            max_attempts,
            clock,
        }
    }

    /// Runs one scan cycle. Errors end the cycle, the page isn't rescanned after them.
    pub async fn run_cycle(&self, cancellation: &CancellationToken) -> Result<CycleOutcome> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let reason = match self.scanner.scan_once().await? {
                ScanStep::Scanned(report) => return Ok(CycleOutcome::Scanned(report)),
                ScanStep::NotReady(reason) => reason,
            };

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                warn!("Page still not ready after {attempts} attempts ({reason}), giving up");
                return Ok(CycleOutcome::GaveUp { attempts });
            }

            debug!(
                "Page not ready ({reason}), retrying in {:?}",
                self.retry_delay
            );
            tokio::select! {
                _ = cancellation.cancelled() => {
                    debug!("Cycle cancelled after {attempts} attempts");
                    return Ok(CycleOutcome::Cancelled)
                }
                _ = self.clock.sleep(self.retry_delay) => ()
            }
        }
    }
}
