//! Access to the rendered timesheet page. The page is a snapshot of the time-tracking view saved
//! as HTML, [dom::Page] gives read access to the interesting nodes, and [dom::Annotations]
//! writes the converted values back into it.

pub mod annotate;
pub mod dom;

use std::{io::ErrorKind, path::PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::fs::operations::replace_file;

/// Where page snapshots come from and where annotated pages go.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns current snapshot. `None` means that the page hasn't been rendered yet.
    async fn load(&self) -> Result<Option<String>>;

    async fn publish(&self, html: String) -> Result<()>;
}

/// Snapshot stored on disk. By default annotated pages overwrite the snapshot itself.
pub struct FilePageSource {
    page: PathBuf,
    output: PathBuf,
}

impl FilePageSource {
    pub fn new(page: PathBuf, output: Option<PathBuf>) -> Self {
        let output = output.unwrap_or_else(|| page.clone());
        Self { page, output }
    }
}

#[async_trait]
impl PageSource for FilePageSource {
    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.page).await {
            Ok(html) if html.trim().is_empty() => Ok(None),
            Ok(html) => Ok(Some(html)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Page {:?} doesn't exist yet", self.page);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, html: String) -> Result<()> {
        replace_file(&self.output, html.as_bytes()).await?;
        Ok(())
    }
}
