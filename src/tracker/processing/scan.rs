use std::fmt::Display;

use anyhow::Result;
use tracing::{debug, info};

use crate::{
    page::{
        annotate::{month_annotation, DayAnnotator},
        dom::{visible_text, Annotations, Page, Selectors},
        PageSource,
    },
    tracker::storage::aggregator::{CommitOutcome, MonthAggregator},
    units::duration::{to_fractional_day, Conversion, FractionalDay},
};

/// Why a page can't be scanned yet. None of these are failures, the page is usually still
/// rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    PageMissing,
    MonthTotalMissing,
    /// Month total is shown but none of the days have a duration yet.
    NoValidDays,
    LabelMissing,
}

impl Display for NotReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReadyReason::PageMissing => write!(f, "page snapshot is missing"),
            NotReadyReason::MonthTotalMissing => write!(f, "month total isn't rendered"),
            NotReadyReason::NoValidDays => write!(f, "no day has a duration"),
            NotReadyReason::LabelMissing => write!(f, "period label isn't rendered"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub label: String,
    pub month_time: FractionalDay,
    pub days: u32,
    /// Whether annotations had to be written into the page.
    pub page_updated: bool,
    pub commit: CommitOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanStep {
    NotReady(NotReadyReason),
    Scanned(ScanReport),
}

struct PageAnalysis {
    label: String,
    month_time: FractionalDay,
    days: u32,
    annotated: Option<String>,
}

/// One look at the page: locate the month total, annotate the days, store the month.
pub struct Scanner {
    source: Box<dyn PageSource>,
    selectors: Selectors,
    annotator: DayAnnotator,
    conversion: Conversion,
    aggregator: MonthAggregator,
}

impl Scanner {
    pub fn new(
        source: Box<dyn PageSource>,
        selectors: Selectors,
        conversion: Conversion,
        aggregator: MonthAggregator,
    ) -> Self {
        Self {
            source,
            selectors,
            annotator: DayAnnotator::new(conversion),
            conversion,
            aggregator,
        }
    }

    /// Scans the current snapshot once. Nothing is written unless the page is ready.
    pub async fn scan_once(&self) -> Result<ScanStep> {
        let Some(html) = self.source.load().await? else {
            return Ok(ScanStep::NotReady(NotReadyReason::PageMissing));
        };

        let analysis = match self.analyze(&html) {
            Ok(analysis) => analysis,
            Err(reason) => return Ok(ScanStep::NotReady(reason)),
        };

        let page_updated = analysis.annotated.is_some();
        if let Some(annotated) = analysis.annotated {
            self.source.publish(annotated).await?;
            debug!("Published annotated page");
        }

        let commit = self
            .aggregator
            .commit(&analysis.label, analysis.month_time, analysis.days)
            .await?;

        info!(
            "Scanned {}: {}j over {} days",
            analysis.label, analysis.month_time, analysis.days
        );
        Ok(ScanStep::Scanned(ScanReport {
            label: analysis.label,
            month_time: analysis.month_time,
            days: analysis.days,
            page_updated,
            commit,
        }))
    }

    fn analyze(&self, html: &str) -> Result<PageAnalysis, NotReadyReason> {
        let page = Page::parse(html);

        let Some(month) = page.month_total(&self.selectors) else {
            return Err(NotReadyReason::MonthTotalMissing);
        };

        let mut annotations = Annotations::new();
        let days = self
            .annotator
            .annotate(&page, &self.selectors, &mut annotations);
        if days == 0 {
            return Err(NotReadyReason::NoValidDays);
        }

        let Some(label) = page.period_label(&self.selectors) else {
            return Err(NotReadyReason::LabelMissing);
        };

        let month_time = to_fractional_day(&visible_text(month), self.conversion);
        if month_time.is_finite() {
            annotations.add(month, month_annotation(month_time, days));
        }

        let edits = annotations
            .is_changed()
            .then(|| annotations.into_edits());
        let annotated = edits.map(|edits| page.render(edits));

        Ok(PageAnalysis {
            label,
            month_time,
            days,
            annotated,
        })
    }
}
