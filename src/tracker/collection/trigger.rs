/// Reason for starting a new scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The tracker has just started looking at the page.
    Initial,
    /// A new snapshot was saved, usually because another month or period was opened.
    PageChanged,
}
