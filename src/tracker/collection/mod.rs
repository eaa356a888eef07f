//! Sources of [trigger::Trigger] events. The page itself is rendered somewhere else, all we can
//! observe are new snapshots of it.

pub mod trigger;
pub mod watcher;
