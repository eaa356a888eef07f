//! Leaf conversions used by the scanning pipeline: durations into fractional days and period
//! labels into month keys.

pub mod duration;
pub mod month_key;
