//! Converts time logged on a rendered timesheet page into fractional work days. Every valid day
//! and the month total get an annotation with the converted value, and the month is stored in a
//! persistent table together with a running total across months.
//!

pub mod cli;
pub mod config;
pub mod fs;
pub mod page;
pub mod tracker;
pub mod units;
pub mod utils;
