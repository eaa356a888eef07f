use crate::tracker::{
    processing::poller::CycleOutcome,
    storage::{
        aggregator::CommitOutcome,
        entities::{MonthsTable, TotalSummary},
    },
};

pub fn print_months(months: &MonthsTable) {
    if months.is_empty() {
        println!("No months stored yet");
        return;
    }
    for (key, month) in months {
        println!("{key}\t{}\t{}j\t{} days", month.name, month.time, month.days);
    }
}

pub fn print_total(total: Option<&TotalSummary>) {
    match total {
        Some(total) => println!("{}\t{}j\t{} days", total.period, total.time, total.days),
        None => println!("No months stored yet"),
    }
}

pub fn print_cycle_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Scanned(report) => {
            println!(
                "{}\t{}j/{}\t{}",
                report.label,
                report.month_time,
                report.days,
                if report.page_updated {
                    "annotated"
                } else {
                    "unchanged"
                }
            );
            match &report.commit {
                CommitOutcome::Committed { total, .. } => print_total(Some(total)),
                CommitOutcome::Skipped => println!("Month total isn't a duration, nothing stored"),
            }
        }
        CycleOutcome::GaveUp { attempts } => {
            println!("Page wasn't ready after {attempts} attempts")
        }
        CycleOutcome::Cancelled => println!("Cancelled"),
    }
}
