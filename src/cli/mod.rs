pub mod report;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use report::{print_cycle_outcome, print_months, print_total};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{PeriodOrder, ScanConfig},
    tracker::{
        create_aggregator, scan_page, start_watch,
        storage::{
            read_months, read_total,
            store::{JsonFileStore, MemoryStore, PersistentStore},
        },
    },
    utils::{
        clock::DefaultClock,
        dir::{create_application_default_path, ensure_dir, store_path},
        logging::{enable_logging, REPORT_PREFIX, SCAN_PREFIX, WATCH_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "pacedays", version, long_about = None)]
#[command(about = "Converts logged time of a timesheet page into days and keeps a monthly tally", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "JSON file with scan settings")]
    config: Option<PathBuf>,
    #[arg(long = "log", global = true, help = "Log level, takes precedence over RUST_LOG")]
    log: Option<LevelFilter>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console", global = true)]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Scan a page snapshot once, waiting for it to finish rendering")]
    Scan {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long, help = "Annotate the page without touching the store")]
        dry_run: bool,
    },
    #[command(about = "Rescan the page every time a new snapshot is saved. Stops on Ctrl-C")]
    Watch {
        #[command(flatten)]
        page: PageArgs,
    },
    #[command(about = "Display every stored month")]
    Months {},
    #[command(about = "Display the total over all stored months")]
    Total {},
    #[command(about = "Rebuild the total from the stored months")]
    Recompute {
        #[arg(long, value_enum, help = "How the first and last month of the period are picked")]
        period_order: Option<PeriodOrder>,
    },
}

#[derive(ClapArgs, Debug)]
struct PageArgs {
    #[arg(long, help = "HTML snapshot of the timesheet page")]
    page: PathBuf,
    #[arg(long, help = "Where to write the annotated page. Defaults to the snapshot itself")]
    output: Option<PathBuf>,
    #[arg(long, help = "Delay between scans of a page that isn't ready, in milliseconds")]
    retry_delay_ms: Option<u64>,
    #[arg(long, help = "Scans before giving up on a page, 0 retries forever")]
    max_attempts: Option<u32>,
    #[arg(long, value_enum, help = "How the first and last month of the period are picked")]
    period_order: Option<PeriodOrder>,
}

impl PageArgs {
    fn apply(&self, config: &mut ScanConfig) {
        if let Some(delay) = self.retry_delay_ms {
            config.retry_delay = std::time::Duration::from_millis(delay);
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = (attempts > 0).then_some(attempts);
        }
        if let Some(order) = self.period_order {
            config.period_order = order;
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };
    let mut config = ScanConfig::load(args.config.as_deref())?;

    let prefix = match args.commands {
        Commands::Scan { .. } => SCAN_PREFIX,
        Commands::Watch { .. } => WATCH_PREFIX,
        _ => REPORT_PREFIX,
    };
    enable_logging(prefix, &app_dir, args.log, args.log_console)?;

    let open_store = || -> Result<Arc<dyn PersistentStore>> {
        Ok(Arc::new(JsonFileStore::new(store_path(&app_dir))?))
    };

    match args.commands {
        Commands::Scan { page, dry_run } => {
            page.apply(&mut config);
            let store: Arc<dyn PersistentStore> = if dry_run {
                Arc::new(MemoryStore::new())
            } else {
                open_store()?
            };
            let outcome = scan_page(page.page, page.output, store, &config).await?;
            print_cycle_outcome(&outcome);
            Ok(())
        }
        Commands::Watch { page } => {
            page.apply(&mut config);
            start_watch(page.page, page.output, open_store()?, &config).await
        }
        Commands::Months {} => {
            let store = open_store()?;
            print_months(&read_months(store.as_ref()).await?);
            Ok(())
        }
        Commands::Total {} => {
            let store = open_store()?;
            print_total(read_total(store.as_ref()).await?.as_ref());
            Ok(())
        }
        Commands::Recompute { period_order } => {
            if let Some(order) = period_order {
                config.period_order = order;
            }
            let aggregator = create_aggregator(open_store()?, &config, DefaultClock);
            print_total(aggregator.recompute_total().await?.as_ref());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use clap::Parser;

    use crate::config::{PeriodOrder, ScanConfig};

    use super::{Args, Commands};

    #[test]
    fn test_page_flags_override_config() {
        let args = Args::try_parse_from([
            "pacedays",
            "scan",
            "--page",
            "page.html",
            "--retry-delay-ms",
            "50",
            "--max-attempts",
            "0",
            "--period-order",
            "chronological",
            "--dir",
            "/tmp/pacedays",
        ])
        .unwrap();

        let Commands::Scan { page, dry_run } = args.commands else {
            panic!("Expected scan command");
        };
        let mut config = ScanConfig::default();
        page.apply(&mut config);

        assert!(!dry_run);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.period_order, PeriodOrder::Chronological);
        assert_eq!(args.dir.as_deref(), Some(Path::new("/tmp/pacedays")));
    }

    #[test]
    fn test_page_is_required() {
        assert!(Args::try_parse_from(["pacedays", "watch"]).is_err());
    }
}
