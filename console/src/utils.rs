use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

#[derive(Args, Debug, Clone)]
pub(crate) struct UtilsArgs {
    #[arg(
        long,
        required = false,
        help_heading = "UTILS",
        help = "Number of worker threads. Uses all cores if not set."
    )]
    pub threads:  Option<usize>,
    #[arg(
        long,
        default_value_t = false,
        help_heading = "UTILS",
        help = "Display a progress bar."
    )]
    pub progress: bool,
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help_heading = "UTILS",
        help = "Increase logging verbosity (-v info, -vv debug)."
    )]
    pub verbose:  u8,
}

impl UtilsArgs {
    /// Initializes logging and sizes the worker pool. Must run before any
    /// pipeline work touches the thread pool.
    pub fn setup(&self) -> anyhow::Result<()> {
        let level = match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };
        pretty_env_logger::formatted_builder()
            .filter_level(level)
            .parse_default_env()
            .try_init()?;
        if let Some(threads) = self.threads {
            std::env::set_var("METHPREP_NUM_THREADS", threads.to_string());
        }
        Ok(())
    }
}

pub fn init_pbar(total: usize) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}, ETA: {eta}] [{bar:40.cyan/blue}] {pos:>5.green}/{len:5} {msg}")?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("Processing...");
    Ok(progress_bar)
}
