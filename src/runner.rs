use std::path::PathBuf;

use crate::error::TyphoidError;
use crate::log::{parse_log_levels, LevelFilter, LogLevels};
use crate::manifest::{Manifest, DEFAULT_MANIFEST};
use clap::{ArgAction, Args};

/// Arguments shared by every `typhoid` subcommand
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Path of the manifest naming the schema, model binary and data files
    #[arg(short, long, default_value = DEFAULT_MANIFEST, global = true)]
    pub manifest: PathBuf,

    /// Enable logging: a level (`info`) or module levels (`warn,emod_typhoid::platform=debug`)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Default for BaseArgs {
    fn default() -> Self {
        BaseArgs {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            log_level: None,
            verbose: 0,
        }
    }
}

fn verbosity_level(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

/// The levels requested by `args`. `--log-level` wins over `-v` for the global level.
///
/// # Errors
/// Returns an error if `--log-level` is not a valid level specification.
pub fn log_levels(args: &BaseArgs) -> Result<LogLevels, TyphoidError> {
    let mut levels = match &args.log_level {
        Some(text) => parse_log_levels(text)?,
        None => LogLevels::default(),
    };
    if levels.global.is_none() {
        levels.global = verbosity_level(args.verbose);
    }
    Ok(levels)
}

/// Installs the logger configuration requested on the command line.
///
/// # Errors
/// Returns an error if `--log-level` is not a valid level specification.
pub fn init_logging(args: &BaseArgs) -> Result<(), TyphoidError> {
    let levels = log_levels(args)?;
    if let Some(level) = levels.global {
        println!("Logging enabled at level {level}");
    }
    for (module, level) in &levels.modules {
        println!("Logging enabled for {module} at level {level}");
    }
    levels.apply();
    Ok(())
}

/// Sets up logging and loads the manifest named by `args`.
///
/// # Errors
/// Returns an error if the log levels are invalid or the manifest exists but cannot be loaded.
pub fn prepare(args: &BaseArgs) -> Result<Manifest, TyphoidError> {
    init_logging(args)?;
    Manifest::load_or_default(&args.manifest)
}
