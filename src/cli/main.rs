use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use emod_typhoid::runner::{prepare, BaseArgs};

mod commands;

#[derive(Parser)]
#[command(name = "typhoid")]
#[command(about = "Build EMOD typhoid campaigns and inputs, and run the seed sweep locally")]
struct Cli {
    #[command(flatten)]
    base: BaseArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a campaign with a birth-triggered carrier clearance event
    Campaign {
        /// Day the event starts
        #[arg(short, long, default_value_t = 1.0)]
        start_day: f64,
        /// Campaign file to write (TyphoidCarrierClear.json by default)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write config, campaign and demographics files for one simulation
    Inputs {
        /// Directory to write the files into
        #[arg(short, long, default_value = "inputs")]
        dir: PathBuf,
    },
    /// Run the five-seed experiment and summarise the Infected channel
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let manifest = prepare(&cli.base)?;

    match cli.command {
        Commands::Campaign { start_day, output } => {
            commands::campaign(&manifest, start_day, output.as_deref())
        }
        Commands::Inputs { dir } => commands::inputs(&manifest, &dir),
        Commands::Run => commands::run(&manifest),
    }
}
