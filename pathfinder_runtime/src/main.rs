//! `pftm`: replay a Pathfinder audit log and report the reconstructed map.
//!
//! Usage: `pftm --map=map_2.log [--channel=SRG-C] [--verbose]`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use pathfinder_runtime::log_reader::LogReader;
use pathfinder_runtime::session::ReplaySession;

#[derive(Parser)]
#[command(name = "pftm", version, about = "Pathfinder time machine: replays map audit logs")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Pathfinder log file
    #[arg(long, value_name = "FILE", default_value = "map_1.log")]
    map: PathBuf,

    /// Only replay lines from this map channel
    #[arg(long, env = "PFTM_CHANNEL")]
    channel: Option<String>,

    /// Show every applied mutation while working
    #[arg(long)]
    verbose: bool,

    /// Print version info
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run(cli: &Cli) -> Result<()> {
    let reader = LogReader::open(&cli.map)?;
    let mut session = ReplaySession::new(cli.channel.clone());
    let summary = session
        .run(&reader)
        .with_context(|| format!("replay of {} stopped", cli.map.display()))?;

    let report = serde_json::to_string_pretty(&summary).context("cannot render summary")?;
    println!("{}", report);
    Ok(())
}
