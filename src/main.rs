mod inspect;
mod run;

use crate::inspect::{inspect, InspectArgs};
use crate::run::{run, RunArgs};
use clap::{CommandFactory, Parser, Subcommand};
use log::{warn, LevelFilter};

/// Runs and inspects quill program files.
#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(next_line_help = true)]
pub struct CLI {
    #[arg(
        short,
        long,
        env = "QUILL_VERBOSE",
        default_value = "0",
        allow_negative_numbers = true,
        help = "0 - 4 maps to Error - Trace, negative values turn logging off"
    )]
    verbose: i8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the main program of a program file
    Run(RunArgs),
    /// Print the disassembly of every program in a file
    Inspect(InspectArgs),
}

/// `Err` carries a verbosity above the supported range.
fn level_filter(verbose: i8) -> Result<LevelFilter, i8> {
    let filter = match verbose {
        v if v < 0 => LevelFilter::Off,
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        4 => LevelFilter::Trace,
        unsupported => return Err(unsupported),
    };
    Ok(filter)
}

fn main() {
    let cli = CLI::parse();
    let level = level_filter(cli.verbose);
    pretty_env_logger::formatted_builder()
        .filter_level(level.unwrap_or(LevelFilter::Warn))
        .parse_env("RUST_LOG")
        .init();
    if let Err(unsupported) = level {
        warn!("Unsupported Level {unsupported}, defaulting to warn")
    }

    let Some(command) = cli.command else {
        if let Err(e) = CLI::command().print_help() {
            eprintln!("Failed to print help: {e}");
        }
        return;
    };
    match command {
        Commands::Run(args) => run(args),
        Commands::Inspect(args) => inspect(args),
    }
}
