mod commands;
mod terminal;

use commands::{CommandLine, Commands, plan, run, validate};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init(commands.verbose, commands.quiet);
    let quiet: u8 = commands.quiet;

    match commands.command {
        Commands::Validate { config } => {
            print::header("validating policy", quiet);
            validate::validate(&config, quiet)
        }
        Commands::Plan { config, snapshot } => {
            print::header("planning scan jobs", quiet);
            plan::plan(&config, &snapshot, quiet).await
        }
        Commands::Run {
            config,
            snapshot,
            workers,
        } => {
            print::header("starting controller", quiet);
            run::run(&config, &snapshot, workers, quiet).await
        }
    }
}
