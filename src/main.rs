use clap::Parser;
use miette::{miette, Result};

use finally_dec_rs::cli::{self, Cli, Commands, ExtractArgs};

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            output,
            format,
            no_finally,
            exploration_limit,
        } => {
            let args = ExtractArgs {
                input_path: input,
                output_path: output,
                format,
                no_finally,
                exploration_limit,
            };
            cli::extract::extract(&args).map_err(|e| miette!("{}", e))
        }
        Commands::Cfg { input, dot } => {
            cli::cfg::cfg(&input, dot.as_deref()).map_err(|e| miette!("{}", e))
        }
    }
}
