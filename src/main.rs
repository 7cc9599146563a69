use anyhow::Result;
use clap::Parser;

use switchyard::{
    cli::{handle_command, Cli},
    utils::init_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Logs go to stderr so responses on stdout stay clean
    init_logger(cli.verbose);

    let code = handle_command(&cli).await?;
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
