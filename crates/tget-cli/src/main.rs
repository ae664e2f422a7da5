use clap::Parser;
use tget_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging as early as possible.
    if let Err(err) = logging::init_logging(cli.log_path.as_deref(), cli.verbose) {
        eprintln!("tget: file logging unavailable ({:#}), logging to stderr", err);
        logging::init_logging_stderr(cli.verbose);
    }

    match cli::run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("tget error: {:#}", err);
            std::process::exit(1);
        }
    }
}
