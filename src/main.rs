mod cli;
mod commands;

use crate::cli::{Cli, Commands};
use tapefile::config::TapeConfig;
use tapefile::error::Result;
use tapefile::logger;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse_args();

    // Initialize logging system
    logger::init(args.verbose, args.json)?;

    debug!("tapefile CLI starting");

    match run(args).await {
        Ok(_) => {
            info!("Operation completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Operation failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = TapeConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Label {
            image,
            vid,
            force,
            old_label,
            no_lbp,
        } => commands::label::execute(image, vid, force, old_label, no_lbp, &config).await,

        Commands::Write {
            image,
            vid,
            source,
            fseq,
            file_id,
            block_size,
        } => {
            commands::write::execute(image, vid, source, fseq, file_id, block_size, &config).await
        }

        Commands::Read {
            image,
            vid,
            fseq,
            file_id,
            block_id,
            destination,
        } => {
            commands::read::execute(image, vid, fseq, file_id, block_id, destination, &config)
                .await
        }

        Commands::Dump { image } => commands::dump::execute(image, &config).await,
    }
}
