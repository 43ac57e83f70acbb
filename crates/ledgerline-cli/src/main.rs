use anyhow::Result;
use clap::Parser;
use ledgerline_etl::Config;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "ledgerline", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the catalog database (default: ~/.local/share/ledgerline)
    #[arg(long, global = true)]
    root_dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Catalog every audio file in the songs directory
    ///
    /// Recursively walks the songs directory and, for each audio file:
    ///
    /// - Reads its ID3v2 tag; files without one are counted as errors
    /// - Writes a permanent catalog id into a TXXX:42id frame if it has none
    /// - Saves its embedded cover to the images directory as <n>.jpg, unless a
    ///   near-identical cover was already saved
    /// - Inserts or updates its row in the catalog
    ///
    /// Files are split evenly across a fixed pool of worker threads. The run
    /// is incremental: files that already carry an id are only refreshed.
    /// Newly assigned ids are recorded as one entry in the additions log.
    ///
    /// Per-file failures are logged and counted but never stop the run.
    Scan {
        /// Directory scanned for audio files
        #[arg(long)]
        songs_dir: Option<PathBuf>,

        /// Directory receiving cover images
        #[arg(long)]
        images_dir: Option<PathBuf>,

        /// Number of worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Show catalog statistics and the additions log
    Status,
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Print an annotated example config file
    Example,
    /// Create the config file if it does not exist
    Init,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    twyg::setup(config.logging.clone())
        .map_err(|e| anyhow::anyhow!("Failed to set up logging: {e}"))?;

    match cli.command {
        Commands::Scan {
            songs_dir,
            images_dir,
            workers,
            json,
        } => {
            let config = config.with_overrides(songs_dir, images_dir, cli.root_dir, workers);
            commands::run_scan(&config, json)?;
        }
        Commands::Status => {
            let config = config.with_overrides(None, None, cli.root_dir, None);
            commands::show_status(&config)?;
        }
        Commands::Config(command) => match command {
            ConfigCommand::Show => commands::config::show_config(&config)?,
            ConfigCommand::Path => commands::config::show_path()?,
            ConfigCommand::Example => commands::config::show_example()?,
            ConfigCommand::Init => commands::config::init_config()?,
        },
    }

    Ok(())
}
