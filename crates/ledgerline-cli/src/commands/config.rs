use anyhow::Result;
use ledgerline_etl::{config, Config};

fn display_or_unset(path: Option<&std::path::PathBuf>) -> String {
    path.map_or_else(|| String::from("<not set>"), |p| p.display().to_string())
}

/// Show the current effective configuration.
pub fn show_config(config: &Config) -> Result<()> {
    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config::config_file_path().display());

    let exists = config::config_file_path().exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  songs_dir: {}", display_or_unset(config.songs_dir.as_ref()));
    println!("  images_dir: {}", display_or_unset(config.images_dir.as_ref()));
    println!("  root_dir: {}", config.root_dir.display());
    println!(
        "  ingest.workers: {}",
        config
            .ingest
            .workers
            .map_or_else(|| String::from("<auto>"), |n| n.to_string())
    );
    println!("  ingest.extension: {}", config.ingest.extension);
    println!("  ingest.similarity_threshold: {}", config.ingest.similarity_threshold);
    println!("  ingest.cover_size: {}", config.ingest.cover_size);
    println!("  ingest.jpeg_quality: {}", config.ingest.jpeg_quality);
    println!("  ingest.batch_size: {}", config.ingest.batch_size);
    println!(
        "  ingest.seed_from_existing_images: {}",
        config.ingest.seed_from_existing_images
    );
    println!("  logging.level: {:?}", config.logging.level());
    println!("  logging.coloured: {}", config.logging.coloured());
    println!("  logging.output: {:?}", config.logging.output());

    println!("\nPriority: CLI args > ENV vars (LEDGER_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    let config_path = config::config_file_path();
    println!("{}", config_path.display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to set songs_dir and images_dir.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
