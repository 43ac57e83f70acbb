use anyhow::{Context, Result};
use ledgerline_core::Catalog;
use ledgerline_etl::Config;

pub fn show_status(config: &Config) -> Result<()> {
    let catalog_path = config.root_dir.join(ledgerline_core::schema::CATALOG_FILE_NAME);
    if !catalog_path.exists() {
        println!("No catalog at {}", catalog_path.display());
        println!("\n  Run `ledgerline scan` to create it");
        return Ok(());
    }

    let catalog = Catalog::open(&catalog_path)
        .with_context(|| format!("Failed to open catalog {}", catalog_path.display()))?;

    let songs = catalog.song_count()?;
    let missing_cover = catalog.songs_missing_cover()?.len();
    let additions = catalog.additions()?;

    println!("\n📊 Ledgerline Status\n");
    println!("  Catalog: {}", catalog_path.display());
    println!("  Songs: {}", songs);
    println!("  Highest id: {}", catalog.current_max_id()?);
    println!("  Songs without cover: {}", missing_cover);

    if additions.is_empty() {
        println!("\n  No songs added yet");
    } else {
        println!("\n  Additions:");
        for entry in &additions {
            println!(
                "    {:04}-{:02}-{:02}  {:>6}-{:<6} ({} songs)  {}",
                entry.year,
                entry.month,
                entry.day,
                entry.first_id,
                entry.last_id,
                entry.id_count(),
                entry.comment
            );
        }
    }

    Ok(())
}
