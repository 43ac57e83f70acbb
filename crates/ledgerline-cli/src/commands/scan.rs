use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use ledgerline_etl::{ingest_library, Config, Id3Accessor, ProgressSink};
use std::fmt;

pub fn run_scan(config: &Config, json: bool) -> Result<()> {
    let report = ingest_library(config, Id3Accessor::new(), Box::new(ConsoleProgress::new()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n✓ Scan complete");
    println!("  Files:        {}", report.total_files);
    println!("  Workers:      {}", report.workers);
    println!("  New:          {}", report.stats.new_files);
    println!("  Updated:      {}", report.stats.updated_files);
    println!("  New images:   {}", report.stats.new_images);
    println!("  Errors:       {}", report.stats.errors);
    if let Some((first, last)) = report.minted {
        println!("  Assigned ids: {first}-{last}");
    }
    println!("  Elapsed:      {:.3}s", report.elapsed.as_secs_f64());

    if report.stats.errors > 0 {
        println!("\n  See the log for the files that failed");
    }

    Ok(())
}

/// Progress bar on stderr, sized once the file list is known.
struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        match ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            Ok(style) => bar.set_style(style.progress_chars("#>-")),
            Err(e) => log::debug!("Falling back to the default progress style: {}", e),
        }
        Self { bar }
    }
}

impl fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("position", &self.bar.position())
            .field("length", &self.bar.length())
            .finish()
    }
}

impl ProgressSink for ConsoleProgress {
    fn tick(&self, current: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
        }
        // Ticks from different workers can arrive out of order
        if current as u64 > self.bar.position() {
            self.bar.set_position(current as u64);
        }
    }

    fn finish(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(total as u64);
        self.bar.finish_with_message("done");
    }
}
