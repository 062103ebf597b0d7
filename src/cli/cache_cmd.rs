//! Cache CLI commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::storage::Project;

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Rebuild the index from the catalog files
    Rebuild,

    /// Show index status
    Status,

    /// Delete the index; it is rebuilt on next use
    Clear,
}

pub fn run(cmd: CacheCommands, output: &Output) -> Result<()> {
    match cmd {
        CacheCommands::Rebuild => rebuild(output),
        CacheCommands::Status => status(output),
        CacheCommands::Clear => clear(output),
    }
}

fn rebuild(output: &Output) -> Result<()> {
    let project = Project::open_current()?;

    let start = std::time::Instant::now();
    let cache = project.rebuild_cache()?;
    let duration = start.elapsed();
    let counts = cache.counts()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "rebuilt": true,
            "duration_ms": duration.as_millis(),
            "counts": counts,
        }));
    } else {
        output.success(&format!(
            "Cache rebuilt in {:?} ({} categories, {} ads, {} tags)",
            duration, counts.categories, counts.ads, counts.tags
        ));
    }

    Ok(())
}

fn status(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let cache = project.cache()?;

    let stale = cache.is_stale()?;
    let counts = cache.counts()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "path": cache.path().display().to_string(),
            "stale": stale,
            "counts": counts,
        }));
    } else {
        println!("Cache: {}", cache.path().display());
        println!("Status: {}", if stale { "stale" } else { "fresh" });
        println!(
            "Indexed: {} categories, {} ads, {} tags",
            counts.categories, counts.ads, counts.tags
        );
    }

    Ok(())
}

fn clear(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let removed = project.clear_cache()?;

    if output.is_json() {
        output.data(&serde_json::json!({ "cleared": removed }));
    } else if removed {
        output.success("Cache cleared");
    } else {
        output.success("No cache to clear");
    }
    Ok(())
}
