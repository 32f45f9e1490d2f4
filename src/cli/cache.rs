//! Cache management commands

use colored::Colorize;
use serde_json::json;

use crate::cache::CacheStorage;
use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::config::Config;
use crate::error::Result;
use crate::output::format_size;
use crate::output::json::format_json;

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let cache_dir = CacheStorage::cache_dir()?;
    let stats = CacheStorage::open_at(&cache_dir)?.stats()?;
    let settings = Config::load_at(opts.config_ref()).ok().map(|config| config.cache);

    match opts.format {
        OutputFormat::Json => {
            let json = json!({
                "total_entries": stats.total_entries,
                "valid_entries": stats.valid_entries,
                "expired_entries": stats.expired_entries,
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "oldest_entry_timestamp": stats.oldest_entry,
                "newest_entry_timestamp": stats.newest_entry,
                "path": cache_dir.display().to_string(),
                "persist": settings.as_ref().map(|s| s.persist),
                "stale_time_secs": settings.as_ref().map(|s| s.stale_time_secs),
                "gc_time_secs": settings.as_ref().map(|s| s.gc_time_secs),
            });
            println!("{}", format_json(&json)?);
        }
        OutputFormat::Table => {
            println!("Cache Status");
            println!("────────────────────────────────────────");
            println!("Location:       {}", cache_dir.display());
            println!("Valid entries:  {}", stats.valid_entries);
            println!("Expired:        {}", stats.expired_entries);
            println!("Total size:     {}", format_size(stats.total_size_bytes));

            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry:   {}", format_timestamp(oldest));
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry:   {}", format_timestamp(newest));
            }

            if let Some(settings) = settings {
                println!();
                if settings.persist {
                    println!("{} Persistence enabled", "✓".green());
                } else {
                    println!("{} Persistence disabled (memory only)", "○".dimmed());
                }
                println!(
                    "Stale after {}s, dropped after {}s unused",
                    settings.stale_time_secs, settings.gc_time_secs
                );
            }
        }
    }

    Ok(())
}

/// Clear all cache entries
pub fn clear(format: OutputFormat) -> Result<()> {
    let stats = CacheStorage::open()?.clear_all()?;

    match format {
        OutputFormat::Json => {
            let json = json!({
                "entries_removed": stats.entries_removed,
                "success": true,
            });
            println!("{}", format_json(&json)?);
        }
        OutputFormat::Table => {
            if stats.entries_removed > 0 {
                println!("Cleared {} cache entries", stats.entries_removed);
            } else {
                println!("Cache was already empty");
            }
        }
    }

    Ok(())
}

/// Show cache path
pub fn path() -> Result<()> {
    println!("{}", CacheStorage::cache_dir()?.display());
    Ok(())
}

/// Local time as `2026-05-01 10:00`
fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|d| {
            d.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}
