//! Store statistics.
//!
//! `awr stats` prints the database location and size, the embedding model,
//! and the record count of each collection.

use anyhow::Result;

use crate::config::Config;
use crate::vector_store::VectorStore;

/// Run the stats command and print a summary.
pub async fn run_stats(config: &Config, store: &VectorStore, json: bool) -> Result<()> {
    let stats = store.collection_stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let embedder = store.embedder();
    let total: u64 = stats.iter().map(|s| s.count).sum();

    println!("Awareness Retrieval - Store Stats");
    println!("=================================");
    println!();
    println!("  Database:    {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Embedder:    {} ({} dims)", embedder.model_name(), embedder.dims());
    println!("  Documents:   {}", total);
    println!();
    println!("  {:<12} {:>8}   {}", "COLLECTION", "DOCS", "DESCRIPTION");
    println!("  {}", "-".repeat(76));
    for s in &stats {
        println!("  {:<12} {:>8}   {}", s.name.as_str(), s.count, s.description);
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
