//! Search commands for the CLI.
//!
//! `awr search` queries one collection, `awr search-all` fans out to all
//! three. Both print ranked hits with similarity, title, source, and an
//! excerpt, or the raw hits as JSON with `--json`.

use anyhow::Result;

use awareness_retrieval_core::filter::MetadataFilter;
use awareness_retrieval_core::search::SearchHit;

use crate::vector_store::VectorStore;

const EXCERPT_CHARS: usize = 240;

/// CLI entry point for `awr search`.
pub async fn run_search(
    store: &VectorStore,
    collection: &str,
    query: &str,
    filter: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let filter = filter.map(MetadataFilter::parse).transpose()?;
    let hits = store
        .search(collection, query, filter.as_ref(), limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_hits(&hits);
    Ok(())
}

/// CLI entry point for `awr search-all`.
pub async fn run_search_all(store: &VectorStore, query: &str, limit: usize, json: bool) -> Result<()> {
    let results = store.search_all(query, limit).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for (collection, hits) in &results {
        println!("=== {} ({}) ===", collection, hits.len());
        if hits.is_empty() {
            println!("No results.");
            println!();
        } else {
            print_hits(hits);
        }
    }
    Ok(())
}

pub(crate) fn print_hits(hits: &[SearchHit]) {
    for (i, hit) in hits.iter().enumerate() {
        let score = match hit.similarity {
            Some(s) => format!("{:.2}", s),
            None => "-".to_string(),
        };
        let title = hit.metadata.title.as_deref().unwrap_or("(untitled)");

        println!("{}. [{}] {} / {}", i + 1, score, hit.metadata.doc_type, title);
        println!("    source: {}", hit.metadata.source);
        if let Some(ref category) = hit.metadata.category {
            println!("    category: {}", category);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.content));
        println!("    id: {}", hit.id);
        println!();
    }
}

fn excerpt(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}
