//! Document retrieval by ID.
//!
//! `awr get <collection> <id>` prints the stored content and normalized
//! metadata of one record. A missing id is reported on stderr and exits
//! with status 1.

use anyhow::Result;

use awareness_retrieval_core::models::DocumentRecord;

use crate::vector_store::VectorStore;

/// CLI entry point: fetch the document and print it to stdout.
pub async fn run_get(store: &VectorStore, collection: &str, id: &str, json: bool) -> Result<()> {
    let doc = match store.get_document_by_id(collection, id).await? {
        Some(doc) => doc,
        None => {
            eprintln!("Error: document '{}' not found in '{}'", id, collection);
            store.close().await;
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_document(&doc);
    }
    Ok(())
}

fn print_document(doc: &DocumentRecord) {
    let meta = &doc.metadata;

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!(
        "title:        {}",
        meta.title.as_deref().unwrap_or("(untitled)")
    );
    println!("type:         {}", meta.doc_type);
    println!("source:       {}", meta.source);
    if !meta.date_added.is_empty() {
        println!("date_added:   {}", meta.date_added);
    }
    if let Some(ref author) = meta.author {
        println!("author:       {}", author);
    }
    if let Some(ref category) = meta.category {
        println!("category:     {}", category);
    }
    if let Some(ref tags) = meta.tags {
        println!("tags:         {}", tags.join(", "));
    }
    println!();

    println!("--- Content ---");
    println!("{}", doc.content);
}
