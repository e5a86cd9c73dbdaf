//! Knowledge-base loading.
//!
//! Walks a directory tree, turns each matching file into one or more
//! [`NewDocument`]s, and batch-inserts them into a collection.
//!
//! Supported files:
//! - `.md` / `.txt`: the whole file is the document text. The title is the
//!   first line when it is a Markdown heading, else the file stem.
//! - `.json`: a document object or an array of them. Text comes from `text`,
//!   or else from the non-empty `title`, `description`, and `content` fields
//!   joined with spaces. A nested `metadata` object overrides top-level
//!   metadata fields.
//!
//! Ids are stable digests of collection and relative path (plus array index),
//! so re-ingesting the same tree replaces records instead of duplicating
//! them. A JSON `id` field takes precedence.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use awareness_retrieval_core::models::{CollectionName, MetadataInput, NewDocument};

use crate::config::KnowledgeBaseConfig;
use crate::vector_store::VectorStore;

/// Documents found for one collection.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub collection: CollectionName,
    pub root: PathBuf,
    pub files: usize,
    pub documents: Vec<NewDocument>,
}

/// What an ingest run did to one collection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    pub collection: CollectionName,
    pub files: usize,
    pub documents: usize,
    pub cleared: Option<u64>,
}

/// Resolve `target` (`papers`, `templates`, `threats`, or `all`) into
/// per-collection document sets.
///
/// A single collection reads `path` if given, else `<root>/<collection>`.
/// `all` reads `<root>/<collection>` for each collection and skips missing
/// directories.
pub fn plan(
    kb: &KnowledgeBaseConfig,
    target: &str,
    path: Option<&Path>,
) -> Result<Vec<CollectionPlan>> {
    if target == "all" {
        if path.is_some() {
            bail!("--path cannot be combined with 'all'; use <root>/<collection>/ directories");
        }
        let mut plans = Vec::new();
        for collection in CollectionName::ALL {
            let dir = kb.root.join(collection.as_str());
            if !dir.is_dir() {
                warn!(collection = %collection, dir = %dir.display(), "no directory for collection, skipping");
                continue;
            }
            plans.push(scan_collection(kb, &dir, collection)?);
        }
        return Ok(plans);
    }

    let collection: CollectionName = target.parse()?;
    let dir = match path {
        Some(p) => p.to_path_buf(),
        None => kb.root.join(collection.as_str()),
    };
    if !dir.exists() {
        bail!("Knowledge base directory does not exist: {}", dir.display());
    }
    Ok(vec![scan_collection(kb, &dir, collection)?])
}

/// Walk `dir` and parse every included file.
pub fn scan_collection(
    kb: &KnowledgeBaseConfig,
    dir: &Path,
    collection: CollectionName,
) -> Result<CollectionPlan> {
    let include_set = build_globset(&kb.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(kb.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(kb.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push((path.to_path_buf(), rel_str));
    }

    // Sort for deterministic ordering
    paths.sort_by(|a, b| a.1.cmp(&b.1));

    let date_added = chrono::Utc::now().to_rfc3339();
    let mut documents = Vec::new();
    for (path, rel) in &paths {
        let parsed = parse_file(path, rel, collection, &date_added)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        if parsed.is_empty() {
            warn!(file = %rel, "no document text found, skipping");
        }
        documents.extend(parsed);
    }

    Ok(CollectionPlan {
        collection,
        root: dir.to_path_buf(),
        files: paths.len(),
        documents,
    })
}

/// Parse one file into documents.
pub fn parse_file(
    path: &Path,
    relative: &str,
    collection: CollectionName,
    date_added: &str,
) -> Result<Vec<NewDocument>> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let content = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let base = MetadataInput {
        source: Some(relative.to_string()),
        date_added: Some(date_added.to_string()),
        ..Default::default()
    };

    match extension.as_str() {
        "md" | "txt" => {
            if content.trim().is_empty() {
                return Ok(Vec::new());
            }
            let title = content
                .lines()
                .next()
                .filter(|l| l.starts_with('#'))
                .map(|l| l.trim_start_matches('#').trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or(stem);
            let metadata = MetadataInput {
                title: Some(title),
                ..base
            };
            Ok(vec![NewDocument::new(content)
                .with_id(stable_id(collection, relative, None))
                .with_metadata(metadata)])
        }
        "json" => {
            let value: Value = serde_json::from_str(&content)?;
            match value {
                Value::Array(items) => Ok(items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        json_document(item, &base, relative, stable_id(collection, relative, Some(i)))
                    })
                    .collect()),
                Value::Object(_) => Ok(json_document(
                    &value,
                    &MetadataInput {
                        title: Some(stem),
                        ..base.clone()
                    },
                    relative,
                    stable_id(collection, relative, None),
                )
                .into_iter()
                .collect()),
                _ => bail!("expected a JSON object or array"),
            }
        }
        other => bail!("Unsupported file type: '{}'", other),
    }
}

fn json_document(
    item: &Value,
    base: &MetadataInput,
    relative: &str,
    fallback_id: String,
) -> Option<NewDocument> {
    let obj = item.as_object()?;
    let text = json_text(item)?;

    let str_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut metadata = base.clone();
    if let Some(title) = str_field("title").or_else(|| str_field("name")) {
        metadata.title = Some(title);
    }
    metadata.doc_type = str_field("type").or(metadata.doc_type);
    metadata.author = str_field("author").or(metadata.author);
    metadata.category = str_field("category").or(metadata.category);
    metadata.tags = string_list(obj.get("tags")).or(metadata.tags);

    if let Some(nested) = obj.get("metadata").filter(|m| m.is_object()) {
        match serde_json::from_value::<MetadataInput>(nested.clone()) {
            Ok(overrides) => metadata = merge_metadata(metadata, overrides),
            Err(e) => warn!(file = %relative, error = %e, "ignoring invalid nested metadata"),
        }
    }

    let id = str_field("id").unwrap_or(fallback_id);
    Some(NewDocument::new(text).with_id(id).with_metadata(metadata))
}

/// `text`, else the non-empty `title`, `description`, `content` joined.
fn json_text(item: &Value) -> Option<String> {
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.to_string());
        }
    }

    let parts: Vec<String> = ["title", "description", "content"]
        .iter()
        .filter_map(|key| match item.get(*key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Null | Value::String(_) => None,
            other => Some(other.to_string()),
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join(" "))
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn merge_metadata(base: MetadataInput, overrides: MetadataInput) -> MetadataInput {
    MetadataInput {
        source: overrides.source.or(base.source),
        doc_type: overrides.doc_type.or(base.doc_type),
        date_added: overrides.date_added.or(base.date_added),
        author: overrides.author.or(base.author),
        category: overrides.category.or(base.category),
        tags: overrides.tags.or(base.tags),
        title: overrides.title.or(base.title),
    }
}

/// SHA-256 of `collection:relative[#index]`, hex encoded.
pub fn stable_id(collection: CollectionName, relative: &str, index: Option<usize>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(relative.as_bytes());
    if let Some(i) = index {
        hasher.update(format!("#{}", i).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Insert every planned document.
///
/// With `clear`, each collection's contents are replaced by its plan. The
/// documents are embedded before the old records are removed, so a failed
/// collection keeps what it had.
pub async fn ingest(
    store: &VectorStore,
    plans: Vec<CollectionPlan>,
    clear: bool,
) -> Result<Vec<IngestReport>> {
    let mut reports = Vec::with_capacity(plans.len());
    for plan in plans {
        let collection = plan.collection.as_str();
        let (cleared, ids) = if clear {
            let (removed, ids) = store
                .replace_collection(collection, &plan.documents)
                .await
                .with_context(|| format!("Failed to ingest into '{}'", collection))?;
            (Some(removed), ids)
        } else {
            let ids = store
                .add_batch_documents(collection, &plan.documents)
                .await
                .with_context(|| format!("Failed to ingest into '{}'", collection))?;
            (None, ids)
        };

        info!(
            collection,
            root = %plan.root.display(),
            files = plan.files,
            documents = ids.len(),
            "ingest complete"
        );
        reports.push(IngestReport {
            collection: plan.collection,
            files: plan.files,
            documents: ids.len(),
            cleared,
        });
    }
    Ok(reports)
}

/// CLI entry point for `awr ingest`.
pub async fn run_ingest(
    kb: &KnowledgeBaseConfig,
    store: &VectorStore,
    target: &str,
    path: Option<&Path>,
    clear: bool,
    dry_run: bool,
) -> Result<()> {
    let plans = plan(kb, target, path)?;

    if dry_run {
        println!("Dry run (nothing written):");
        for p in &plans {
            println!(
                "  {:<12} {:>5} files  {:>5} documents  ({})",
                p.collection.as_str(),
                p.files,
                p.documents.len(),
                p.root.display()
            );
        }
        return Ok(());
    }

    let reports = ingest(store, plans, clear).await?;
    for r in &reports {
        match r.cleared {
            Some(n) => println!(
                "{}: cleared {}, ingested {} documents from {} files",
                r.collection, n, r.documents, r.files
            ),
            None => println!(
                "{}: ingested {} documents from {} files",
                r.collection, r.documents, r.files
            ),
        }
    }
    if reports.is_empty() {
        println!("Nothing to ingest.");
    }
    Ok(())
}

/// Fields accepted by `awr add`.
#[derive(Debug, Clone, Default)]
pub struct AddArgs {
    pub text: Option<String>,
    pub file: Option<PathBuf>,
    pub id: Option<String>,
    /// Raw JSON object; individual flags below override its fields.
    pub metadata: Option<String>,
    pub source: Option<String>,
    pub doc_type: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Build the document for `awr add` from its flags.
pub fn document_from_args(args: AddArgs) -> Result<NewDocument> {
    let text = match (args.text, &args.file) {
        (Some(t), None) => t,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (Some(_), Some(_)) => bail!("--text and --file are mutually exclusive"),
        (None, None) => bail!("one of --text or --file is required"),
    };

    let base: MetadataInput = match args.metadata.as_deref() {
        Some(raw) => serde_json::from_str(raw).context("--metadata must be a JSON object")?,
        None => MetadataInput::default(),
    };
    let flags = MetadataInput {
        source: args.source,
        doc_type: args.doc_type,
        title: args.title,
        category: args.category,
        tags: (!args.tags.is_empty()).then_some(args.tags),
        ..Default::default()
    };

    Ok(NewDocument {
        id: args.id,
        text,
        metadata: merge_metadata(base, flags),
    })
}

/// CLI entry point for `awr add`.
pub async fn run_add(store: &VectorStore, collection: &str, args: AddArgs) -> Result<()> {
    let document = document_from_args(args)?;
    let id = store.add_document(collection, &document, None).await?;
    println!("Added {} to {}", id, collection);
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn kb(root: &Path) -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_markdown_title_from_heading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usb.md");
        fs::write(&path, "# USB-Köder\n\nFundsticks nie einstecken.").unwrap();

        let docs = parse_file(&path, "usb.md", CollectionName::Threats, "2024-01-01").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.title.as_deref(), Some("USB-Köder"));
        assert_eq!(docs[0].metadata.source.as_deref(), Some("usb.md"));
        assert!(docs[0].text.contains("Fundsticks"));
    }

    #[test]
    fn test_text_title_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords.txt");
        fs::write(&path, "Lange Passphrasen verwenden.").unwrap();

        let docs = parse_file(&path, "passwords.txt", CollectionName::Papers, "").unwrap();
        assert_eq!(docs[0].metadata.title.as_deref(), Some("passwords"));
    }

    #[test]
    fn test_json_array_with_nested_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threats.json");
        fs::write(
            &path,
            r#"[
                {"name": "Vishing", "description": "Anrufe von falschen IT-Mitarbeitern",
                 "metadata": {"category": "vishing", "source": "BSI"}},
                {"title": "Leer"},
                {"id": "fixed", "text": "Tailgating am Eingang", "tags": ["physical"]}
            ]"#,
        )
        .unwrap();

        let docs = parse_file(&path, "threats.json", CollectionName::Threats, "").unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].text, "Anrufe von falschen IT-Mitarbeitern");
        assert_eq!(docs[0].metadata.title.as_deref(), Some("Vishing"));
        assert_eq!(docs[0].metadata.category.as_deref(), Some("vishing"));
        assert_eq!(docs[0].metadata.source.as_deref(), Some("BSI"));
        assert_eq!(docs[1].text, "Leer");
        assert_eq!(docs[2].id.as_deref(), Some("fixed"));
        assert_eq!(docs[2].metadata.tags, Some(vec!["physical".to_string()]));
        assert_ne!(docs[0].id, docs[1].id);
    }

    #[test]
    fn test_invalid_nested_metadata_keeps_top_level_fields() {
        let item = serde_json::json!({
            "title": "Tailgating",
            "category": "physical",
            "metadata": {"source": 42, "author": "Sicherheitsteam"}
        });
        let doc = json_document(
            &item,
            &MetadataInput::default(),
            "threats.json",
            "fallback".to_string(),
        )
        .unwrap();

        assert_eq!(doc.id.as_deref(), Some("fallback"));
        assert_eq!(doc.metadata.title.as_deref(), Some("Tailgating"));
        assert_eq!(doc.metadata.category.as_deref(), Some("physical"));
        // The nested object is rejected as a whole.
        assert!(doc.metadata.author.is_none());
        assert!(doc.metadata.source.is_none());
    }

    #[test]
    fn test_json_text_joins_fields() {
        let item = serde_json::json!({"title": "A", "description": "", "content": "C"});
        assert_eq!(json_text(&item).as_deref(), Some("A C"));
        assert_eq!(json_text(&serde_json::json!({"other": 1})), None);
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id(CollectionName::Papers, "a.md", None);
        assert_eq!(a, stable_id(CollectionName::Papers, "a.md", None));
        assert_ne!(a, stable_id(CollectionName::Templates, "a.md", None));
        assert_ne!(a, stable_id(CollectionName::Papers, "a.md", Some(0)));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_plan_all_skips_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("papers")).unwrap();
        fs::write(dir.path().join("papers/a.md"), "# A\nInhalt").unwrap();
        fs::write(dir.path().join("papers/skip.pdf"), "binary").unwrap();

        let plans = plan(&kb(dir.path()), "all", None).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].collection, CollectionName::Papers);
        assert_eq!(plans[0].files, 1);
        assert_eq!(plans[0].documents.len(), 1);
    }

    #[test]
    fn test_plan_rejects_unknown_collection() {
        let dir = tempfile::tempdir().unwrap();
        assert!(plan(&kb(dir.path()), "nonexistent", None).is_err());
    }

    #[test]
    fn test_add_flags_override_metadata_json() {
        let doc = document_from_args(AddArgs {
            text: Some("Phishing-Mail erkennen".into()),
            id: Some("doc1".into()),
            metadata: Some(r#"{"source": "intranet", "category": "phishing"}"#.into()),
            source: Some("BSI".into()),
            tags: vec!["email".into()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(doc.id.as_deref(), Some("doc1"));
        assert_eq!(doc.metadata.source.as_deref(), Some("BSI"));
        assert_eq!(doc.metadata.category.as_deref(), Some("phishing"));
        assert_eq!(doc.metadata.tags, Some(vec!["email".to_string()]));
    }

    #[test]
    fn test_add_requires_exactly_one_text_source() {
        assert!(document_from_args(AddArgs::default()).is_err());
        let both = AddArgs {
            text: Some("x".into()),
            file: Some(PathBuf::from("x.txt")),
            ..Default::default()
        };
        assert!(document_from_args(both).is_err());
    }

    #[test]
    fn test_plan_respects_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("keep.txt"), "behalten").unwrap();
        fs::write(dir.path().join("drafts/drop.txt"), "verwerfen").unwrap();

        let mut config = kb(dir.path());
        config.exclude_globs = vec!["drafts/**".to_string()];
        let plans = plan(&config, "papers", Some(dir.path())).unwrap();
        assert_eq!(plans[0].files, 1);
    }
}
