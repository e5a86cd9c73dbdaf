//! SQLite backend tests. Each test gets its own database in a temp dir.

use std::sync::Arc;

use tempfile::TempDir;

use awareness_retrieval::config::Config;
use awareness_retrieval::vector_store::VectorStore;
use awareness_retrieval_core::embedding::HashEmbedder;
use awareness_retrieval_core::error::RetrievalError;
use awareness_retrieval_core::filter::MetadataFilter;
use awareness_retrieval_core::models::{CollectionName, MetadataInput, NewDocument};

fn config_in(tmp: &TempDir) -> Config {
    let mut cfg = Config::minimal();
    cfg.store.path = tmp.path().join("data").join("vectors.sqlite");
    cfg
}

async fn open(cfg: &Config) -> VectorStore {
    VectorStore::open(cfg, Arc::new(HashEmbedder::new(64)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_open_creates_database_and_collections() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let store = open(&cfg).await;

    assert!(cfg.store.path.exists());
    let stats = store.collection_stats().await.unwrap();
    let names: Vec<CollectionName> = stats.iter().map(|s| s.name).collect();
    assert_eq!(names, CollectionName::ALL.to_vec());
    assert!(stats.iter().all(|s| s.count == 0));
    store.close().await;
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);

    let store = open(&cfg).await;
    let doc = NewDocument::new("Phishing erkennen").with_metadata(MetadataInput {
        category: Some("phishing".into()),
        title: Some("Phishing".into()),
        ..Default::default()
    });
    store.add_document("threats", &doc, Some("t1")).await.unwrap();
    store.close().await;

    // Opening again must not wipe existing records.
    let store = open(&cfg).await;
    let stored = store.get_document_by_id("threats", "t1").await.unwrap().unwrap();
    assert_eq!(stored.content, "Phishing erkennen");
    assert_eq!(stored.metadata.doc_type, "document");
    assert_eq!(stored.metadata.category.as_deref(), Some("phishing"));
    store.close().await;
}

#[tokio::test]
async fn test_identical_text_scores_one() {
    let tmp = TempDir::new().unwrap();
    let store = open(&config_in(&tmp)).await;

    store
        .add_batch_documents(
            "papers",
            &[
                NewDocument::new("Passwortrichtlinien im Krankenhaus").with_id("p1"),
                NewDocument::new("Sichere Nutzung von USB-Sticks").with_id("p2"),
            ],
        )
        .await
        .unwrap();

    let hits = store
        .search("papers", "Passwortrichtlinien im Krankenhaus", None, Some(2))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "p1");
    assert!((hits[0].similarity.unwrap() - 1.0).abs() < 1e-6);
    assert!(hits[1].similarity.unwrap() < hits[0].similarity.unwrap());
    store.close().await;
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let store = open(&config_in(&tmp)).await;

    store
        .add_document("papers", &NewDocument::new("Social Engineering"), Some("same"))
        .await
        .unwrap();
    store
        .add_document("templates", &NewDocument::new("Vorlage"), Some("same"))
        .await
        .unwrap();

    assert_eq!(store.clear_collection("papers").await.unwrap(), 1);
    assert!(store.get_document_by_id("papers", "same").await.unwrap().is_none());
    let kept = store.get_document_by_id("templates", "same").await.unwrap().unwrap();
    assert_eq!(kept.content, "Vorlage");
    store.close().await;
}

#[tokio::test]
async fn test_filter_on_tags() {
    let tmp = TempDir::new().unwrap();
    let store = open(&config_in(&tmp)).await;

    let tagged = |text: &str, tags: &[&str]| {
        NewDocument::new(text).with_metadata(MetadataInput {
            tags: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        })
    };
    store
        .add_batch_documents(
            "threats",
            &[
                tagged("Mail mit Anhang", &["email", "malware"]),
                tagged("Anruf vom Chef", &["phone"]),
            ],
        )
        .await
        .unwrap();

    let filter = MetadataFilter::parse("tags=email").unwrap();
    let hits = store
        .search("threats", "Anhang", Some(&filter), None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "Mail mit Anhang");
    store.close().await;
}

#[tokio::test]
async fn test_unreachable_path_is_storage_init_error() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let mut cfg = Config::minimal();
    cfg.store.path = blocker.join("vectors.sqlite");

    let err = VectorStore::open(&cfg, Arc::new(HashEmbedder::new(64)))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RetrievalError::StorageInit { .. }));
}

#[tokio::test]
async fn test_replace_collection_in_one_transaction() {
    let tmp = TempDir::new().unwrap();
    let store = open(&config_in(&tmp)).await;

    store
        .add_batch_documents(
            "templates",
            &[
                NewDocument::new("Alte Vorlage 1").with_id("old1"),
                NewDocument::new("Alte Vorlage 2").with_id("old2"),
            ],
        )
        .await
        .unwrap();
    store
        .add_document("papers", &NewDocument::new("Studie"), Some("p1"))
        .await
        .unwrap();

    let (removed, ids) = store
        .replace_collection("templates", &[NewDocument::new("Neue Vorlage").with_id("new")])
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(ids, vec!["new".to_string()]);

    let stats = store.collection_stats().await.unwrap();
    let count = |name: CollectionName| stats.iter().find(|s| s.name == name).unwrap().count;
    assert_eq!(count(CollectionName::Templates), 1);
    assert_eq!(count(CollectionName::Papers), 1);
    store.close().await;
}
