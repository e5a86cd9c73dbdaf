//! The retrieval store service.
//!
//! [`VectorStore`] ties an [`EmbeddingProvider`] to a [`VectorBackend`] and
//! exposes the ingestion operations (`add_document`, `add_batch_documents`,
//! `clear_collection`, `get_document_by_id`) and the search operations
//! (`search`, `search_all`).
//!
//! # Error policy
//!
//! Ingestion fails loud: every error reaches the caller. Search fails soft:
//! embedding failures, backend failures, and timeouts are logged and turned
//! into an empty result list. Unknown collections and a zero limit are
//! client errors and are returned from both paths.
//!
//! # Concurrency
//!
//! The store is constructed once and shared via `Arc`. Writes to a
//! collection are serialized by a per-collection mutex; reads take no lock.
//! Every embedding and backend call runs under a timeout.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use awareness_retrieval_core::embedding::{check_dims, EmbeddingProvider};
use awareness_retrieval_core::error::{EmbeddingError, Result, RetrievalError};
use awareness_retrieval_core::filter::MetadataFilter;
use awareness_retrieval_core::models::{
    generate_id, CollectionName, DocumentMetadata, DocumentRecord, NewDocument,
};
use awareness_retrieval_core::search::{hits_from_candidates, resolve_content, SearchHit};
use awareness_retrieval_core::store::{VectorBackend, VectorRecord};

use crate::config::Config;
use crate::logging::truncate_for_log;
use crate::sqlite_store::SqliteBackend;

const LOG_QUERY_CHARS: usize = 50;

/// Tuning knobs for a [`VectorStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Result count for `search` when the caller passes `None`.
    pub default_limit: usize,
    /// Deadline for each backend call.
    pub store_timeout: Duration,
    /// Deadline for each embedding call (one query or one document batch).
    pub embed_timeout: Duration,
    /// Documents per `embed_documents` call during batch ingestion.
    pub embed_batch_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_limit: awareness_retrieval_core::search::DEFAULT_LIMIT,
            store_timeout: Duration::from_secs(10),
            embed_timeout: Duration::from_secs(30),
            embed_batch_size: 32,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_limit: config.retrieval.default_limit,
            store_timeout: config.store.timeout(),
            embed_timeout: config.embedding.timeout(),
            embed_batch_size: config.embedding.batch_size.max(1),
        }
    }
}

/// Record count for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: CollectionName,
    pub description: &'static str,
    pub count: u64,
}

/// Multi-collection vector store.
pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    options: StoreOptions,
    /// Indexed by `CollectionName as usize`.
    write_locks: [Mutex<()>; 3],
}

impl VectorStore {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: StoreOptions,
    ) -> Self {
        Self {
            backend,
            embedder,
            options,
            write_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        }
    }

    /// Open the SQLite store at `config.store.path` and create the three
    /// collections. Any failure is a [`RetrievalError::StorageInit`].
    pub async fn open(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = config.store.path.display().to_string();
        let storage_init = |reason: String| RetrievalError::StorageInit {
            path: path.clone(),
            reason,
        };

        let backend = tokio::time::timeout(
            config.store.timeout(),
            SqliteBackend::open(&config.store.path),
        )
        .await
        .map_err(|_| storage_init(format!("timed out after {:?}", config.store.timeout())))?
        .map_err(|e| storage_init(format!("{:#}", e)))?;

        let store = Self::new(
            Arc::new(backend),
            embedder,
            StoreOptions::from_config(config),
        );
        store
            .initialize()
            .await
            .map_err(|e| storage_init(e.to_string()))?;

        info!(path = %path, model = store.embedder.model_name(), "vector store opened");
        Ok(store)
    }

    /// Get-or-create the three fixed collections. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        for collection in CollectionName::ALL {
            self.backend_call(
                collection,
                "ensure_collection",
                self.backend
                    .ensure_collection(collection, collection.description()),
            )
            .await?;
        }
        Ok(())
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed and store one document. Returns the effective id: `id` if
    /// given, else the document's own id, else a fresh UUID.
    pub async fn add_document(
        &self,
        collection: &str,
        document: &NewDocument,
        id: Option<&str>,
    ) -> Result<String> {
        let collection: CollectionName = collection.parse()?;
        let id = id
            .map(str::to_string)
            .or_else(|| document.id.clone())
            .unwrap_or_else(generate_id);

        let result = self.add_document_inner(collection, &id, document).await;

        match result {
            Ok(()) => {
                debug!(collection = %collection, id = %id, "document added");
                Ok(id)
            }
            Err(e) => {
                warn!(collection = %collection, operation = "add_document", error = %e, "ingestion failed");
                Err(e)
            }
        }
    }

    async fn add_document_inner(
        &self,
        collection: CollectionName,
        id: &str,
        document: &NewDocument,
    ) -> Result<()> {
        let vector = self
            .with_timeout(
                "embed_document",
                self.options.embed_timeout,
                self.embedder.embed_document(&document.text),
            )
            .await??;
        check_dims(&vector, self.embedder.dims())?;

        let record = build_record(id.to_string(), document, vector);

        let _guard = self.write_lock(collection).lock().await;
        self.backend_call(
            collection,
            "add_document",
            self.backend.upsert(collection, std::slice::from_ref(&record)),
        )
        .await
    }

    /// Embed and store many documents as one backend batch. Ids are returned
    /// in input order.
    pub async fn add_batch_documents(
        &self,
        collection: &str,
        documents: &[NewDocument],
    ) -> Result<Vec<String>> {
        let collection: CollectionName = collection.parse()?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let result = self.add_batch_inner(collection, documents).await;

        match &result {
            Ok(ids) => info!(
                collection = %collection,
                count = ids.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch added"
            ),
            Err(e) => warn!(
                collection = %collection,
                operation = "add_batch_documents",
                count = documents.len(),
                error = %e,
                "ingestion failed"
            ),
        }
        result
    }

    async fn add_batch_inner(
        &self,
        collection: CollectionName,
        documents: &[NewDocument],
    ) -> Result<Vec<String>> {
        let records = self.embed_records(documents).await?;
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let _guard = self.write_lock(collection).lock().await;
        self.backend_call(
            collection,
            "add_batch_documents",
            self.backend.upsert(collection, &records),
        )
        .await?;
        Ok(ids)
    }

    /// Replace the collection's contents with `documents`.
    ///
    /// Every document is embedded before anything is removed, so an
    /// embedding failure leaves the collection as it was. Returns the number
    /// of records removed and the new ids in input order.
    pub async fn replace_collection(
        &self,
        collection: &str,
        documents: &[NewDocument],
    ) -> Result<(u64, Vec<String>)> {
        let collection: CollectionName = collection.parse()?;
        let result = self.replace_inner(collection, documents).await;

        match &result {
            Ok((removed, ids)) => info!(
                collection = %collection,
                removed,
                count = ids.len(),
                "collection replaced"
            ),
            Err(e) => warn!(
                collection = %collection,
                operation = "replace_collection",
                count = documents.len(),
                error = %e,
                "replace failed, existing records kept"
            ),
        }
        result
    }

    async fn replace_inner(
        &self,
        collection: CollectionName,
        documents: &[NewDocument],
    ) -> Result<(u64, Vec<String>)> {
        let records = self.embed_records(documents).await?;
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let _guard = self.write_lock(collection).lock().await;
        let removed = self
            .backend_call(
                collection,
                "replace_collection",
                self.backend.replace(collection, &records),
            )
            .await?;
        Ok((removed, ids))
    }

    async fn embed_records(&self, documents: &[NewDocument]) -> Result<Vec<VectorRecord>> {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.options.embed_batch_size.max(1)) {
            let embedded = self
                .with_timeout(
                    "embed_documents",
                    self.options.embed_timeout,
                    self.embedder.embed_documents(batch),
                )
                .await??;
            vectors.extend(embedded);
        }
        if vectors.len() != documents.len() {
            return Err(EmbeddingError::unavailable(
                self.embedder.model_name(),
                format!("expected {} embeddings, got {}", documents.len(), vectors.len()),
            )
            .into());
        }

        let mut records = Vec::with_capacity(documents.len());
        for (document, vector) in documents.iter().zip(vectors) {
            check_dims(&vector, self.embedder.dims())?;
            let id = document.id.clone().unwrap_or_else(generate_id);
            records.push(build_record(id, document, vector));
        }
        Ok(records)
    }

    /// Remove every record from the collection. Returns the number removed.
    pub async fn clear_collection(&self, collection: &str) -> Result<u64> {
        let collection: CollectionName = collection.parse()?;
        let _guard = self.write_lock(collection).lock().await;
        let removed = self
            .backend_call(collection, "clear_collection", self.backend.clear(collection))
            .await
            .inspect_err(|e| {
                warn!(collection = %collection, operation = "clear_collection", error = %e, "clear failed")
            })?;
        info!(collection = %collection, count = removed, "collection cleared");
        Ok(removed)
    }

    /// Fetch a stored document. `Ok(None)` when the id is absent.
    pub async fn get_document_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<DocumentRecord>> {
        let collection: CollectionName = collection.parse()?;
        let stored = self
            .backend_call(collection, "get_document_by_id", self.backend.get(collection, id))
            .await
            .inspect_err(|e| {
                warn!(collection = %collection, operation = "get_document_by_id", id, error = %e, "fetch failed")
            })?;

        Ok(stored.map(|doc| DocumentRecord {
            content: resolve_content(doc.content.as_deref(), &doc.metadata_json),
            metadata: DocumentMetadata::from_stored(&doc.metadata_json),
            id: doc.id,
        }))
    }

    /// Nearest documents to `query` in one collection.
    ///
    /// `limit` defaults to [`StoreOptions::default_limit`]; `Some(0)` is
    /// rejected. Embedding and backend failures yield an empty list.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        filter: Option<&MetadataFilter>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let collection: CollectionName = collection.parse()?;
        let limit = match limit {
            Some(0) => return Err(RetrievalError::InvalidLimit(0)),
            Some(k) => k,
            None => self.options.default_limit,
        };

        let started = Instant::now();
        match self.search_inner(collection, query, filter, limit).await {
            Ok(hits) => {
                debug!(
                    collection = %collection,
                    query = %truncate_for_log(query, LOG_QUERY_CHARS),
                    filter = %filter.map(|f| f.to_string()).unwrap_or_default(),
                    count = hits.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "search complete"
                );
                Ok(hits)
            }
            Err(e) => {
                warn!(
                    collection = %collection,
                    operation = "search",
                    query = %truncate_for_log(query, LOG_QUERY_CHARS),
                    error = %e,
                    "search failed, returning no results"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn search_inner(
        &self,
        collection: CollectionName,
        query: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vec = self
            .with_timeout(
                "embed_query",
                self.options.embed_timeout,
                self.embedder.embed_query(query),
            )
            .await??;

        let filter = filter.filter(|f| !f.is_empty());
        let candidates = self
            .backend_call(
                collection,
                "search",
                self.backend.query(collection, &query_vec, filter, limit),
            )
            .await?;

        Ok(hits_from_candidates(candidates))
    }

    /// Run `search` against all three collections concurrently.
    ///
    /// Every collection key is present. A failing collection maps to an
    /// empty list without affecting the others.
    pub async fn search_all(
        &self,
        query: &str,
        limit_per_collection: usize,
    ) -> BTreeMap<CollectionName, Vec<SearchHit>> {
        let (papers, templates, threats) = tokio::join!(
            self.search_or_empty(CollectionName::Papers, query, limit_per_collection),
            self.search_or_empty(CollectionName::Templates, query, limit_per_collection),
            self.search_or_empty(CollectionName::Threats, query, limit_per_collection),
        );

        BTreeMap::from([
            (CollectionName::Papers, papers),
            (CollectionName::Templates, templates),
            (CollectionName::Threats, threats),
        ])
    }

    async fn search_or_empty(
        &self,
        collection: CollectionName,
        query: &str,
        limit: usize,
    ) -> Vec<SearchHit> {
        match self
            .search(collection.as_str(), query, None, Some(limit))
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(
                    collection = %collection,
                    operation = "search_all",
                    query = %truncate_for_log(query, LOG_QUERY_CHARS),
                    error = %e,
                    "collection skipped"
                );
                Vec::new()
            }
        }
    }

    /// Record counts for every collection.
    pub async fn collection_stats(&self) -> Result<Vec<CollectionStats>> {
        let mut stats = Vec::with_capacity(CollectionName::ALL.len());
        for collection in CollectionName::ALL {
            let count = self
                .backend_call(collection, "count", self.backend.count(collection))
                .await?;
            stats.push(CollectionStats {
                name: collection,
                description: collection.description(),
                count,
            });
        }
        Ok(stats)
    }

    /// Flush and close the backend.
    pub async fn close(&self) {
        self.backend.close().await;
    }

    fn write_lock(&self, collection: CollectionName) -> &Mutex<()> {
        &self.write_locks[collection as usize]
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        limit: Duration,
        fut: impl Future<Output = T>,
    ) -> Result<T> {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RetrievalError::Timeout {
                operation: operation.to_string(),
                timeout: limit,
            })
    }

    async fn backend_call<T>(
        &self,
        collection: CollectionName,
        operation: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        self.with_timeout(operation, self.options.store_timeout, fut)
            .await?
            .map_err(|source| RetrievalError::BackendQuery {
                collection,
                operation,
                source,
            })
    }
}

fn build_record(id: String, document: &NewDocument, vector: Vec<f32>) -> VectorRecord {
    let metadata = DocumentMetadata::normalize(&document.metadata);
    VectorRecord {
        id,
        vector,
        metadata_json: metadata.to_json(),
        content: Some(document.text.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awareness_retrieval_core::embedding::HashEmbedder;
    use awareness_retrieval_core::store::memory::InMemoryBackend;

    async fn store() -> VectorStore {
        let store = VectorStore::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(HashEmbedder::new(64)),
            StoreOptions::default(),
        );
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_explicit_id_wins_over_document_id() {
        let s = store().await;
        let doc = NewDocument::new("USB-Sticks auf dem Parkplatz").with_id("doc-id");
        let id = s.add_document("threats", &doc, Some("arg-id")).await.unwrap();
        assert_eq!(id, "arg-id");
        assert!(s.get_document_by_id("threats", "doc-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_id_used_when_no_argument() {
        let s = store().await;
        let doc = NewDocument::new("CEO-Fraud per E-Mail").with_id("ceo");
        assert_eq!(s.add_document("threats", &doc, None).await.unwrap(), "ceo");
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let s = store().await;
        let err = s.search("papers", "x", None, Some(0)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidLimit(0)));
    }

    #[tokio::test]
    async fn test_default_limit_applies() {
        let s = store().await;
        let docs: Vec<NewDocument> = (0..8)
            .map(|i| NewDocument::new(format!("phishing awareness note {}", i)))
            .collect();
        s.add_batch_documents("papers", &docs).await.unwrap();
        let hits = s.search("papers", "phishing", None, None).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let s = store().await;
        assert!(s.add_batch_documents("papers", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_yields_no_results() {
        let s = store().await;
        s.add_document("papers", &NewDocument::new("content"), None)
            .await
            .unwrap();
        assert!(s.search("papers", "   ", None, Some(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_counts_each_collection() {
        let s = store().await;
        s.add_document("templates", &NewDocument::new("Vorlage A"), None)
            .await
            .unwrap();
        let stats = s.collection_stats().await.unwrap();
        assert_eq!(stats.len(), 3);
        let templates = stats
            .iter()
            .find(|st| st.name == CollectionName::Templates)
            .unwrap();
        assert_eq!(templates.count, 1);
    }
}
