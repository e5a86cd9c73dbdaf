//! Storage abstraction for the retrieval store.
//!
//! The [`VectorBackend`] trait defines every storage operation the
//! collection store and search engine need, enabling pluggable backends
//! (SQLite in the app crate, in-memory here).
//!
//! Implementations must be `Send + Sync` to be shared across concurrent
//! callers, and must apply each [`upsert`](VectorBackend::upsert) batch
//! and each [`clear`](VectorBackend::clear) atomically with respect to
//! concurrent readers.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::filter::MetadataFilter;
use crate::models::CollectionName;

/// A record as written to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    /// Serialized [`DocumentMetadata`](crate::models::DocumentMetadata).
    pub metadata_json: String,
    /// Raw document text. `None` for records written by older loaders that
    /// kept the text inside the metadata blob.
    pub content: Option<String>,
}

/// A record fetched by id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub content: Option<String>,
    pub metadata_json: String,
}

/// A nearest-neighbour candidate returned from [`VectorBackend::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCandidate {
    pub id: String,
    pub content: Option<String>,
    pub metadata_json: String,
    /// Euclidean distance to the query vector, if computable.
    pub distance: Option<f32>,
}

/// Abstract vector storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](VectorBackend::ensure_collection) | Create a collection if absent |
/// | [`upsert`](VectorBackend::upsert) | Insert or replace a batch of records |
/// | [`clear`](VectorBackend::clear) | Remove all records, keep the collection |
/// | [`replace`](VectorBackend::replace) | Clear, then upsert a batch |
/// | [`get`](VectorBackend::get) | Fetch one record by id |
/// | [`query`](VectorBackend::query) | Nearest neighbours, optionally filtered |
/// | [`count`](VectorBackend::count) | Number of records in a collection |
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create the collection with its description if it does not exist.
    async fn ensure_collection(&self, collection: CollectionName, description: &str)
        -> Result<()>;

    /// Insert or replace records by id, as one batch.
    async fn upsert(&self, collection: CollectionName, records: &[VectorRecord]) -> Result<()>;

    /// Delete every record in the collection. Returns the number removed.
    async fn clear(&self, collection: CollectionName) -> Result<u64>;

    /// Remove every record and insert `records` in their place. Returns the
    /// number removed. Backends with transactions override this so a failed
    /// insert keeps the old contents.
    async fn replace(&self, collection: CollectionName, records: &[VectorRecord]) -> Result<u64> {
        let removed = self.clear(collection).await?;
        self.upsert(collection, records).await?;
        Ok(removed)
    }

    /// Fetch a record by id. `Ok(None)` when absent.
    async fn get(&self, collection: CollectionName, id: &str) -> Result<Option<StoredDocument>>;

    /// Return up to `limit` records ordered by ascending distance.
    ///
    /// Records with no computable distance sort after all others. Ties keep
    /// the backend's native order.
    async fn query(
        &self,
        collection: CollectionName,
        query_vec: &[f32],
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<QueryCandidate>>;

    /// Number of records in the collection.
    async fn count(&self, collection: CollectionName) -> Result<u64>;

    /// Release resources at shutdown.
    async fn close(&self) {}
}

/// Order candidates by ascending distance, `None` last, keeping input order
/// for ties, then keep the first `limit`.
pub fn rank_candidates(mut candidates: Vec<QueryCandidate>, limit: usize) -> Vec<QueryCandidate> {
    candidates.sort_by(|a, b| match (a.distance, b.distance) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    candidates.truncate(limit);
    candidates
}
