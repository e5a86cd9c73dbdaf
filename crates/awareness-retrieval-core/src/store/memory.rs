//! In-memory [`VectorBackend`] implementation for tests and embedding.
//!
//! Uses a `HashMap` of collections behind `std::sync::RwLock`. Vector search
//! is brute-force Euclidean distance over every record in the collection.
//! Records keep insertion order, which is the tie-break order for equal
//! distances.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::euclidean_distance;
use crate::filter::MetadataFilter;
use crate::models::CollectionName;

use super::{rank_candidates, QueryCandidate, StoredDocument, VectorBackend, VectorRecord};

#[derive(Default)]
struct StoredCollection {
    records: Vec<VectorRecord>,
    /// Position of each id in `records`.
    index: HashMap<String, usize>,
}

impl StoredCollection {
    fn upsert(&mut self, record: &VectorRecord) {
        match self.index.get(&record.id) {
            Some(&pos) => self.records[pos] = record.clone(),
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record.clone());
            }
        }
    }

    fn clear(&mut self) -> u64 {
        let removed = self.records.len() as u64;
        self.records.clear();
        self.index.clear();
        removed
    }

    fn get(&self, id: &str) -> Option<&VectorRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }
}

/// In-memory store for testing.
pub struct InMemoryBackend {
    collections: RwLock<HashMap<CollectionName, StoredCollection>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_initialized(collection: CollectionName) -> anyhow::Error {
    anyhow!("collection '{}' has not been created", collection)
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn ensure_collection(
        &self,
        collection: CollectionName,
        _description: &str,
    ) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        guard.entry(collection).or_default();
        Ok(())
    }

    async fn upsert(&self, collection: CollectionName, records: &[VectorRecord]) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let stored = guard
            .get_mut(&collection)
            .ok_or_else(|| not_initialized(collection))?;
        for record in records {
            stored.upsert(record);
        }
        Ok(())
    }

    async fn clear(&self, collection: CollectionName) -> Result<u64> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let stored = guard
            .get_mut(&collection)
            .ok_or_else(|| not_initialized(collection))?;
        Ok(stored.clear())
    }

    async fn replace(&self, collection: CollectionName, records: &[VectorRecord]) -> Result<u64> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let stored = guard
            .get_mut(&collection)
            .ok_or_else(|| not_initialized(collection))?;
        let removed = stored.clear();
        for record in records {
            stored.upsert(record);
        }
        Ok(removed)
    }

    async fn get(&self, collection: CollectionName, id: &str) -> Result<Option<StoredDocument>> {
        let guard = self.collections.read().map_err(poisoned)?;
        let stored = guard
            .get(&collection)
            .ok_or_else(|| not_initialized(collection))?;
        Ok(stored.get(id).map(|r| StoredDocument {
            id: r.id.clone(),
            content: r.content.clone(),
            metadata_json: r.metadata_json.clone(),
        }))
    }

    async fn query(
        &self,
        collection: CollectionName,
        query_vec: &[f32],
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<QueryCandidate>> {
        let guard = self.collections.read().map_err(poisoned)?;
        let stored = guard
            .get(&collection)
            .ok_or_else(|| not_initialized(collection))?;

        let candidates: Vec<QueryCandidate> = stored
            .records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches_json(&r.metadata_json)))
            .map(|r| QueryCandidate {
                id: r.id.clone(),
                content: r.content.clone(),
                metadata_json: r.metadata_json.clone(),
                distance: euclidean_distance(query_vec, &r.vector),
            })
            .collect();

        Ok(rank_candidates(candidates, limit))
    }

    async fn count(&self, collection: CollectionName) -> Result<u64> {
        let guard = self.collections.read().map_err(poisoned)?;
        let stored = guard
            .get(&collection)
            .ok_or_else(|| not_initialized(collection))?;
        Ok(stored.records.len() as u64)
    }
}
