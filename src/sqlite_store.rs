//! SQLite-backed [`VectorBackend`] implementation.
//!
//! Records live in a single `records` table keyed by `(collection, id)`.
//! Vectors are stored as little-endian f32 BLOBs and compared by brute-force
//! Euclidean distance in process; the metadata filter is applied to each
//! row before ranking. Rows are scanned in `rowid` order, which makes
//! insertion order the tie-break for equal distances.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use awareness_retrieval_core::embedding::{blob_to_vec, euclidean_distance, vec_to_blob};
use awareness_retrieval_core::filter::MetadataFilter;
use awareness_retrieval_core::models::CollectionName;
use awareness_retrieval_core::store::{
    rank_candidates, QueryCandidate, StoredDocument, VectorBackend, VectorRecord,
};

use crate::{db, migrate};

async fn write_records(
    tx: &mut Transaction<'_, Sqlite>,
    collection: CollectionName,
    records: &[VectorRecord],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, vector, dims, metadata_json, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                vector = excluded.vector,
                dims = excluded.dims,
                metadata_json = excluded.metadata_json,
                content = excluded.content,
                created_at = excluded.created_at
            "#,
        )
        .bind(collection.as_str())
        .bind(&record.id)
        .bind(vec_to_blob(&record.vector))
        .bind(record.vector.len() as i64)
        .bind(&record.metadata_json)
        .bind(&record.content)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// SQLite implementation of the [`VectorBackend`] trait.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to (or create) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    async fn ensure_collection(&self, collection: CollectionName, description: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO collections (name, description, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(collection.as_str())
        .bind(description)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: CollectionName, records: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_records(&mut tx, collection, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, collection: CollectionName) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace(&self, collection: CollectionName, records: &[VectorRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        write_records(&mut tx, collection, records).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn get(&self, collection: CollectionName, id: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT id, content, metadata_json FROM records WHERE collection = ? AND id = ?",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredDocument {
            id: r.get("id"),
            content: r.get("content"),
            metadata_json: r.get("metadata_json"),
        }))
    }

    async fn query(
        &self,
        collection: CollectionName,
        query_vec: &[f32],
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<QueryCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vector, metadata_json, content
            FROM records
            WHERE collection = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<QueryCandidate> = rows
            .iter()
            .filter_map(|row| {
                let metadata_json: String = row.get("metadata_json");
                if let Some(f) = filter {
                    if !f.matches_json(&metadata_json) {
                        return None;
                    }
                }
                let blob: Vec<u8> = row.get("vector");
                let vector = blob_to_vec(&blob);
                Some(QueryCandidate {
                    id: row.get("id"),
                    content: row.get("content"),
                    metadata_json,
                    distance: euclidean_distance(query_vec, &vector),
                })
            })
            .collect();

        Ok(rank_candidates(candidates, limit))
    }

    async fn count(&self, collection: CollectionName) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
