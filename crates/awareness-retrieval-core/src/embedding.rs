//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the deterministic [`HashEmbedder`], and pure helpers for
//! vector serialization and distance computation.
//!
//! Network and model-backed providers (Ollama, OpenAI, fastembed) live in
//! the `awareness-retrieval` app crate.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Trait for embedding providers.
///
/// Document and query embeddings may use different prompt framing but must
/// land in the same vector space. Providers fail with
/// [`EmbeddingError::EmptyInput`] for blank text and never substitute a zero
/// vector.
///
/// The hash embedder is bit-for-bit deterministic. Model-backed providers are
/// deterministic for a fixed model version up to floating-point differences
/// across hardware.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a document for ingestion.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several documents, returning vectors in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_document(text).await?);
        }
        Ok(out)
    }
}

/// Reject blank input before it reaches a model.
pub fn ensure_non_empty(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }
    Ok(())
}

/// Check a produced vector against the provider's declared dimensionality.
pub fn check_dims(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

// ============ Hash Embedder ============

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Feature-hashing embedder using FNV-1a over tokens and bigrams.
///
/// Needs no model, so it works offline and in tests. Texts sharing words end
/// up close to each other; unrelated texts end up near-orthogonal.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Embed text synchronously. Used by both trait paths.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        ensure_non_empty(text)?;
        if self.dims == 0 {
            return Err(EmbeddingError::unavailable(
                "hash",
                "embedding dimension must be greater than 0",
            ));
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut embedding = vec![0.0f32; self.dims];
        for token in &tokens {
            accumulate(&mut embedding, token, 1.0);
        }
        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            accumulate(&mut embedding, &bigram, 0.5);
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-fnv1a"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn accumulate(embedding: &mut [f32], feature: &str, weight: f32) {
    let hash = fnv1a(feature.as_bytes());
    let idx = (hash % embedding.len() as u64) as usize;
    // Top bit picks the sign so collisions partially cancel.
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    embedding[idx] += sign * weight;
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use awareness_retrieval_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean distance between two vectors.
///
/// Returns `None` when the lengths differ or either vector is empty, since
/// no meaningful distance exists.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    let dist = sum.sqrt();
    dist.is_finite().then_some(dist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_distance_identical_is_zero() {
        let v = vec![0.3, 0.4, 0.5];
        assert_eq!(euclidean_distance(&v, &v), Some(0.0));
    }

    #[test]
    fn test_distance_known_value() {
        let d = euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_mismatched_lengths() {
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0]), None);
        assert_eq!(euclidean_distance(&[], &[]), None);
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let e = HashEmbedder::new(64);
        let a = e.embed("Phishing erkennen").unwrap();
        let b = e.embed("Phishing erkennen").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_embedder_is_normalized() {
        let v = HashEmbedder::new(128).embed("social engineering via telephone").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_case_insensitive() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed("PHISHING Mail").unwrap(), e.embed("phishing mail").unwrap());
    }

    #[test]
    fn test_hash_embedder_rejects_empty() {
        let e = HashEmbedder::new(64);
        assert!(matches!(e.embed(""), Err(EmbeddingError::EmptyInput)));
        assert!(matches!(e.embed("   \n"), Err(EmbeddingError::EmptyInput)));
        assert!(matches!(e.embed("?!"), Err(EmbeddingError::EmptyInput)));
    }

    #[test]
    fn test_hash_embedder_shared_words_are_closer() {
        let e = HashEmbedder::new(256);
        let q = e.embed("Wie erkenne ich Phishing?").unwrap();
        let near = e.embed("Wie erkenne ich Phishing-Mails").unwrap();
        let far = e.embed("Brandschutz im Serverraum").unwrap();
        let d_near = euclidean_distance(&q, &near).unwrap();
        let d_far = euclidean_distance(&q, &far).unwrap();
        assert!(d_near < d_far, "near={} far={}", d_near, d_far);
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(&[0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dims(&[0.0; 3], 4),
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let e = HashEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let out = e.embed_documents(&texts).await.unwrap();
        assert_eq!(out[0], e.embed("alpha").unwrap());
        assert_eq!(out[1], e.embed("beta").unwrap());
    }

    #[tokio::test]
    async fn test_default_batch_fails_on_blank_member() {
        let e = HashEmbedder::new(32);
        let texts = vec!["alpha".to_string(), " ".to_string()];
        assert!(e.embed_documents(&texts).await.is_err());
    }
}
