//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] metadata trait, the deterministic
//! [`mock_embedding`] used whenever a real provider is unavailable, and pure
//! helpers for similarity and BLOB serialization.
//!
//! Concrete HTTP providers live in the `rag-assistant` app crate.

use thiserror::Error;

/// Default embedding dimensionality (matches `jina-embeddings-v2-base-en`).
pub const DEFAULT_DIMS: usize = 768;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"jina-embeddings-v2-base-en"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
}

/// Errors from vector arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VectorError {
    #[error("vectors must have the same length ({left} != {right})")]
    LengthMismatch { left: usize, right: usize },
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` when either vector has zero
/// magnitude (including two empty vectors).
///
/// # Errors
///
/// [`VectorError::LengthMismatch`] when the vectors differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// 32-bit rolling string hash (`h = h * 31 + c`) over UTF-16 code units,
/// wrapping on overflow.
pub fn string_hash(text: &str) -> i32 {
    text.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Deterministic stand-in embedding seeded by [`string_hash`].
///
/// Component `i` is `sin(h + i) * cos(h - i)`; the vector is scaled to
/// unit length. Identical text always yields an identical vector.
pub fn mock_embedding(text: &str, dims: usize) -> Vec<f32> {
    let hash = f64::from(string_hash(text));
    let raw: Vec<f64> = (0..dims)
        .map(|i| {
            let i = i as f64;
            (hash + i).sin() * (hash - i).cos()
        })
        .collect();

    let magnitude = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
    if magnitude < f64::EPSILON {
        return raw.into_iter().map(|v| v as f32).collect();
    }
    raw.into_iter().map(|v| (v / magnitude) as f32).collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use rag_assistant_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magnitude(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_string_hash_known_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        // wraps like a 32-bit integer
        assert_eq!(string_hash("hello world, this overflows"), {
            let mut h: i32 = 0;
            for u in "hello world, this overflows".encode_utf16() {
                h = h.wrapping_mul(31).wrapping_add(u as i32);
            }
            h
        });
    }

    #[test]
    fn test_mock_embedding_deterministic() {
        let a = mock_embedding("the quick brown fox", DEFAULT_DIMS);
        let b = mock_embedding("the quick brown fox", DEFAULT_DIMS);
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMS);
    }

    #[test]
    fn test_mock_embedding_unit_length() {
        for text in ["", "a", "Retrieval augmented generation", "日本語のテキスト"] {
            let v = mock_embedding(text, 64);
            assert!((magnitude(&v) - 1.0).abs() < 1e-4, "text {:?}", text);
        }
    }

    #[test]
    fn test_mock_embedding_differs_by_text() {
        let a = mock_embedding("hello", DEFAULT_DIMS);
        let b = mock_embedding("world", DEFAULT_DIMS);
        assert_ne!(a, b);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.3, -1.2, 4.0];
        let b = vec![2.0, 0.5, -0.7];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-6);
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err, VectorError::LengthMismatch { left: 2, right: 1 });
    }
}
