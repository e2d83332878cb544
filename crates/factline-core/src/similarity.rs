use crate::services::{Embedder, EmbeddingError};

pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Deterministic offline embedder based on FNV-1a token hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(embed_text_vector(text, self.dimensions))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Converts text to a normalized fixed-size vector using FNV-1a token hashing.
pub fn embed_text_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let dimensions = dimensions.max(1);
    let mut vector = vec![0.0f32; dimensions];
    for token in tokenize_text(text) {
        let hash = fnv1a_hash(token.as_bytes());
        let index = (hash as usize) % dimensions;
        let sign = if (hash & 1) == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }
    normalize_in_place(&mut vector);
    vector
}

/// Folds an arbitrary-length embedding into `dimensions` buckets and L2-normalizes it.
pub fn resize_and_normalize_embedding(values: &[f32], dimensions: usize) -> Vec<f32> {
    let dimensions = dimensions.max(1);
    let mut resized = vec![0.0f32; dimensions];
    for (index, value) in values.iter().enumerate() {
        resized[index % dimensions] += *value;
    }
    normalize_in_place(&mut resized);
    resized
}

fn normalize_in_place(vector: &mut [f32]) {
    let magnitude = vector
        .iter()
        .map(|component| component * component)
        .sum::<f32>()
        .sqrt();
    if magnitude > 0.0 {
        for component in vector.iter_mut() {
            *component /= magnitude;
        }
    }
}

fn tokenize_text(text: &str) -> Vec<String> {
    text.split(|character: char| !character.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
}

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Computes cosine similarity. Mismatched lengths and zero vectors score `0.0`.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let dot = left
        .iter()
        .zip(right)
        .map(|(left, right)| left * right)
        .sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    (dot / (left_norm * right_norm)).clamp(-1.0, 1.0)
}

/// Embeds both texts and compares them. Empty input or an embedding failure scores `0.0`.
pub fn text_similarity(embedder: &dyn Embedder, left: &str, right: &str) -> f32 {
    if left.trim().is_empty() || right.trim().is_empty() {
        return 0.0;
    }
    let vectors = match embedder.embed_batch(&[left.to_string(), right.to_string()]) {
        Ok(vectors) => vectors,
        Err(error) => {
            tracing::warn!(error = %error, "text similarity embedding failed");
            return 0.0;
        }
    };
    match vectors.as_slice() {
        [left, right] => cosine_similarity(left, right),
        _ => {
            tracing::warn!(
                vectors = vectors.len(),
                "text similarity embedding returned unexpected vector count"
            );
            0.0
        }
    }
}

/// Soft overlap between two keyword sets.
///
/// Each keyword on the left takes its best similarity against the right set;
/// the result is the mean of the best scores that reach `threshold`, or `0.0`
/// when none do.
pub fn keyword_set_similarity(
    embedder: &dyn Embedder,
    left: &[String],
    right: &[String],
    threshold: f32,
) -> f32 {
    let left = non_empty_keywords(left);
    let right = non_empty_keywords(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let (left_vectors, right_vectors) =
        match (embedder.embed_batch(&left), embedder.embed_batch(&right)) {
            (Ok(left_vectors), Ok(right_vectors)) => (left_vectors, right_vectors),
            (Err(error), _) | (_, Err(error)) => {
                tracing::warn!(error = %error, "keyword similarity embedding failed");
                return 0.0;
            }
        };

    let matched = left_vectors
        .iter()
        .map(|left_vector| {
            right_vectors
                .iter()
                .map(|right_vector| cosine_similarity(left_vector, right_vector))
                .fold(f32::MIN, f32::max)
        })
        .filter(|best| *best >= threshold)
        .collect::<Vec<_>>();
    if matched.is_empty() {
        return 0.0;
    }
    matched.iter().sum::<f32>() / matched.len() as f32
}

fn non_empty_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}
