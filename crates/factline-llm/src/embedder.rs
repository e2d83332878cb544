use serde_json::{json, Value};

use factline_core::similarity::resize_and_normalize_embedding;
use factline_core::{Embedder, EmbeddingError};

use crate::client::{OpenAiConfig, OpenAiTransport};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// `Embedder` over an OpenAI-compatible `/embeddings` endpoint.
///
/// Provider vectors are folded to `dimensions` and L2-normalized so that they
/// are interchangeable with the hash embedder's output length.
pub struct OpenAiEmbedder {
    transport: OpenAiTransport,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        config: OpenAiConfig,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let transport =
            OpenAiTransport::new(config).map_err(|error| EmbeddingError::Config(error.to_string()))?;
        Ok(Self {
            transport,
            model: model.into(),
            dimensions: dimensions.max(1),
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let payload = self
            .transport
            .post_json("embeddings", &json!({ "model": self.model, "input": texts }))
            .map_err(|error| EmbeddingError::Request(error.to_string()))?;
        let data = payload
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("embedding response missing data array".to_string())
            })?;
        if data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "embedding response size mismatch: expected {}, got {}",
                texts.len(),
                data.len()
            )));
        }

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let raw_embedding = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    EmbeddingError::InvalidResponse("embedding item missing embedding array".to_string())
                })?;
            let parsed = raw_embedding
                .iter()
                .map(|component| {
                    component.as_f64().map(|value| value as f32).ok_or_else(|| {
                        EmbeddingError::InvalidResponse(
                            "embedding component must be numeric".to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            vectors.push(resize_and_normalize_embedding(&parsed, self.dimensions));
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
