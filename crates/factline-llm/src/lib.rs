//! OpenAI-compatible implementations of the Factline gateway and embedder.

pub mod client;
pub mod embedder;
pub mod gateway;
mod parse;
mod prompts;
pub mod retry;

pub use client::{OpenAiConfig, OpenAiTransport, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT_MS};
pub use embedder::{OpenAiEmbedder, DEFAULT_EMBEDDING_MODEL};
pub use gateway::{GatewayModels, OpenAiGateway, DEFAULT_DECOMPOSER_MODEL, DEFAULT_WORKER_MODEL};
pub use retry::RetryPolicy;
