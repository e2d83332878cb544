use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use factline_core::{
    AtomicTask, CandidateMap, Decomposition, Embedder, Extraction, HashEmbedder, LlmError,
    LlmGateway, MergeDecision, OrchestrationPlan,
};
use factline_engine::{EngineConfig, EngineServices, FactEngine};
use factline_llm::{GatewayModels, OpenAiConfig, OpenAiEmbedder, OpenAiGateway, RetryPolicy};
use factline_store::{FactStore, SqliteVectorIndex};

use crate::cli_args::{Cli, CliEmbedderKind};

pub(crate) fn init_tracing(log_level: &str) {
    let default_level = log_level.trim().parse::<LevelFilter>().unwrap_or(LevelFilter::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn sibling_path(database: &Path, file_name: &str) -> PathBuf {
    database
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(file_name)
}

pub(crate) fn index_path(cli: &Cli) -> PathBuf {
    cli.index
        .clone()
        .unwrap_or_else(|| sibling_path(&cli.database, "vectors.sqlite"))
}

pub(crate) fn state_path(cli: &Cli) -> PathBuf {
    cli.state_file
        .clone()
        .unwrap_or_else(|| sibling_path(&cli.database, "state.json"))
}

fn openai_config(cli: &Cli, api_key: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_base: cli.api_base.clone(),
        api_key: api_key.to_string(),
        request_timeout_ms: cli.request_timeout_ms,
        retry: RetryPolicy {
            max_retries: cli.max_retries,
            budget_ms: 0,
        },
    }
}

/// Stands in for the gateway when no API key is configured; every call fails.
struct UnavailableGateway;

impl LlmGateway for UnavailableGateway {
    fn decompose(&self, _query_text: &str) -> Result<Decomposition, LlmError> {
        Err(LlmError::MissingApiKey)
    }

    fn orchestrate(
        &self,
        _query_text: &str,
        _tasks: &[AtomicTask],
        _candidates: &CandidateMap,
    ) -> Result<OrchestrationPlan, LlmError> {
        Err(LlmError::MissingApiKey)
    }

    fn extract(&self, _prompt: &str, _context_chunks: &[String]) -> Result<Extraction, LlmError> {
        Err(LlmError::MissingApiKey)
    }

    fn translate(
        &self,
        _value: &Value,
        _target_language: &str,
        _source_language: &str,
    ) -> Result<Value, LlmError> {
        Err(LlmError::MissingApiKey)
    }

    fn merge_on_new_evidence(
        &self,
        _prompt: &str,
        _current_base: &Value,
        _new_context: &[String],
        _base_language: &str,
    ) -> Result<MergeDecision, LlmError> {
        Err(LlmError::MissingApiKey)
    }
}

fn build_services(cli: &Cli) -> Result<EngineServices> {
    let api_key = cli
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let gateway: Arc<dyn LlmGateway> = match api_key {
        Some(key) => Arc::new(
            OpenAiGateway::new(
                openai_config(cli, key),
                GatewayModels {
                    decomposer: cli.decomposer_model.clone(),
                    worker: cli.worker_model.clone(),
                },
            )
            .context("failed to build LLM gateway")?,
        ),
        None => {
            tracing::warn!("no API key configured; LLM-backed operations will fail");
            Arc::new(UnavailableGateway)
        }
    };

    let embedder: Arc<dyn Embedder> = match cli.embedder {
        CliEmbedderKind::Hash => Arc::new(HashEmbedder::new(cli.embedding_dimensions)),
        CliEmbedderKind::Openai => {
            let key = api_key.context("the openai embedder requires OPENAI_API_KEY")?;
            Arc::new(
                OpenAiEmbedder::new(
                    openai_config(cli, key),
                    cli.embedding_model.clone(),
                    cli.embedding_dimensions,
                )
                .context("failed to build embedder")?,
            )
        }
    };

    let index_path = index_path(cli);
    let index = SqliteVectorIndex::open(&index_path)
        .with_context(|| format!("failed to open vector index {}", index_path.display()))?;

    Ok(EngineServices {
        embedder,
        index: Arc::new(index),
        gateway,
    })
}

pub(crate) fn build_engine(cli: &Cli) -> Result<FactEngine> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let store = FactStore::open(&cli.database)
        .with_context(|| format!("failed to open fact store {}", cli.database.display()))?;
    let services = build_services(cli)?;
    FactEngine::new(store, services, config).context("invalid engine configuration")
}
