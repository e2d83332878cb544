use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use factline_core::similarity::DEFAULT_HASH_DIMENSIONS;
use factline_llm::{
    DEFAULT_API_BASE, DEFAULT_DECOMPOSER_MODEL, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_WORKER_MODEL,
};

pub(crate) const DEFAULT_DATABASE_PATH: &str = ".factline/factline.sqlite";

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum CliEmbedderKind {
    /// Deterministic offline token-hash embeddings.
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
}

#[derive(Debug, Parser)]
#[command(
    name = "factline",
    about = "Reactive fact cache that answers queries from reusable, self-updating facts",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "FACTLINE_DATABASE",
        default_value = DEFAULT_DATABASE_PATH,
        help = "SQLite database holding documents, facts, queries, and links."
    )]
    pub database: PathBuf,

    #[arg(
        long,
        env = "FACTLINE_INDEX",
        help = "SQLite vector index file. Defaults to vectors.sqlite beside the database."
    )]
    pub index: Option<PathBuf>,

    #[arg(
        long = "state-file",
        env = "FACTLINE_STATE",
        help = "File remembering the last submitted query id. Defaults to state.json beside the database."
    )]
    pub state_file: Option<PathBuf>,

    #[arg(
        long,
        env = "FACTLINE_CONFIG",
        help = "Optional TOML file with engine thresholds and limits."
    )]
    pub config: Option<PathBuf>,

    #[arg(long = "api-base", env = "FACTLINE_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    #[arg(
        long = "api-key",
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "API key for the OpenAI-compatible endpoint. Read-only commands work without it."
    )]
    pub api_key: Option<String>,

    #[arg(
        long = "decomposer-model",
        env = "FACTLINE_DECOMPOSER_MODEL",
        default_value = DEFAULT_DECOMPOSER_MODEL
    )]
    pub decomposer_model: String,

    #[arg(
        long = "worker-model",
        env = "FACTLINE_WORKER_MODEL",
        default_value = DEFAULT_WORKER_MODEL
    )]
    pub worker_model: String,

    #[arg(long, env = "FACTLINE_EMBEDDER", value_enum, default_value_t = CliEmbedderKind::Hash)]
    pub embedder: CliEmbedderKind,

    #[arg(
        long = "embedding-model",
        env = "FACTLINE_EMBEDDING_MODEL",
        default_value = DEFAULT_EMBEDDING_MODEL
    )]
    pub embedding_model: String,

    #[arg(
        long = "embedding-dimensions",
        env = "FACTLINE_EMBEDDING_DIMENSIONS",
        default_value_t = DEFAULT_HASH_DIMENSIONS,
        value_parser = parse_positive_usize
    )]
    pub embedding_dimensions: usize,

    #[arg(
        long = "request-timeout-ms",
        env = "FACTLINE_REQUEST_TIMEOUT_MS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_MS,
        value_parser = parse_positive_u64
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "max-retries",
        env = "FACTLINE_MAX_RETRIES",
        default_value_t = 0,
        help = "Retries for retryable HTTP statuses and transport errors."
    )]
    pub max_retries: usize,

    #[arg(
        long = "log-level",
        env = "FACTLINE_LOG",
        default_value = "warn",
        help = "Default log level; RUST_LOG directives take precedence."
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Args)]
pub(crate) struct QueryIdArg {
    /// Query id; defaults to the last submitted query.
    #[arg(long)]
    pub id: Option<i64>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// Submit a new query and print its answer.
    Query {
        #[arg(long)]
        text: String,
    },
    /// Replace a query's text and rebuild its answer.
    Edit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        text: String,
    },
    Subscribe(QueryIdArg),
    Unsubscribe(QueryIdArg),
    /// Print a query, its answer, and its linked facts.
    Show(QueryIdArg),
    /// Ingest Markdown documents or directories of them.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print subscribed answers written after a cursor.
    Poll {
        #[arg(long, default_value_t = 0)]
        cursor: u64,
        #[arg(long, default_value_t = factline_engine::DEFAULT_FEED_LIMIT, value_parser = parse_positive_usize)]
        limit: usize,
    },
    /// Deactivate facts that no query links to.
    Sweep,
    /// Export every record plus index counts as JSON.
    Dump {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete every record and index entry.
    Reset {
        #[arg(long, help = "Confirm the reset.")]
        yes: bool,
    },
}
