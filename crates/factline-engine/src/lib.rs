//! Reconciliation and reactive update engine for the Factline fact cache.
//!
//! [`FactEngine`] answers queries by reusing or creating Facts, keeps Facts
//! current as documents arrive, and re-renders subscribed answers when a
//! Fact they depend on changes.

pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod maintenance;
pub mod matcher;
pub mod reconcile;
pub mod source;
pub mod updater;

pub use assembler::{
    decode_render_plan, render_item_template, AnswerAssembler, AssembledAnswer, RenderBlock,
    StoredAnswer,
};
pub use config::{EngineConfig, DEFAULT_LIST_EMPTY_MESSAGE, DEFAULT_REUSE_THRESHOLD};
pub use engine::{EngineServices, FactEngine, FileIngestOutcome};
pub use error::EngineError;
pub use feed::{AnswerFeed, AnswerUpdate, DEFAULT_FEED_LIMIT};
pub use maintenance::{EngineSnapshot, IndexCounts, SweepReport};
pub use matcher::{CandidateMatcher, RankedFact};
pub use reconcile::{PlaceholderOutcome, QueryOutcome, Resolution};
pub use source::{markdown_files_in, parse_markdown_document, read_markdown_document};
pub use updater::{FactEvaluation, IngestReport, SkipReason};
