use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use factline_core::{Embedder, Fact, FactId, LlmGateway, Query, QueryId, SourceDocument, VectorIndex};
use factline_store::{facts, links, queries, FactStore};

use crate::feed::{self, AnswerFeed};
use crate::maintenance::{self, EngineSnapshot, SweepReport};
use crate::reconcile::{PendingIndex, QueryOutcome, Reconciler};
use crate::source::{markdown_files_in, read_markdown_document};
use crate::updater::{IngestReport, ReactiveUpdater};
use crate::{EngineConfig, EngineError};

/// Injected collaborators: embedding model, vector index, and LLM gateway.
#[derive(Clone)]
pub struct EngineServices {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub gateway: Arc<dyn LlmGateway>,
}

/// Outcome of one file during path ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct FileIngestOutcome {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reactive Fact cache over a relational store and a metadata vector index.
///
/// Every top-level action runs in its own SQLite transaction. Index writes
/// for new Facts and Documents are deferred until that transaction commits.
pub struct FactEngine {
    store: FactStore,
    services: EngineServices,
    config: EngineConfig,
}

impl FactEngine {
    pub fn new(store: FactStore, services: EngineServices, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            store,
            services,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    #[tracing::instrument(name = "factline.engine.submit_query", skip_all)]
    pub fn submit_query(&mut self, query_text: &str) -> Result<QueryOutcome, EngineError> {
        let reconciler = Reconciler::new(&self.services, &self.config);
        let decomposition = reconciler.decompose(query_text)?;
        let mut pending = PendingIndex::default();
        let now_unix_ms = factline_core::current_unix_timestamp_ms();

        let transaction = self.store.begin()?;
        let query_id = queries::insert_query(&transaction, query_text, now_unix_ms)?;
        let outcome = reconciler.reconcile(
            &transaction,
            query_id,
            query_text,
            &decomposition,
            &mut pending,
            now_unix_ms,
        )?;
        transaction.commit()?;
        pending.flush(&self.services);
        tracing::info!(
            query_id = query_id.get(),
            placeholders = outcome.placeholders.len(),
            created = outcome.created_facts().len(),
            "query reconciled"
        );
        Ok(outcome)
    }

    /// Replaces the text, drops every Link, and rebuilds the Query in one transaction.
    #[tracing::instrument(name = "factline.engine.edit_query", skip_all, fields(query_id = query_id.get()))]
    pub fn edit_query(&mut self, query_id: QueryId, query_text: &str) -> Result<QueryOutcome, EngineError> {
        if queries::load_query(self.store.connection(), query_id)?.is_none() {
            return Err(EngineError::QueryNotFound(query_id));
        }
        let reconciler = Reconciler::new(&self.services, &self.config);
        let decomposition = reconciler.decompose(query_text)?;
        let mut pending = PendingIndex::default();
        let now_unix_ms = factline_core::current_unix_timestamp_ms();

        let transaction = self.store.begin()?;
        if !queries::update_query_text(&transaction, query_id, query_text)? {
            return Err(EngineError::QueryNotFound(query_id));
        }
        let removed = links::delete_links_for_query(&transaction, query_id)?;
        tracing::debug!(removed, "links cleared for edit");
        let outcome = reconciler.reconcile(
            &transaction,
            query_id,
            query_text,
            &decomposition,
            &mut pending,
            now_unix_ms,
        )?;
        transaction.commit()?;
        pending.flush(&self.services);
        tracing::info!(query_id = query_id.get(), "query edited");
        Ok(outcome)
    }

    #[tracing::instrument(name = "factline.engine.set_subscription", skip_all, fields(query_id = query_id.get()))]
    pub fn set_subscription(&mut self, query_id: QueryId, subscribed: bool) -> Result<(), EngineError> {
        if !queries::set_subscription(self.store.connection(), query_id, subscribed)? {
            return Err(EngineError::QueryNotFound(query_id));
        }
        tracing::info!(subscribed, "subscription updated");
        Ok(())
    }

    #[tracing::instrument(name = "factline.engine.ingest_document", skip_all)]
    pub fn ingest_document(&mut self, source: &SourceDocument) -> Result<IngestReport, EngineError> {
        ReactiveUpdater::new(&self.services, &self.config).ingest(&mut self.store, source)
    }

    /// Ingests one Markdown file or every `.md` file of a directory in sorted
    /// order. Per-file failures are reported and do not stop the batch.
    #[tracing::instrument(name = "factline.engine.ingest_path", skip_all, fields(path = %path.display()))]
    pub fn ingest_path(&mut self, path: &Path) -> Result<Vec<FileIngestOutcome>, EngineError> {
        let files = if path.is_dir() {
            markdown_files_in(path)?
        } else {
            vec![path.to_path_buf()]
        };
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let result = read_markdown_document(&file).and_then(|source| self.ingest_document(&source));
            let shown = file.display().to_string();
            match result {
                Ok(report) => outcomes.push(FileIngestOutcome {
                    path: shown,
                    report: Some(report),
                    error: None,
                }),
                Err(error) => {
                    tracing::warn!(path = shown.as_str(), error = %error, "document ingestion failed");
                    outcomes.push(FileIngestOutcome {
                        path: shown,
                        report: None,
                        error: Some(error.to_string()),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    pub fn answers_since(&self, cursor: u64, limit: usize) -> Result<AnswerFeed, EngineError> {
        feed::answers_since(self.store.connection(), cursor, limit)
    }

    #[tracing::instrument(name = "factline.engine.deactivate_unlinked_facts", skip_all)]
    pub fn deactivate_unlinked_facts(&mut self) -> Result<SweepReport, EngineError> {
        maintenance::deactivate_unlinked_facts(&mut self.store)
    }

    pub fn query(&self, query_id: QueryId) -> Result<Query, EngineError> {
        queries::load_query(self.store.connection(), query_id)?.ok_or(EngineError::QueryNotFound(query_id))
    }

    pub fn fact(&self, fact_id: FactId) -> Result<Option<Fact>, EngineError> {
        Ok(facts::load_fact(self.store.connection(), fact_id)?)
    }

    pub fn facts_for_query(&self, query_id: QueryId) -> Result<Vec<(String, Fact)>, EngineError> {
        let mut linked = Vec::new();
        for link in links::links_for_query(self.store.connection(), query_id)? {
            if let Some(fact) = facts::load_fact(self.store.connection(), link.fact_id)? {
                linked.push((link.placeholder, fact));
            }
        }
        Ok(linked)
    }

    #[tracing::instrument(name = "factline.engine.reset", skip_all)]
    pub fn reset(&mut self) -> Result<(), EngineError> {
        maintenance::reset(&mut self.store, self.services.index.as_ref())
    }

    pub fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        maintenance::snapshot(&self.store, self.services.index.as_ref())
    }
}
