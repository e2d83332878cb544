//! Document-arrival path: rerank affected Facts, merge new evidence, and
//! cascade refreshed answers to subscribed Queries.

use serde::Serialize;

use factline_core::{
    Collection, DocumentId, FactId, FieldType, MergeDecision, QueryId, SourceDocument,
};
use factline_store::{documents, facts, links, queries, FactStore};

use crate::assembler::{assemble_and_store, StoredAnswer};
use crate::engine::EngineServices;
use crate::matcher::CandidateMatcher;
use crate::reconcile::PendingIndex;
use crate::{EngineConfig, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingUrl,
    AlreadyIngested,
}

/// One Fact re-evaluated against the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactEvaluation {
    pub fact_id: FactId,
    pub score: f32,
    pub decision: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub source_url: Option<String>,
    pub document_id: Option<DocumentId>,
    pub skipped: Option<SkipReason>,
    pub evaluations: Vec<FactEvaluation>,
    pub updated_facts: Vec<FactId>,
    pub refreshed_answers: Vec<StoredAnswer>,
    pub failed_refreshes: Vec<QueryId>,
}

impl IngestReport {
    fn skipped(source_url: Option<String>, reason: SkipReason) -> Self {
        Self {
            source_url,
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

pub(crate) struct ReactiveUpdater<'a> {
    services: &'a EngineServices,
    config: &'a EngineConfig,
}

impl<'a> ReactiveUpdater<'a> {
    pub(crate) fn new(services: &'a EngineServices, config: &'a EngineConfig) -> Self {
        Self { services, config }
    }

    pub(crate) fn ingest(
        &self,
        store: &mut FactStore,
        source: &SourceDocument,
    ) -> Result<IngestReport, EngineError> {
        let source_url = source
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        let Some(url) = source_url.clone() else {
            tracing::warn!("document without a source url skipped");
            return Ok(IngestReport::skipped(None, SkipReason::MissingUrl));
        };
        if documents::document_exists(store.connection(), &url)? {
            tracing::info!(source_url = url.as_str(), "document already ingested; skipped");
            return Ok(IngestReport::skipped(source_url, SkipReason::AlreadyIngested));
        }

        let mut report = IngestReport {
            source_url,
            ..IngestReport::default()
        };
        let mut pending = PendingIndex::default();
        let now_unix_ms = factline_core::current_unix_timestamp_ms();

        let transaction = store.begin()?;
        let document_id = documents::insert_document(&transaction, source, now_unix_ms)?;
        report.document_id = Some(document_id);

        let mut document_texts = Vec::new();
        if !source.summary.trim().is_empty() {
            document_texts.push((FieldType::Summary, source.summary.trim().to_string()));
        }
        for keyword in &source.keywords {
            let keyword = keyword.trim();
            if !keyword.is_empty() {
                document_texts.push((FieldType::Keywords, keyword.to_string()));
            }
        }
        pending.push_texts(self.services, Collection::Documents, document_id.get(), document_texts)?;

        let matcher = CandidateMatcher::new(
            self.services.embedder.as_ref(),
            self.services.index.as_ref(),
            self.config,
        );
        let ranked = matcher.rerank_relevant_facts(&transaction, &source.summary, &source.keywords)?;
        let evidence = if source.raw_content.trim().is_empty() {
            vec![source.summary.clone()]
        } else {
            vec![source.raw_content.clone()]
        };

        for candidate in ranked {
            let Some(mut fact) = facts::load_fact(&transaction, candidate.fact_id)? else {
                continue;
            };
            let Some(current) = fact.content.base_value().cloned() else {
                tracing::warn!(fact_id = fact.id.get(), "fact has no base-language content; merge skipped");
                continue;
            };
            let decision = match self.services.gateway.merge_on_new_evidence(
                &fact.prompt,
                &current,
                &evidence,
                &fact.content.base_language,
            ) {
                Ok(decision) => decision,
                Err(error) => MergeDecision::Error {
                    message: error.to_string(),
                },
            };
            report.evaluations.push(FactEvaluation {
                fact_id: fact.id,
                score: candidate.score,
                decision: decision.label(),
            });
            match decision {
                MergeDecision::Update {
                    data,
                    is_translatable,
                } => {
                    fact.content.replace_base(data, is_translatable);
                    facts::save_merged_content(&transaction, fact.id, &fact.content, now_unix_ms)?;
                    tracing::info!(fact_id = fact.id.get(), score = candidate.score, "fact updated from new evidence");
                    report.updated_facts.push(fact.id);
                }
                MergeDecision::NoChange => {
                    tracing::debug!(fact_id = fact.id.get(), "merge reported no change");
                }
                MergeDecision::Error { message } => {
                    tracing::warn!(fact_id = fact.id.get(), error = message.as_str(), "merge failed; fact left untouched");
                }
            }
        }

        transaction.commit()?;
        pending.flush(self.services);
        tracing::info!(
            document_id = document_id.get(),
            evaluated = report.evaluations.len(),
            updated = report.updated_facts.len(),
            "document ingested"
        );

        self.cascade(store, &mut report)?;
        Ok(report)
    }

    /// Re-assembles every subscribed Query linked to an updated Fact, one commit each.
    fn cascade(&self, store: &mut FactStore, report: &mut IngestReport) -> Result<(), EngineError> {
        if report.updated_facts.is_empty() {
            return Ok(());
        }
        let query_ids = links::query_ids_for_facts(store.connection(), &report.updated_facts)?;
        for query_id in query_ids {
            let Some(query) = queries::load_query(store.connection(), query_id)? else {
                continue;
            };
            if !query.subscribed {
                tracing::debug!(query_id = query_id.get(), "unsubscribed query keeps its answer");
                continue;
            }
            match self.refresh_answer(store, query_id) {
                Ok(stored) => {
                    tracing::info!(
                        query_id = query_id.get(),
                        answer_revision = stored.answer_revision,
                        "answer refreshed"
                    );
                    report.refreshed_answers.push(stored);
                }
                Err(error) => {
                    tracing::warn!(query_id = query_id.get(), error = %error, "answer refresh failed");
                    report.failed_refreshes.push(query_id);
                }
            }
        }
        Ok(())
    }

    fn refresh_answer(&self, store: &mut FactStore, query_id: QueryId) -> Result<StoredAnswer, EngineError> {
        let transaction = store.begin()?;
        let stored = assemble_and_store(
            &transaction,
            self.services.gateway.as_ref(),
            self.config,
            query_id,
            factline_core::current_unix_timestamp_ms(),
        )?;
        transaction.commit()?;
        Ok(stored)
    }
}
