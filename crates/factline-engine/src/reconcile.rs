//! New-query path: decomposition, candidate confirmation, orchestration,
//! per-placeholder reuse or creation, linking, and the first assembly.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use factline_core::{
    error_value, AtomicTask, CandidateMap, Collection, Decomposition, Extraction, Fact, FactContent,
    FactId, FactStatus, FieldType, IndexEntry, OrchestrationPlan, PlaceholderSpec, QueryId,
    SpecAction,
};
use factline_store::{facts, links, queries};

use crate::assembler::assemble_and_store;
use crate::engine::EngineServices;
use crate::matcher::CandidateMatcher;
use crate::{EngineConfig, EngineError};

/// How a placeholder was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Reused,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderOutcome {
    pub placeholder: String,
    pub fact_id: FactId,
    pub resolution: Resolution,
}

/// Result of submitting or editing a Query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryOutcome {
    pub query_id: QueryId,
    pub language: String,
    pub answer: String,
    pub answer_revision: u64,
    pub placeholders: Vec<PlaceholderOutcome>,
}

impl QueryOutcome {
    pub fn created_facts(&self) -> Vec<FactId> {
        self.placeholders
            .iter()
            .filter(|outcome| outcome.resolution == Resolution::Created)
            .map(|outcome| outcome.fact_id)
            .collect()
    }
}

/// Index entries that become visible only after the surrounding transaction commits.
#[derive(Debug, Default)]
pub(crate) struct PendingIndex {
    pub(crate) entries: Vec<IndexEntry>,
}

impl PendingIndex {
    pub(crate) fn push_fact(
        &mut self,
        services: &EngineServices,
        fact_id: FactId,
        prompt: &str,
        keywords: &[String],
    ) -> Result<(), EngineError> {
        let mut texts = vec![(FieldType::PromptText, prompt.to_string())];
        texts.extend(
            keywords
                .iter()
                .map(|keyword| keyword.trim())
                .filter(|keyword| !keyword.is_empty())
                .map(|keyword| (FieldType::Keyword, keyword.to_string())),
        );
        self.push_texts(services, Collection::Facts, fact_id.get(), texts)
    }

    pub(crate) fn push_texts(
        &mut self,
        services: &EngineServices,
        collection: Collection,
        owner_id: i64,
        texts: Vec<(FieldType, String)>,
    ) -> Result<(), EngineError> {
        if texts.is_empty() {
            return Ok(());
        }
        let raw = texts.iter().map(|(_, text)| text.clone()).collect::<Vec<_>>();
        let vectors = services.embedder.embed_batch(&raw)?;
        for ((field_type, text), embedding) in texts.into_iter().zip(vectors) {
            self.entries.push(IndexEntry {
                collection,
                owner_id,
                field_type,
                text,
                embedding,
            });
        }
        Ok(())
    }

    /// Writes the entries after commit. Failures are logged; committed rows stay.
    pub(crate) fn flush(self, services: &EngineServices) -> usize {
        if self.entries.is_empty() {
            return 0;
        }
        match services.index.add(&self.entries) {
            Ok(added) => added,
            Err(error) => {
                tracing::error!(
                    entries = self.entries.len(),
                    error = %error,
                    "failed to index committed metadata"
                );
                0
            }
        }
    }
}

pub(crate) struct Reconciler<'a> {
    services: &'a EngineServices,
    config: &'a EngineConfig,
}

fn normalized_language(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(services: &'a EngineServices, config: &'a EngineConfig) -> Self {
        Self { services, config }
    }

    fn matcher(&self) -> CandidateMatcher<'_> {
        CandidateMatcher::new(
            self.services.embedder.as_ref(),
            self.services.index.as_ref(),
            self.config,
        )
    }

    /// Decomposes outside any transaction. A failed call counts as zero tasks.
    pub(crate) fn decompose(&self, query_text: &str) -> Result<Decomposition, EngineError> {
        let decomposition = match self.services.gateway.decompose(query_text) {
            Ok(decomposition) => decomposition,
            Err(error) => {
                tracing::warn!(error = %error, "decomposition call failed");
                Decomposition::default()
            }
        };
        if decomposition.tasks.is_empty() {
            return Err(EngineError::DecompositionFailure);
        }
        Ok(decomposition)
    }

    /// Plans, links, and assembles `query_id` on `connection`. The caller owns
    /// the transaction and commits it before flushing `pending`.
    pub(crate) fn reconcile(
        &self,
        connection: &Connection,
        query_id: QueryId,
        query_text: &str,
        decomposition: &Decomposition,
        pending: &mut PendingIndex,
        now_unix_ms: u64,
    ) -> Result<QueryOutcome, EngineError> {
        let language = normalized_language(&decomposition.user_language, &self.config.default_language);
        let matcher = self.matcher();

        let mut candidates = CandidateMap::new();
        let mut confirmed = BTreeSet::new();
        for task in &decomposition.tasks {
            let strong = matcher.strong_candidates(connection, task)?;
            confirmed.extend(strong.iter().map(|candidate| candidate.fact_id));
            candidates.insert(task.prompt.clone(), strong);
        }

        let plan = match self
            .services
            .gateway
            .orchestrate(query_text, &decomposition.tasks, &candidates)
        {
            Ok(plan) => plan,
            Err(error) => {
                tracing::warn!(error = %error, "orchestration call failed");
                OrchestrationPlan::default()
            }
        };
        if plan.render_plan.is_empty() {
            return Err(EngineError::OrchestrationFailure {
                missing: "render plan",
            });
        }
        if plan.specs.is_empty() {
            return Err(EngineError::OrchestrationFailure {
                missing: "specification list",
            });
        }

        let mut placeholders = Vec::with_capacity(plan.specs.len());
        for spec in &plan.specs {
            let (fact_id, resolution) = self.resolve_spec(
                connection,
                &matcher,
                spec,
                &candidates,
                &confirmed,
                &language,
                pending,
                now_unix_ms,
            )?;
            if let Some(replaced) = links::upsert_link(connection, query_id, fact_id, &spec.placeholder)? {
                if replaced != fact_id {
                    tracing::warn!(
                        query_id = query_id.get(),
                        placeholder = spec.placeholder.as_str(),
                        replaced = replaced.get(),
                        fact_id = fact_id.get(),
                        "duplicate placeholder specification; last one wins"
                    );
                }
            }
            placeholders.push(PlaceholderOutcome {
                placeholder: spec.placeholder.clone(),
                fact_id,
                resolution,
            });
        }

        queries::set_query_plan(connection, query_id, &language, &Value::Array(plan.render_plan))?;
        let stored = assemble_and_store(
            connection,
            self.services.gateway.as_ref(),
            self.config,
            query_id,
            now_unix_ms,
        )?;
        Ok(QueryOutcome {
            query_id,
            language,
            answer: stored.answer,
            answer_revision: stored.answer_revision,
            placeholders,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_spec(
        &self,
        connection: &Connection,
        matcher: &CandidateMatcher<'_>,
        spec: &PlaceholderSpec,
        candidates: &CandidateMap,
        confirmed: &BTreeSet<FactId>,
        language: &str,
        pending: &mut PendingIndex,
        now_unix_ms: u64,
    ) -> Result<(FactId, Resolution), EngineError> {
        match &spec.action {
            SpecAction::Reuse { fact_id } => {
                let fact = facts::load_fact(connection, *fact_id)?.ok_or_else(|| {
                    EngineError::UnknownFact {
                        placeholder: spec.placeholder.clone(),
                        fact_id: *fact_id,
                    }
                })?;
                if !confirmed.contains(fact_id) {
                    return Err(EngineError::UnconfirmedReuse {
                        placeholder: spec.placeholder.clone(),
                        fact_id: *fact_id,
                    });
                }
                self.reuse(connection, &fact, now_unix_ms)?;
                Ok((fact.id, Resolution::Reused))
            }
            SpecAction::Create { prompt, keywords } => {
                let prompt = prompt.trim();
                if let Some(existing) = facts::find_fact_by_prompt(connection, prompt)? {
                    tracing::info!(fact_id = existing.id.get(), "create resolved to exact prompt match");
                    self.reuse(connection, &existing, now_unix_ms)?;
                    return Ok((existing.id, Resolution::Reused));
                }
                let strong = match candidates.get(prompt) {
                    Some(strong) => strong.first().cloned(),
                    None => matcher
                        .strong_candidates(
                            connection,
                            &AtomicTask {
                                prompt: prompt.to_string(),
                                keywords: keywords.clone(),
                            },
                        )?
                        .into_iter()
                        .next(),
                };
                if let Some(candidate) = strong {
                    if let Some(existing) = facts::load_fact(connection, candidate.fact_id)? {
                        tracing::info!(
                            fact_id = existing.id.get(),
                            similarity = candidate.similarity,
                            "create resolved to confirmed candidate"
                        );
                        self.reuse(connection, &existing, now_unix_ms)?;
                        return Ok((existing.id, Resolution::Reused));
                    }
                }
                let fact_id = self.create_fact(connection, matcher, prompt, keywords, language, pending, now_unix_ms)?;
                Ok((fact_id, Resolution::Created))
            }
        }
    }

    fn reuse(&self, connection: &Connection, fact: &Fact, now_unix_ms: u64) -> Result<(), EngineError> {
        if fact.status == FactStatus::Deactivated {
            facts::set_fact_status(connection, fact.id, FactStatus::Fulfilled, now_unix_ms)?;
            tracing::info!(fact_id = fact.id.get(), "deactivated fact reactivated by reuse");
        } else {
            tracing::info!(fact_id = fact.id.get(), "fact reused");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn create_fact(
        &self,
        connection: &Connection,
        matcher: &CandidateMatcher<'_>,
        prompt: &str,
        keywords: &[String],
        language: &str,
        pending: &mut PendingIndex,
        now_unix_ms: u64,
    ) -> Result<FactId, EngineError> {
        let context = matcher.find_document_context(prompt, keywords, self.config.context_limit)?;
        let extraction = if context.is_empty() {
            tracing::info!("no document context; storing not_found without extraction");
            Extraction {
                is_translatable: false,
                data: error_value("not_found"),
            }
        } else {
            match self.services.gateway.extract(prompt, &context) {
                Ok(extraction) => extraction,
                Err(error) => {
                    tracing::warn!(error = %error, "extraction call failed");
                    Extraction {
                        is_translatable: false,
                        data: error_value(&error.to_string()),
                    }
                }
            }
        };

        let content = FactContent::new(language, extraction.is_translatable, extraction.data);
        let fact_id = facts::insert_fact(connection, prompt, &content, keywords, now_unix_ms)?;
        pending.push_fact(self.services, fact_id, prompt, keywords)?;
        tracing::info!(
            fact_id = fact_id.get(),
            context_chunks = context.len(),
            "fact created"
        );
        Ok(fact_id)
    }
}
