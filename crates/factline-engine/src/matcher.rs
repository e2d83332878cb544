//! Hybrid vector + keyword retrieval over the metadata index.
//!
//! Index recall is advisory. Reuse decisions always go through
//! [`CandidateMatcher::confirm_reuse`], which re-embeds both prompts and
//! compares them exactly.

use std::collections::BTreeMap;

use rusqlite::Connection;

use factline_core::{
    keyword_set_similarity, text_similarity, AtomicTask, Collection, Embedder, FactId, FieldType,
    IndexHit, StrongCandidate, VectorIndex,
};
use factline_store::facts;

use crate::{EngineConfig, EngineError};

/// A Fact scored against a newly arrived document.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFact {
    pub fact_id: FactId,
    pub score: f32,
    pub prompt_score: f32,
    pub keyword_score: f32,
}

pub struct CandidateMatcher<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    config: &'a EngineConfig,
}

fn non_empty_texts<'t>(text: &'t str, keywords: &'t [String]) -> (Option<&'t str>, Vec<String>) {
    let text = Some(text.trim()).filter(|text| !text.is_empty());
    let keywords = keywords
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect();
    (text, keywords)
}

impl<'a> CandidateMatcher<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Ranked Fact ids whose prompt or keywords are near `prompt_text` or any keyword.
    pub fn find_candidates(
        &self,
        prompt_text: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<FactId>, EngineError> {
        let (prompt_text, mut queries) = non_empty_texts(prompt_text, keywords);
        if let Some(prompt_text) = prompt_text {
            queries.insert(0, prompt_text.to_string());
        }
        if queries.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed_batch(&queries)?;
        let hits = self.index.query(
            Collection::Facts,
            &vectors,
            &[FieldType::PromptText, FieldType::Keyword],
            limit,
        )?;

        let mut best = BTreeMap::<i64, f32>::new();
        for hit in hits {
            best.entry(hit.owner_id)
                .and_modify(|distance| *distance = distance.min(hit.distance))
                .or_insert(hit.distance);
        }
        let mut ranked = best.into_iter().collect::<Vec<_>>();
        ranked.sort_by(|left, right| left.1.total_cmp(&right.1).then_with(|| left.0.cmp(&right.0)));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(owner_id, _)| FactId(owner_id)).collect())
    }

    /// Exact similarity between a task prompt and a candidate Fact's prompt.
    pub fn reuse_similarity(&self, task_prompt: &str, candidate_prompt: &str) -> f32 {
        text_similarity(self.embedder, task_prompt, candidate_prompt)
    }

    /// Authorizes reuse when the exact similarity reaches the reuse threshold.
    /// The confirmed similarity is returned so callers can rank candidates.
    pub fn confirm_reuse(&self, task_prompt: &str, candidate_prompt: &str) -> Option<f32> {
        let similarity = self.reuse_similarity(task_prompt, candidate_prompt);
        tracing::debug!(
            similarity,
            threshold = self.config.reuse_threshold,
            "reuse confirmation"
        );
        (similarity >= self.config.reuse_threshold).then_some(similarity)
    }

    /// Index recall followed by exact confirmation; only confirmed Facts are returned.
    pub fn strong_candidates(
        &self,
        connection: &Connection,
        task: &AtomicTask,
    ) -> Result<Vec<StrongCandidate>, EngineError> {
        let mut confirmed = Vec::new();
        for fact_id in self.find_candidates(&task.prompt, &task.keywords, self.config.candidate_limit)? {
            let Some(fact) = facts::load_fact(connection, fact_id)? else {
                tracing::warn!(fact_id = fact_id.get(), "index references a missing fact");
                continue;
            };
            if let Some(similarity) = self.confirm_reuse(&task.prompt, &fact.prompt) {
                confirmed.push(StrongCandidate {
                    fact_id,
                    prompt: fact.prompt,
                    similarity,
                });
            }
        }
        confirmed.sort_by(|left, right| {
            right
                .similarity
                .total_cmp(&left.similarity)
                .then_with(|| left.fact_id.cmp(&right.fact_id))
        });
        Ok(confirmed)
    }

    /// Document metadata texts relevant to a Fact prompt, nearest first.
    pub fn find_document_context(
        &self,
        prompt: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<String>, EngineError> {
        let (prompt, keywords) = non_empty_texts(prompt, keywords);
        if limit == 0 || (prompt.is_none() && keywords.is_empty()) {
            return Ok(Vec::new());
        }

        let mut hits = Vec::<IndexHit>::new();
        if let Some(prompt) = prompt {
            let vector = self.embedder.embed(prompt)?;
            hits.extend(self.index.query(
                Collection::Documents,
                &[vector],
                &[FieldType::Summary, FieldType::Keywords],
                limit,
            )?);
        }
        if !keywords.is_empty() {
            let vectors = self.embedder.embed_batch(&keywords)?;
            hits.extend(self.index.query(
                Collection::Documents,
                &vectors,
                &[FieldType::Keywords],
                limit,
            )?);
        }

        let mut best = BTreeMap::<(i64, FieldType, String), f32>::new();
        for hit in hits {
            best.entry((hit.owner_id, hit.field_type, hit.text))
                .and_modify(|distance| *distance = distance.min(hit.distance))
                .or_insert(hit.distance);
        }
        let mut ranked = best.into_iter().collect::<Vec<_>>();
        ranked.sort_by(|left, right| left.1.total_cmp(&right.1).then_with(|| left.0.cmp(&right.0)));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|((_, _, text), _)| text).collect())
    }

    /// Facts worth re-evaluating for a document, best first.
    ///
    /// Scores are `prompt_weight * cos(prompt, summary) + keyword_weight *
    /// keyword_set_similarity`; scores under `min_combined_score` are dropped.
    pub fn rerank_relevant_facts(
        &self,
        connection: &Connection,
        summary: &str,
        keywords: &[String],
    ) -> Result<Vec<RankedFact>, EngineError> {
        let pool = self.find_candidates(summary, keywords, self.config.rerank_pool_size())?;
        let mut ranked = Vec::new();
        for fact_id in pool {
            let Some(fact) = facts::load_fact(connection, fact_id)? else {
                continue;
            };
            let prompt_score = text_similarity(self.embedder, &fact.prompt, summary);
            let keyword_score = keyword_set_similarity(
                self.embedder,
                &fact.keywords,
                keywords,
                self.config.keyword_match_threshold,
            );
            let score =
                prompt_score * self.config.prompt_weight + keyword_score * self.config.keyword_weight;
            if score < self.config.min_combined_score {
                tracing::debug!(fact_id = fact_id.get(), score, "fact below rerank floor");
                continue;
            }
            ranked.push(RankedFact {
                fact_id,
                score,
                prompt_score,
                keyword_score,
            });
        }
        ranked.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.fact_id.cmp(&right.fact_id))
        });
        ranked.truncate(self.config.rerank_top_k);
        Ok(ranked)
    }
}
