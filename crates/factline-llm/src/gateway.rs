use serde_json::{json, Value};

use factline_core::{
    AtomicTask, CandidateMap, Decomposition, Extraction, LlmError, LlmGateway, MergeDecision,
    OrchestrationPlan,
};

use crate::client::{OpenAiConfig, OpenAiTransport};
use crate::parse::{
    chat_json_content, parse_decomposition, parse_extraction, parse_merge_decision,
    parse_orchestration,
};
use crate::prompts::{PromptLibrary, DECOMPOSE, EXTRACT, MERGE, ORCHESTRATE, TRANSLATE};

pub const DEFAULT_DECOMPOSER_MODEL: &str = "gpt-4.1";
pub const DEFAULT_WORKER_MODEL: &str = "gpt-4.1-mini";

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const SCALAR_WRAPPER_KEY: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Model routing: planning calls use the decomposer, per-fact calls the worker.
pub struct GatewayModels {
    pub decomposer: String,
    pub worker: String,
}

impl Default for GatewayModels {
    fn default() -> Self {
        Self {
            decomposer: DEFAULT_DECOMPOSER_MODEL.to_string(),
            worker: DEFAULT_WORKER_MODEL.to_string(),
        }
    }
}

/// `LlmGateway` over an OpenAI-compatible chat completions endpoint in JSON mode.
pub struct OpenAiGateway {
    transport: OpenAiTransport,
    models: GatewayModels,
    prompts: PromptLibrary,
}

impl OpenAiGateway {
    pub fn new(config: OpenAiConfig, models: GatewayModels) -> Result<Self, LlmError> {
        Ok(Self {
            transport: OpenAiTransport::new(config)?,
            models,
            prompts: PromptLibrary::new()?,
        })
    }

    fn complete_json(&self, model: &str, prompt: String) -> Result<Value, LlmError> {
        let body = json!({
            "model": model,
            "messages": [{"role": "system", "content": prompt}],
            "response_format": {"type": "json_object"},
        });
        let response = self.transport.post_json(CHAT_COMPLETIONS_PATH, &body)?;
        chat_json_content(&response)
    }
}

impl LlmGateway for OpenAiGateway {
    #[tracing::instrument(name = "factline.llm.decompose", skip_all)]
    fn decompose(&self, query_text: &str) -> Result<Decomposition, LlmError> {
        let prompt = self
            .prompts
            .render(DECOMPOSE, json!({ "query_text": query_text }))?;
        let payload = self.complete_json(&self.models.decomposer, prompt)?;
        let decomposition = parse_decomposition(&payload)?;
        tracing::debug!(
            tasks = decomposition.tasks.len(),
            language = %decomposition.user_language,
            "query decomposed"
        );
        Ok(decomposition)
    }

    #[tracing::instrument(name = "factline.llm.orchestrate", skip_all, fields(tasks = tasks.len()))]
    fn orchestrate(
        &self,
        query_text: &str,
        tasks: &[AtomicTask],
        candidates: &CandidateMap,
    ) -> Result<OrchestrationPlan, LlmError> {
        let prompt = self.prompts.render(
            ORCHESTRATE,
            json!({
                "query_text": query_text,
                "tasks": tasks,
                "tasks_json": serde_json::to_string_pretty(tasks)?,
                "candidates": candidates,
            }),
        )?;
        let payload = self.complete_json(&self.models.decomposer, prompt)?;
        parse_orchestration(&payload)
    }

    #[tracing::instrument(name = "factline.llm.extract", skip_all, fields(chunks = context_chunks.len()))]
    fn extract(&self, prompt: &str, context_chunks: &[String]) -> Result<Extraction, LlmError> {
        let rendered = self.prompts.render(
            EXTRACT,
            json!({ "prompt": prompt, "context": context_chunks.join("\n---\n") }),
        )?;
        let payload = self.complete_json(&self.models.worker, rendered)?;
        parse_extraction(&payload)
    }

    #[tracing::instrument(name = "factline.llm.translate", skip(self, value))]
    fn translate(
        &self,
        value: &Value,
        target_language: &str,
        source_language: &str,
    ) -> Result<Value, LlmError> {
        if target_language == source_language {
            return Ok(value.clone());
        }
        let wrapped = !matches!(value, Value::Object(_) | Value::Array(_));
        let outgoing = if wrapped {
            json!({ SCALAR_WRAPPER_KEY: value })
        } else {
            value.clone()
        };
        let rendered = self.prompts.render(
            TRANSLATE,
            json!({
                "source_language": source_language,
                "target_language": target_language,
                "value_json": serde_json::to_string(&outgoing)?,
            }),
        )?;
        let translated = self.complete_json(&self.models.worker, rendered)?;
        if !wrapped {
            return Ok(translated);
        }
        translated
            .get(SCALAR_WRAPPER_KEY)
            .cloned()
            .ok_or_else(|| {
                LlmError::InvalidResponse("translation dropped the wrapped value".to_string())
            })
    }

    #[tracing::instrument(name = "factline.llm.merge", skip(self, current_base, new_context))]
    fn merge_on_new_evidence(
        &self,
        prompt: &str,
        current_base: &Value,
        new_context: &[String],
        base_language: &str,
    ) -> Result<MergeDecision, LlmError> {
        let rendered = self.prompts.render(
            MERGE,
            json!({
                "prompt": prompt,
                "base_language": base_language,
                "current_json": serde_json::to_string_pretty(current_base)?,
                "context": new_context.join("\n---\n"),
            }),
        )?;
        let payload = self.complete_json(&self.models.worker, rendered)?;
        parse_merge_decision(&payload)
    }
}
