#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use factline_core::{
    AtomicTask, CandidateMap, Decomposition, Embedder, EmbeddingError, Extraction, FactId,
    HashEmbedder, LlmError, LlmGateway, MergeDecision, OrchestrationPlan, PlaceholderSpec,
    SourceDocument, SpecAction,
};
use factline_engine::{EngineConfig, EngineServices, FactEngine};
use factline_store::{FactStore, InMemoryVectorIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    Decompose {
        query_text: String,
    },
    Orchestrate {
        query_text: String,
        candidates: CandidateMap,
    },
    Extract {
        prompt: String,
        context: Vec<String>,
    },
    Translate {
        value: Value,
        target_language: String,
        source_language: String,
    },
    Merge {
        prompt: String,
        current: Value,
        context: Vec<String>,
    },
}

/// Queue-backed gateway double. An exhausted queue fails the call.
#[derive(Default)]
pub struct ScriptedGateway {
    decompositions: Mutex<VecDeque<Decomposition>>,
    plans: Mutex<VecDeque<OrchestrationPlan>>,
    extractions: Mutex<VecDeque<Extraction>>,
    translations: Mutex<VecDeque<Value>>,
    merges: Mutex<VecDeque<MergeDecision>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

fn exhausted(queue: &str) -> LlmError {
    LlmError::InvalidResponse(format!("scripted {queue} queue exhausted"))
}

impl ScriptedGateway {
    pub fn push_decomposition(&self, language: &str, tasks: &[(&str, &[&str])]) {
        self.decompositions
            .lock()
            .expect("decompositions lock")
            .push_back(Decomposition {
                user_language: language.to_string(),
                tasks: tasks
                    .iter()
                    .map(|(prompt, keywords)| AtomicTask {
                        prompt: prompt.to_string(),
                        keywords: strings(keywords),
                    })
                    .collect(),
            });
    }

    pub fn push_plan(&self, render_plan: Vec<Value>, specs: Vec<PlaceholderSpec>) {
        self.plans
            .lock()
            .expect("plans lock")
            .push_back(OrchestrationPlan { render_plan, specs });
    }

    pub fn push_extraction(&self, is_translatable: bool, data: Value) {
        self.extractions
            .lock()
            .expect("extractions lock")
            .push_back(Extraction {
                is_translatable,
                data,
            });
    }

    pub fn push_translation(&self, value: Value) {
        self.translations
            .lock()
            .expect("translations lock")
            .push_back(value);
    }

    pub fn push_merge(&self, decision: MergeDecision) {
        self.merges.lock().expect("merges lock").push_back(decision);
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn extract_requests(&self) -> Vec<(String, Vec<String>)> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                GatewayRequest::Extract { prompt, context } => Some((prompt, context)),
                _ => None,
            })
            .collect()
    }

    pub fn merge_requests(&self) -> Vec<(String, Vec<String>)> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                GatewayRequest::Merge {
                    prompt, context, ..
                } => Some((prompt, context)),
                _ => None,
            })
            .collect()
    }

    pub fn translate_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|request| matches!(request, GatewayRequest::Translate { .. }))
            .count()
    }

    pub fn last_orchestration_candidates(&self) -> Option<CandidateMap> {
        self.requests()
            .into_iter()
            .rev()
            .find_map(|request| match request {
                GatewayRequest::Orchestrate { candidates, .. } => Some(candidates),
                _ => None,
            })
    }

    fn record(&self, request: GatewayRequest) {
        self.requests.lock().expect("requests lock").push(request);
    }
}

impl LlmGateway for ScriptedGateway {
    fn decompose(&self, query_text: &str) -> Result<Decomposition, LlmError> {
        self.record(GatewayRequest::Decompose {
            query_text: query_text.to_string(),
        });
        self.decompositions
            .lock()
            .expect("decompositions lock")
            .pop_front()
            .ok_or_else(|| exhausted("decomposition"))
    }

    fn orchestrate(
        &self,
        query_text: &str,
        _tasks: &[AtomicTask],
        candidates: &CandidateMap,
    ) -> Result<OrchestrationPlan, LlmError> {
        self.record(GatewayRequest::Orchestrate {
            query_text: query_text.to_string(),
            candidates: candidates.clone(),
        });
        self.plans
            .lock()
            .expect("plans lock")
            .pop_front()
            .ok_or_else(|| exhausted("plan"))
    }

    fn extract(&self, prompt: &str, context_chunks: &[String]) -> Result<Extraction, LlmError> {
        self.record(GatewayRequest::Extract {
            prompt: prompt.to_string(),
            context: context_chunks.to_vec(),
        });
        self.extractions
            .lock()
            .expect("extractions lock")
            .pop_front()
            .ok_or_else(|| exhausted("extraction"))
    }

    fn translate(
        &self,
        value: &Value,
        target_language: &str,
        source_language: &str,
    ) -> Result<Value, LlmError> {
        self.record(GatewayRequest::Translate {
            value: value.clone(),
            target_language: target_language.to_string(),
            source_language: source_language.to_string(),
        });
        self.translations
            .lock()
            .expect("translations lock")
            .pop_front()
            .ok_or_else(|| exhausted("translation"))
    }

    fn merge_on_new_evidence(
        &self,
        prompt: &str,
        current_base: &Value,
        new_context: &[String],
        _base_language: &str,
    ) -> Result<MergeDecision, LlmError> {
        self.record(GatewayRequest::Merge {
            prompt: prompt.to_string(),
            current: current_base.clone(),
            context: new_context.to_vec(),
        });
        self.merges
            .lock()
            .expect("merges lock")
            .pop_front()
            .ok_or_else(|| exhausted("merge"))
    }
}

/// Hash embedder with pinned vectors for chosen texts and a log of embedded texts.
#[derive(Default)]
pub struct FixtureEmbedder {
    fallback: HashEmbedder,
    pinned: Mutex<BTreeMap<String, Vec<f32>>>,
    embedded: Mutex<Vec<String>>,
}

impl FixtureEmbedder {
    pub fn pin(&self, text: &str, vector: Vec<f32>) {
        self.pinned
            .lock()
            .expect("pinned lock")
            .insert(text.to_string(), vector);
    }

    /// Pins two texts to unit vectors whose cosine similarity is exactly `similarity`.
    pub fn pin_pair(&self, left: &str, right: &str, similarity: f32) {
        let dimensions = self.fallback.dimensions();
        let mut left_vector = vec![0.0; dimensions];
        left_vector[0] = 1.0;
        let mut right_vector = vec![0.0; dimensions];
        right_vector[0] = similarity;
        right_vector[1] = (1.0 - similarity * similarity).max(0.0).sqrt();
        self.pin(left, left_vector);
        self.pin(right, right_vector);
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().expect("embedded lock").clone()
    }
}

impl Embedder for FixtureEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embedded
            .lock()
            .expect("embedded lock")
            .push(text.to_string());
        if let Some(vector) = self.pinned.lock().expect("pinned lock").get(text) {
            return Ok(vector.clone());
        }
        self.fallback.embed(text)
    }

    fn dimensions(&self) -> usize {
        self.fallback.dimensions()
    }
}

pub struct Harness {
    pub engine: FactEngine,
    pub gateway: Arc<ScriptedGateway>,
    pub embedder: Arc<FixtureEmbedder>,
    pub index: Arc<InMemoryVectorIndex>,
}

pub fn harness() -> Harness {
    harness_with_store(FactStore::open_in_memory().expect("in-memory store"))
}

pub fn harness_with_store(store: FactStore) -> Harness {
    let gateway = Arc::new(ScriptedGateway::default());
    let embedder = Arc::new(FixtureEmbedder::default());
    let index = Arc::new(InMemoryVectorIndex::new());
    let services = EngineServices {
        embedder: embedder.clone(),
        index: index.clone(),
        gateway: gateway.clone(),
    };
    let engine = FactEngine::new(store, services, EngineConfig::default()).expect("engine");
    Harness {
        engine,
        gateway,
        embedder,
        index,
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn paragraph(content: &str) -> Value {
    json!({"type": "paragraph", "content": content})
}

pub fn list_block(placeholder: &str, item_template: &str, empty_message: &str) -> Value {
    json!({
        "type": "list",
        "placeholder": placeholder,
        "item_template": item_template,
        "empty_message": empty_message
    })
}

pub fn create_spec(placeholder: &str, prompt: &str, keywords: &[&str]) -> PlaceholderSpec {
    PlaceholderSpec {
        placeholder: placeholder.to_string(),
        action: SpecAction::Create {
            prompt: prompt.to_string(),
            keywords: strings(keywords),
        },
    }
}

pub fn reuse_spec(placeholder: &str, fact_id: FactId) -> PlaceholderSpec {
    PlaceholderSpec {
        placeholder: placeholder.to_string(),
        action: SpecAction::Reuse { fact_id },
    }
}

pub fn document(url: &str, summary: &str, keywords: &[&str], body: &str) -> SourceDocument {
    SourceDocument {
        source_url: Some(url.to_string()),
        publication_date: None,
        raw_content: body.to_string(),
        summary: summary.to_string(),
        keywords: strings(keywords),
    }
}
