#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use serde_json::{json, Value};

use factline_core::{
    AtomicTask, CandidateMap, Decomposition, Extraction, Fact, FactContent, FactId, FactStatus,
    Link, LlmError, LlmGateway, MergeDecision, OrchestrationPlan, Query, QueryId,
};
use factline_engine::{render_item_template, AnswerAssembler, EngineConfig};

struct OfflineGateway;

impl LlmGateway for OfflineGateway {
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

    fn translate(&self, _value: &Value, _target: &str, _source: &str) -> Result<Value, LlmError> {
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

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data).into_owned();
    let item = json!({"city": "Ankara", "population": 5.8});
    if let Some(fields) = item.as_object() {
        let _ = render_item_template(&raw, fields);
    }

    let query = Query {
        id: QueryId(1),
        text: "fuzz".to_string(),
        subscribed: true,
        language: Some("tr".to_string()),
        render_plan: Some(Value::String(raw)),
        final_answer: None,
        answer_updated_unix_ms: None,
        answer_revision: 0,
        created_unix_ms: 0,
    };
    let links = ["p1", "capital", "population"]
        .iter()
        .map(|placeholder| Link {
            query_id: QueryId(1),
            fact_id: FactId(7),
            placeholder: placeholder.to_string(),
        })
        .collect::<Vec<_>>();
    let mut facts = BTreeMap::from([(
        FactId(7),
        Fact {
            id: FactId(7),
            prompt: "fuzz prompt".to_string(),
            content: FactContent::new("en", true, json!([{"city": "Ankara"}, "plain", 3])),
            keywords: Vec::new(),
            status: FactStatus::Fulfilled,
            update_count: 0,
            updated_unix_ms: 0,
        },
    )]);

    let gateway = OfflineGateway;
    let config = EngineConfig::default();
    let assembler = AnswerAssembler::new(&gateway, &config);
    let first = assembler.assemble(&query, &links, &mut facts);
    let second = assembler.assemble(&query, &links, &mut facts);
    assert_eq!(first.text, second.text);
    assert!(first.translated_facts.is_empty());
});
