//! Renders a Query's stored block plan into its final answer text.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde_json::{Map, Value};

use factline_core::{error_value, is_error_value, Fact, FactId, Link, LlmGateway, Query, QueryId};
use factline_store::{facts, links, queries};

use crate::{EngineConfig, EngineError};

pub const PLAN_UNDECODABLE_MESSAGE: &str = "[The answer plan could not be decoded.]";
pub const PLAN_EMPTY_MESSAGE: &str = "[No answer plan was produced.]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderBlock {
    Paragraph {
        content: String,
    },
    List {
        placeholder: String,
        item_template: String,
        empty_message: Option<String>,
    },
    Unknown {
        block_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecodeError {
    Undecodable,
    Empty,
}

fn string_field(block: &Map<String, Value>, key: &str) -> Option<String> {
    block.get(key).and_then(Value::as_str).map(str::to_string)
}

fn decode_block(raw: &Value) -> RenderBlock {
    let Some(block) = raw.as_object() else {
        return RenderBlock::Unknown {
            block_type: "<not an object>".to_string(),
        };
    };
    match block.get("type").and_then(Value::as_str) {
        Some("paragraph") => RenderBlock::Paragraph {
            content: string_field(block, "content").unwrap_or_default(),
        },
        Some("list") => RenderBlock::List {
            placeholder: string_field(block, "placeholder").unwrap_or_default(),
            item_template: string_field(block, "item_template").unwrap_or_default(),
            empty_message: string_field(block, "empty_message"),
        },
        Some(other) => RenderBlock::Unknown {
            block_type: other.to_string(),
        },
        None => RenderBlock::Unknown {
            block_type: "<missing>".to_string(),
        },
    }
}

/// Decodes a stored plan. Raw strings are parsed as JSON before decoding.
pub fn decode_render_plan(plan: Option<&Value>) -> Result<Vec<RenderBlock>, PlanDecodeError> {
    let parsed;
    let plan = match plan {
        None | Some(Value::Null) => return Err(PlanDecodeError::Empty),
        Some(Value::String(raw)) => {
            parsed = serde_json::from_str::<Value>(raw).map_err(|_| PlanDecodeError::Undecodable)?;
            &parsed
        }
        Some(value) => value,
    };
    let blocks = plan.as_array().ok_or(PlanDecodeError::Undecodable)?;
    if blocks.is_empty() {
        return Err(PlanDecodeError::Empty);
    }
    Ok(blocks.iter().map(decode_block).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    MissingField(String),
    Malformed,
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitutes `{field}` names from `item`. `{{` and `}}` emit literal braces.
/// A `:spec` or `!conversion` suffix inside a field is accepted and ignored.
pub fn render_item_template(
    template: &str,
    item: &Map<String, Value>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(character) = chars.next() {
        match character {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '}' => return Err(TemplateError::Malformed),
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    if next == '{' {
                        return Err(TemplateError::Malformed);
                    }
                    field.push(next);
                }
                if !closed {
                    return Err(TemplateError::Malformed);
                }
                let name = field
                    .split([':', '!'])
                    .next()
                    .unwrap_or_default()
                    .trim();
                if name.is_empty() {
                    return Err(TemplateError::Malformed);
                }
                let value = item
                    .get(name)
                    .ok_or_else(|| TemplateError::MissingField(name.to_string()))?;
                output.push_str(&display_value(value));
            }
            other => output.push(other),
        }
    }
    Ok(output)
}

/// Answer text plus the Facts that gained a cached translation while rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAnswer {
    pub text: String,
    pub translated_facts: Vec<FactId>,
}

pub struct AnswerAssembler<'a> {
    gateway: &'a dyn LlmGateway,
    config: &'a EngineConfig,
}

impl<'a> AnswerAssembler<'a> {
    pub fn new(gateway: &'a dyn LlmGateway, config: &'a EngineConfig) -> Self {
        Self { gateway, config }
    }

    /// Renders `query` using `facts` keyed by id. Newly translated values are
    /// cached on the Facts in place and reported in `translated_facts`.
    pub fn assemble(
        &self,
        query: &Query,
        links: &[Link],
        facts: &mut BTreeMap<FactId, Fact>,
    ) -> AssembledAnswer {
        let blocks = match decode_render_plan(query.render_plan.as_ref()) {
            Ok(blocks) => blocks,
            Err(PlanDecodeError::Undecodable) => {
                tracing::error!(query_id = query.id.get(), "render plan could not be decoded");
                return AssembledAnswer {
                    text: PLAN_UNDECODABLE_MESSAGE.to_string(),
                    translated_facts: Vec::new(),
                };
            }
            Err(PlanDecodeError::Empty) => {
                return AssembledAnswer {
                    text: PLAN_EMPTY_MESSAGE.to_string(),
                    translated_facts: Vec::new(),
                };
            }
        };

        let target_language = query
            .language
            .as_deref()
            .filter(|language| !language.trim().is_empty())
            .unwrap_or(self.config.default_language.as_str());
        let mut translated_facts = Vec::new();
        let mut context = BTreeMap::<&str, Value>::new();
        for link in links {
            let value = match facts.get_mut(&link.fact_id) {
                Some(fact) => self.resolve_value(fact, target_language, &mut translated_facts),
                None => None,
            };
            let value = match value {
                Some(value) if !value.is_null() => value,
                _ => error_value("not_found"),
            };
            context.insert(link.placeholder.as_str(), value);
        }

        let mut parts = Vec::new();
        for block in &blocks {
            self.render_block(block, &context, &mut parts);
        }
        AssembledAnswer {
            text: parts.join("\n"),
            translated_facts,
        }
    }

    fn resolve_value(
        &self,
        fact: &mut Fact,
        target_language: &str,
        translated_facts: &mut Vec<FactId>,
    ) -> Option<Value> {
        let content = &mut fact.content;
        if !content.is_translatable {
            return content.base_value().cloned();
        }
        if let Some(cached) = content.value_for(target_language) {
            return Some(cached.clone());
        }
        let Some(base) = content.base_value().cloned() else {
            return Some(error_value("source_data_missing"));
        };
        if is_error_value(&base) {
            return Some(base);
        }
        let base_language = content.base_language.clone();
        match self.gateway.translate(&base, target_language, &base_language) {
            Ok(translated) if !is_error_value(&translated) => {
                if content.cache_translation(target_language, translated.clone()) {
                    translated_facts.push(fact.id);
                }
                Some(translated)
            }
            Ok(_) => {
                tracing::warn!(
                    fact_id = fact.id.get(),
                    target_language,
                    "translation returned an error marker"
                );
                Some(error_value("translation_failed"))
            }
            Err(error) => {
                tracing::warn!(
                    fact_id = fact.id.get(),
                    target_language,
                    error = %error,
                    "translation failed"
                );
                Some(error_value("translation_failed"))
            }
        }
    }

    fn render_block(&self, block: &RenderBlock, context: &BTreeMap<&str, Value>, parts: &mut Vec<String>) {
        match block {
            RenderBlock::Paragraph { content } => parts.push(content.clone()),
            RenderBlock::List {
                placeholder,
                item_template,
                empty_message,
            } => {
                let empty_message = empty_message
                    .clone()
                    .unwrap_or_else(|| self.config.list_empty_message.clone());
                let items = match context.get(placeholder.as_str()) {
                    Some(Value::Array(items)) if !items.is_empty() => items,
                    _ => {
                        parts.push(empty_message);
                        return;
                    }
                };
                for item in items {
                    let Some(fields) = item.as_object() else {
                        parts.push(display_value(item));
                        continue;
                    };
                    match render_item_template(item_template, fields) {
                        Ok(rendered) => parts.push(rendered),
                        Err(error) => {
                            tracing::warn!(
                                placeholder = placeholder.as_str(),
                                error = ?error,
                                "item template could not be rendered; emitting raw template"
                            );
                            parts.push(item_template.clone());
                        }
                    }
                }
            }
            RenderBlock::Unknown { block_type } => {
                parts.push(format!("[unsupported block type: {block_type}]"));
            }
        }
    }
}

/// An answer persisted together with its revision.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredAnswer {
    pub query_id: QueryId,
    pub answer: String,
    pub answer_revision: u64,
}

/// Re-renders a stored Query and persists new translations plus the answer on `connection`.
pub(crate) fn assemble_and_store(
    connection: &Connection,
    gateway: &dyn LlmGateway,
    config: &EngineConfig,
    query_id: QueryId,
    now_unix_ms: u64,
) -> Result<StoredAnswer, EngineError> {
    let query = queries::load_query(connection, query_id)?.ok_or(EngineError::QueryNotFound(query_id))?;
    let query_links = links::links_for_query(connection, query_id)?;
    let mut linked_facts = BTreeMap::new();
    for link in &query_links {
        if linked_facts.contains_key(&link.fact_id) {
            continue;
        }
        if let Some(fact) = facts::load_fact(connection, link.fact_id)? {
            linked_facts.insert(fact.id, fact);
        }
    }

    let assembled = AnswerAssembler::new(gateway, config).assemble(&query, &query_links, &mut linked_facts);
    for fact_id in &assembled.translated_facts {
        if let Some(fact) = linked_facts.get(fact_id) {
            facts::save_cached_translations(connection, *fact_id, &fact.content)?;
        }
    }
    let answer_revision = queries::store_answer(connection, query_id, &assembled.text, now_unix_ms)?;
    tracing::debug!(
        query_id = query_id.get(),
        answer_revision,
        translations = assembled.translated_facts.len(),
        "answer stored"
    );
    Ok(StoredAnswer {
        query_id,
        answer: assembled.text,
        answer_revision,
    })
}
