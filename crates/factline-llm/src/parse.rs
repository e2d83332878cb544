//! Lenient decoding of model JSON payloads into typed gateway results.

use serde_json::{Map, Value};

use factline_core::{
    error_value, AtomicTask, Decomposition, Extraction, FactId, LlmError, MergeDecision,
    OrchestrationPlan, PlaceholderSpec, SpecAction,
};

/// Extracts the first choice's message content from a chat completion and decodes it as JSON.
pub(crate) fn chat_json_content(response: &Value) -> Result<Value, LlmError> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            LlmError::InvalidResponse("response contained no message content".to_string())
        })?;
    Ok(serde_json::from_str::<Value>(strip_code_fence(content))?)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, LlmError> {
    value
        .as_object()
        .ok_or_else(|| LlmError::InvalidResponse(format!("{what} payload must be a JSON object")))
}

fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty_str<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

pub(crate) fn parse_decomposition(value: &Value) -> Result<Decomposition, LlmError> {
    let object = as_object(value, "decomposition")?;
    let mut decomposition = Decomposition::default();
    if let Some(language) = non_empty_str(first_present(object, &["user_language", "user_language_code"])) {
        decomposition.user_language = language.to_ascii_lowercase();
    }
    if let Some(tasks) = first_present(object, &["tasks", "potential_tasks"]).and_then(Value::as_array) {
        for task in tasks {
            let Some(task) = task.as_object() else {
                continue;
            };
            let Some(prompt) = non_empty_str(task.get("prompt")) else {
                tracing::warn!("decomposition task without prompt skipped");
                continue;
            };
            decomposition.tasks.push(AtomicTask {
                prompt: prompt.to_string(),
                keywords: string_list(task.get("keywords")),
            });
        }
    }
    Ok(decomposition)
}

fn parse_fact_id(value: &Value) -> Option<FactId> {
    match value {
        Value::Number(number) => number.as_i64().map(FactId),
        Value::String(raw) => raw.trim().parse::<i64>().ok().map(FactId),
        _ => None,
    }
}

pub(crate) fn parse_orchestration(value: &Value) -> Result<OrchestrationPlan, LlmError> {
    let object = as_object(value, "orchestration")?;
    let render_plan = object
        .get("render_plan")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut specs = Vec::new();
    let raw_specs = first_present(object, &["prediction_specs", "specs"])
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for raw in raw_specs {
        let Some(spec) = raw.as_object() else {
            continue;
        };
        let Some(placeholder) = non_empty_str(spec.get("placeholder")) else {
            tracing::warn!("placeholder spec without name skipped");
            continue;
        };
        let action = if let Some(fact_id) = spec.get("reuse_fact_id").and_then(parse_fact_id) {
            SpecAction::Reuse { fact_id }
        } else if let Some(prompt) = non_empty_str(spec.get("new_fact_prompt")) {
            SpecAction::Create {
                prompt: prompt.to_string(),
                keywords: string_list(spec.get("keywords")),
            }
        } else {
            tracing::warn!(placeholder, "placeholder spec without action skipped");
            continue;
        };
        specs.push(PlaceholderSpec {
            placeholder: placeholder.to_string(),
            action,
        });
    }
    Ok(OrchestrationPlan { render_plan, specs })
}

pub(crate) fn parse_extraction(value: &Value) -> Result<Extraction, LlmError> {
    let object = as_object(value, "extraction")?;
    let data = object
        .get("data")
        .cloned()
        .ok_or_else(|| LlmError::InvalidResponse("extraction payload missing data".to_string()))?;
    let is_translatable = object
        .get("is_translatable")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(Extraction {
        is_translatable,
        data: if data.is_null() {
            error_value("not_found")
        } else {
            data
        },
    })
}

pub(crate) fn parse_merge_decision(value: &Value) -> Result<MergeDecision, LlmError> {
    let object = as_object(value, "merge")?;
    let status = non_empty_str(object.get("status"))
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| LlmError::InvalidResponse("merge payload missing status".to_string()))?;
    match status.as_str() {
        "update" => {
            let data = object
                .get("data")
                .filter(|data| !data.is_null())
                .cloned()
                .ok_or_else(|| {
                    LlmError::InvalidResponse("merge update payload missing data".to_string())
                })?;
            Ok(MergeDecision::Update {
                data,
                is_translatable: object
                    .get("is_translatable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        "no_change" => Ok(MergeDecision::NoChange),
        "error" => Ok(MergeDecision::Error {
            message: non_empty_str(object.get("message"))
                .unwrap_or("merge reported an error")
                .to_string(),
        }),
        other => Err(LlmError::InvalidResponse(format!(
            "unknown merge status '{other}'"
        ))),
    }
}
