use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Builds the `{ "error": code }` marker used for unresolved values.
pub fn error_value(code: &str) -> Value {
    json!({ "error": code })
}

/// Returns true when `value` is an object carrying an `error` key.
pub fn is_error_value(value: &Value) -> bool {
    value
        .as_object()
        .map(|object| object.contains_key("error"))
        .unwrap_or(false)
}

/// Per-language content of a Fact.
///
/// The base-language entry is authoritative. Every other entry is a cached
/// translation of it and is discarded whenever the base entry is replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactContent {
    pub base_language: String,
    pub is_translatable: bool,
    content: BTreeMap<String, Value>,
}

impl FactContent {
    pub fn new(base_language: impl Into<String>, is_translatable: bool, base_value: Value) -> Self {
        let base_language = base_language.into();
        let mut content = BTreeMap::new();
        content.insert(base_language.clone(), base_value);
        Self {
            base_language,
            is_translatable,
            content,
        }
    }

    /// Rebuilds content from stored parts without enforcing a base entry.
    pub fn from_parts(
        base_language: impl Into<String>,
        is_translatable: bool,
        content: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            base_language: base_language.into(),
            is_translatable,
            content,
        }
    }

    pub fn base_value(&self) -> Option<&Value> {
        self.content.get(self.base_language.as_str())
    }

    pub fn value_for(&self, language: &str) -> Option<&Value> {
        self.content.get(language)
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.content
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.content.keys().map(String::as_str)
    }

    /// Replaces the base entry and drops every derived translation.
    pub fn replace_base(&mut self, value: Value, is_translatable: bool) {
        self.content.clear();
        self.content.insert(self.base_language.clone(), value);
        self.is_translatable = is_translatable;
    }

    /// Caches a translation. Error markers and base-language writes are refused.
    pub fn cache_translation(&mut self, language: &str, value: Value) -> bool {
        if language == self.base_language || is_error_value(&value) {
            return false;
        }
        self.content.insert(language.to_string(), value);
        true
    }
}
