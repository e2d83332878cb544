use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::FactContent;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(
    /// Row id of a stored source document.
    DocumentId
);
record_id!(
    /// Row id of a cached Fact.
    FactId
);
record_id!(
    /// Row id of a user query.
    QueryId
);

/// A parsed source document that has not been stored yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_url: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub raw_content: String,
    pub summary: String,
    pub keywords: Vec<String>,
}

/// Immutable stored document. Created once per unique source URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source_url: String,
    pub publication_date: Option<NaiveDate>,
    pub raw_content: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub processed_unix_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Enumerates supported `FactStatus` values.
pub enum FactStatus {
    #[default]
    Fulfilled,
    Deactivated,
}

impl FactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fulfilled => "FULFILLED",
            Self::Deactivated => "DEACTIVATED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "FULFILLED" => Some(Self::Fulfilled),
            "DEACTIVATED" => Some(Self::Deactivated),
            _ => None,
        }
    }
}

impl fmt::Display for FactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached extraction answering one atomic task, anchored by its unique prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub prompt: String,
    pub content: FactContent,
    pub keywords: Vec<String>,
    pub status: FactStatus,
    pub update_count: u64,
    pub updated_unix_ms: u64,
}

/// A user question with its render plan and the last assembled answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub text: String,
    pub subscribed: bool,
    pub language: Option<String>,
    pub render_plan: Option<Value>,
    pub final_answer: Option<String>,
    pub answer_updated_unix_ms: Option<u64>,
    pub answer_revision: u64,
    pub created_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub query_id: QueryId,
    pub fact_id: FactId,
    pub placeholder: String,
}

/// One atomic, machine-answerable sub-task produced by decomposition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicTask {
    pub prompt: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// An existing Fact whose prompt passed exact reuse confirmation for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongCandidate {
    pub fact_id: FactId,
    pub prompt: String,
    pub similarity: f32,
}

/// Strong candidates keyed by task prompt.
pub type CandidateMap = BTreeMap<String, Vec<StrongCandidate>>;
