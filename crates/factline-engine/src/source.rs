//! Markdown documents with a YAML front-matter header.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;

use factline_core::SourceDocument;

use crate::EngineError;

const MARKDOWN_EXTENSION: &str = "md";

fn front_matter_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?s)\A\u{feff}?---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n(.*))?\z").ok()
        })
        .as_ref()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrontMatter {
    url: Option<String>,
    pub_date: Option<YamlValue>,
    summary: Option<String>,
    keywords: Vec<YamlValue>,
    entities: Vec<YamlValue>,
}

fn yaml_scalar_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(text) => Some(text.clone()),
        YamlValue::Number(number) => Some(number.to_string()),
        YamlValue::Bool(flag) => Some(flag.to_string()),
        YamlValue::Mapping(mapping) => mapping.get("value").and_then(yaml_scalar_text),
        YamlValue::Tagged(tagged) => yaml_scalar_text(&tagged.value),
        YamlValue::Null | YamlValue::Sequence(_) => None,
    }
}

/// Parses `YYYY-MM-DD`, RFC 3339 timestamps, or a date-prefixed string.
pub fn parse_publication_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Front-matter keywords followed by entity values, trimmed and deduplicated in order.
fn merge_keywords(keywords: &[YamlValue], entities: &[YamlValue]) -> Vec<String> {
    let mut merged = Vec::<String>::new();
    for value in keywords.iter().chain(entities) {
        let Some(text) = yaml_scalar_text(value) else {
            continue;
        };
        let text = text.trim();
        if !text.is_empty() && !merged.iter().any(|existing| existing == text) {
            merged.push(text.to_string());
        }
    }
    merged
}

/// Parses a Markdown document. Without a front-matter header the whole text
/// is the body and every metadata field is empty.
pub fn parse_markdown_document(raw: &str) -> Result<SourceDocument, EngineError> {
    let (header, body) = match front_matter_pattern().and_then(|pattern| pattern.captures(raw)) {
        Some(captures) => (
            captures.get(1).map(|found| found.as_str()).unwrap_or_default(),
            captures.get(2).map(|found| found.as_str()).unwrap_or_default(),
        ),
        None => ("", raw),
    };

    let front_matter = if header.trim().is_empty() {
        FrontMatter::default()
    } else {
        serde_yaml::from_str::<FrontMatter>(header)
            .map_err(|error| EngineError::Source(format!("invalid front matter: {error}")))?
    };

    let publication_date = match front_matter.pub_date.as_ref().and_then(yaml_scalar_text) {
        Some(raw_date) => {
            let parsed = parse_publication_date(&raw_date);
            if parsed.is_none() {
                tracing::warn!(pub_date = raw_date.as_str(), "unparseable publication date ignored");
            }
            parsed
        }
        None => None,
    };

    Ok(SourceDocument {
        source_url: front_matter
            .url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        publication_date,
        raw_content: body.trim().to_string(),
        summary: front_matter.summary.unwrap_or_default().trim().to_string(),
        keywords: merge_keywords(&front_matter.keywords, &front_matter.entities),
    })
}

pub fn read_markdown_document(path: &Path) -> Result<SourceDocument, EngineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| EngineError::Source(format!("failed to read {}: {error}", path.display())))?;
    parse_markdown_document(&raw)
        .map_err(|error| EngineError::Source(format!("{}: {error}", path.display())))
}

/// Markdown files directly inside `directory`, sorted by path.
pub fn markdown_files_in(directory: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let entries = std::fs::read_dir(directory).map_err(|error| {
        EngineError::Source(format!("failed to list {}: {error}", directory.display()))
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|error| {
                EngineError::Source(format!("failed to list {}: {error}", directory.display()))
            })?
            .path();
        let is_markdown = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(MARKDOWN_EXTENSION));
        if path.is_file() && is_markdown {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ANKARA_NEWS: &str = "---\nurl: https://news.example/ankara-census\npub_date: 2024-03-01\nsummary: Ankara population reached 5.8 million.\nkeywords: [Ankara, census]\nentities:\n  - value: Ankara\n  - value: Turkey\n  - TurkStat\n---\nThe census office reported 5.8 million residents.\n";

    #[test]
    fn functional_front_matter_fields_are_mapped() {
        let document = parse_markdown_document(ANKARA_NEWS).expect("parse");
        assert_eq!(
            document.source_url.as_deref(),
            Some("https://news.example/ankara-census")
        );
        assert_eq!(document.publication_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(document.summary, "Ankara population reached 5.8 million.");
        assert_eq!(document.keywords, vec!["Ankara", "census", "Turkey", "TurkStat"]);
        assert_eq!(
            document.raw_content,
            "The census office reported 5.8 million residents."
        );
    }

    #[test]
    fn unit_publication_date_accepts_common_shapes() {
        assert_eq!(
            parse_publication_date("2024-03-01T10:00:00Z"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            parse_publication_date("2024-03-01 10:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_publication_date("March 2024"), None);
    }

    #[test]
    fn regression_bad_dates_and_missing_urls_do_not_fail_parsing() {
        let document =
            parse_markdown_document("---\npub_date: someday\nsummary: s\n---\nbody").expect("parse");
        assert_eq!(document.publication_date, None);
        assert_eq!(document.source_url, None);
        assert_eq!(document.raw_content, "body");
    }

    #[test]
    fn regression_document_without_header_parses_with_empty_metadata() {
        let document = parse_markdown_document("  plain notes\nwith no header\n").expect("parse");
        assert_eq!(document.source_url, None);
        assert!(document.summary.is_empty());
        assert!(document.keywords.is_empty());
        assert_eq!(document.raw_content, "plain notes\nwith no header");
    }

    #[test]
    fn regression_invalid_header_is_a_source_error() {
        assert!(matches!(
            parse_markdown_document("---\nkeywords: [unclosed\n---\nbody"),
            Err(EngineError::Source(_))
        ));
    }

    #[test]
    fn functional_directory_listing_is_sorted_and_markdown_only() {
        let directory = tempdir().expect("tempdir");
        for name in ["b.md", "a.md", "notes.txt"] {
            std::fs::write(directory.path().join(name), ANKARA_NEWS).expect("write fixture");
        }
        let files = markdown_files_in(directory.path()).expect("list");
        let names = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }
}
