#![no_main]

use libfuzzer_sys::fuzz_target;

use factline_engine::parse_markdown_document;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(document) = parse_markdown_document(&raw) {
        assert!(document
            .source_url
            .as_deref()
            .map_or(true, |url| !url.trim().is_empty()));
        assert!(document
            .keywords
            .iter()
            .all(|keyword| !keyword.is_empty() && keyword.trim() == keyword));
        let mut deduped = document.keywords.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), document.keywords.len());
    }
});
