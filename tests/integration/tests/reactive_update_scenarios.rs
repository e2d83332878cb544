mod support;

use serde_json::json;

use factline_core::{FactId, MergeDecision, QueryId};
use factline_engine::{QueryOutcome, SkipReason};

use support::{create_spec, document, harness, list_block, reuse_spec, Harness};

const POPULATION_PROMPT: &str = "Provide the population of Ankara.";
const CENSUS_BODY_2024: &str = "The 2024 census counted 5.6 million residents in Ankara.";
const CENSUS_BODY_2025: &str = "The 2025 census counted 5.8 million residents in Ankara.";

fn ingest_census_2024(h: &mut Harness) {
    h.engine
        .ingest_document(&document(
            "https://news.example/ankara-2024",
            "Ankara population is 5.6 million.",
            &["Ankara", "population"],
            CENSUS_BODY_2024,
        ))
        .expect("ingest 2024 census");
}

fn population_plan(h: &Harness, spec: factline_core::PlaceholderSpec) {
    h.gateway.push_plan(
        vec![list_block("population", "Population: {population}", "Population unknown.")],
        vec![spec],
    );
}

/// Creates the population Fact through one query, then links a sibling query to it.
fn two_queries_sharing_population_fact(h: &mut Harness, language: &str) -> (QueryOutcome, QueryOutcome) {
    h.gateway
        .push_decomposition("en", &[(POPULATION_PROMPT, &["Ankara", "population"])]);
    population_plan(h, create_spec("population", POPULATION_PROMPT, &["Ankara", "population"]));
    let first = h
        .engine
        .submit_query("Population of Ankara?")
        .expect("first query");
    let fact_id = first.placeholders[0].fact_id;

    h.gateway
        .push_decomposition(language, &[(POPULATION_PROMPT, &["Ankara"])]);
    population_plan(h, reuse_spec("population", fact_id));
    let second = h
        .engine
        .submit_query("How many people live in Ankara?")
        .expect("sibling query");
    assert_eq!(second.placeholders[0].fact_id, fact_id);
    (first, second)
}

fn answer_of(h: &Harness, query_id: QueryId) -> String {
    h.engine
        .query(query_id)
        .expect("query")
        .final_answer
        .unwrap_or_default()
}

#[test]
fn integration_update_cascades_only_to_subscribed_queries() {
    let mut h = harness();
    ingest_census_2024(&mut h);
    h.gateway
        .push_extraction(false, json!([{"population": "5.6 million"}]));
    let (subscribed, muted) = two_queries_sharing_population_fact(&mut h, "en");
    let fact_id = subscribed.placeholders[0].fact_id;
    assert_eq!(subscribed.answer, "Population: 5.6 million");
    assert_eq!(muted.answer, "Population: 5.6 million");
    h.engine
        .set_subscription(muted.query_id, false)
        .expect("unsubscribe sibling");
    let cursor = h.engine.answers_since(0, 100).expect("feed").next_cursor;

    h.gateway.push_merge(MergeDecision::Update {
        data: json!([{"population": "5.8 million"}]),
        is_translatable: false,
    });
    let report = h
        .engine
        .ingest_document(&document(
            "https://news.example/ankara-2025",
            "Ankara population is 5.8 million.",
            &["Ankara", "population"],
            CENSUS_BODY_2025,
        ))
        .expect("ingest 2025 census");

    assert_eq!(report.updated_facts, vec![fact_id]);
    assert_eq!(report.evaluations.len(), 1);
    assert_eq!(report.evaluations[0].decision, "update");
    assert_eq!(report.refreshed_answers.len(), 1);
    assert_eq!(report.refreshed_answers[0].query_id, subscribed.query_id);
    assert!(report.failed_refreshes.is_empty());

    let merges = h.gateway.merge_requests();
    assert_eq!(merges, vec![(POPULATION_PROMPT.to_string(), vec![CENSUS_BODY_2025.to_string()])]);
    assert_eq!(answer_of(&h, subscribed.query_id), "Population: 5.8 million");
    assert_eq!(answer_of(&h, muted.query_id), "Population: 5.6 million");

    let fact = h.engine.fact(fact_id).expect("load").expect("fact exists");
    assert_eq!(fact.update_count, 1);

    let feed = h.engine.answers_since(cursor, 100).expect("feed");
    assert_eq!(feed.updates.len(), 1);
    assert_eq!(feed.updates[0].query_id, subscribed.query_id);
    assert_eq!(feed.updates[0].answer, "Population: 5.8 million");
}

#[test]
fn integration_no_change_merge_touches_no_answer() {
    let mut h = harness();
    ingest_census_2024(&mut h);
    h.gateway
        .push_extraction(false, json!([{"population": "5.6 million"}]));
    let (first, second) = two_queries_sharing_population_fact(&mut h, "en");
    let fact_id = first.placeholders[0].fact_id;
    let before = h.engine.fact(fact_id).expect("load").expect("fact exists");
    let cursor = h.engine.answers_since(0, 100).expect("feed").next_cursor;

    h.gateway.push_merge(MergeDecision::NoChange);
    let report = h
        .engine
        .ingest_document(&document(
            "https://news.example/ankara-paraphrase",
            "Ankara is home to roughly 5.6 million people.",
            &["Ankara", "population"],
            "Around 5.6 million people call Ankara home.",
        ))
        .expect("ingest paraphrase");

    assert!(report.updated_facts.is_empty());
    assert_eq!(report.evaluations.len(), 1);
    assert_eq!(report.evaluations[0].decision, "no_change");
    assert!(report.refreshed_answers.is_empty());
    let after = h.engine.fact(fact_id).expect("load").expect("fact exists");
    assert_eq!(after.content, before.content);
    assert_eq!(after.update_count, 0);
    assert!(h.engine.answers_since(cursor, 100).expect("feed").updates.is_empty());
    assert_eq!(
        h.engine.query(second.query_id).expect("query").answer_revision,
        second.answer_revision
    );
}

#[test]
fn integration_failed_merge_leaves_fact_untouched() {
    let mut h = harness();
    ingest_census_2024(&mut h);
    h.gateway
        .push_extraction(false, json!([{"population": "5.6 million"}]));
    let (first, _) = two_queries_sharing_population_fact(&mut h, "en");
    let fact_id = first.placeholders[0].fact_id;

    let report = h
        .engine
        .ingest_document(&document(
            "https://news.example/ankara-2025",
            "Ankara population is 5.8 million.",
            &["Ankara", "population"],
            CENSUS_BODY_2025,
        ))
        .expect("ingest with exhausted merge queue");

    assert_eq!(report.evaluations[0].decision, "error");
    assert!(report.updated_facts.is_empty());
    let fact = h.engine.fact(fact_id).expect("load").expect("fact exists");
    assert_eq!(fact.update_count, 0);
    assert!(report.document_id.is_some());
}

#[test]
fn integration_update_discards_cached_translations_and_retranslates() {
    let mut h = harness();
    ingest_census_2024(&mut h);
    h.gateway
        .push_extraction(true, json!([{"population": "5.6 million"}]));
    h.gateway
        .push_translation(json!([{"population": "5,6 milyon"}]));
    let (english, turkish) = two_queries_sharing_population_fact(&mut h, "tr");
    let fact_id = english.placeholders[0].fact_id;
    assert_eq!(turkish.answer, "Population: 5,6 milyon");
    let cached = h.engine.fact(fact_id).expect("load").expect("fact exists");
    assert_eq!(cached.content.languages().collect::<Vec<_>>(), vec!["en", "tr"]);

    h.gateway.push_merge(MergeDecision::Update {
        data: json!([{"population": "5.8 million"}]),
        is_translatable: true,
    });
    h.gateway
        .push_translation(json!([{"population": "5,8 milyon"}]));
    let report = h
        .engine
        .ingest_document(&document(
            "https://news.example/ankara-2025",
            "Ankara population is 5.8 million.",
            &["Ankara", "population"],
            CENSUS_BODY_2025,
        ))
        .expect("ingest 2025 census");

    assert_eq!(report.refreshed_answers.len(), 2);
    assert_eq!(answer_of(&h, english.query_id), "Population: 5.8 million");
    assert_eq!(answer_of(&h, turkish.query_id), "Population: 5,8 milyon");
    assert_eq!(h.gateway.translate_count(), 2);
    let fact = h.engine.fact(fact_id).expect("load").expect("fact exists");
    assert_eq!(fact.content.languages().collect::<Vec<_>>(), vec!["en", "tr"]);
    assert_eq!(fact.content.base_value(), Some(&json!([{"population": "5.8 million"}])));
}

#[test]
fn regression_duplicate_and_urlless_documents_are_skipped() {
    let mut h = harness();
    ingest_census_2024(&mut h);
    let duplicate = h
        .engine
        .ingest_document(&document(
            "https://news.example/ankara-2024",
            "different summary",
            &[],
            "different body",
        ))
        .expect("duplicate ingest");
    assert_eq!(duplicate.skipped, Some(SkipReason::AlreadyIngested));

    let mut urlless = document("", "summary", &["Ankara"], "body");
    urlless.source_url = Some("   ".to_string());
    let report = h.engine.ingest_document(&urlless).expect("urlless ingest");
    assert_eq!(report.skipped, Some(SkipReason::MissingUrl));

    let snapshot = h.engine.snapshot().expect("snapshot");
    assert_eq!(snapshot.store.documents.len(), 1);
    assert!(h.gateway.requests().is_empty());
}

#[test]
fn integration_directory_ingestion_reports_per_file_outcomes() {
    let mut h = harness();
    let directory = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        directory.path().join("01-census.md"),
        "---\nurl: https://news.example/census\npub_date: 2024-03-01\nsummary: Ankara population is 5.6 million.\nkeywords: [Ankara]\nentities:\n  - value: TurkStat\n---\nThe census counted 5.6 million residents.\n",
    )
    .expect("write census");
    std::fs::write(
        directory.path().join("02-broken.md"),
        "---\nurl: https://news.example/broken\nkeywords: [unclosed\n---\nbody\n",
    )
    .expect("write broken");
    std::fs::write(
        directory.path().join("03-capital.md"),
        "---\nurl: https://news.example/capital\nsummary: Ankara is the capital of Turkey.\nkeywords: [Ankara, Turkey]\n---\nAnkara became the capital in 1923.\n",
    )
    .expect("write capital");
    std::fs::write(directory.path().join("04-plain.md"), "Notes without any header.\n")
        .expect("write plain");
    std::fs::write(directory.path().join("notes.txt"), "ignored").expect("write notes");

    let outcomes = h.engine.ingest_path(directory.path()).expect("ingest directory");
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].report.as_ref().is_some_and(|report| report.document_id.is_some()));
    assert!(outcomes[1].report.is_none());
    assert!(outcomes[1].path.ends_with("02-broken.md"));
    assert!(outcomes[1]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("invalid front matter")));
    assert!(outcomes[2].report.is_some());
    assert!(outcomes[3].path.ends_with("04-plain.md"));
    assert_eq!(
        outcomes[3].report.as_ref().and_then(|report| report.skipped),
        Some(SkipReason::MissingUrl)
    );

    let snapshot = h.engine.snapshot().expect("snapshot");
    assert_eq!(snapshot.store.documents.len(), 2);
    assert_eq!(snapshot.index.documents, 6);
    assert!(h
        .embedder
        .embedded_texts()
        .iter()
        .any(|text| text == "TurkStat"));

    let again = h.engine.ingest_path(directory.path()).expect("re-ingest");
    assert_eq!(
        again[0].report.as_ref().and_then(|report| report.skipped),
        Some(SkipReason::AlreadyIngested)
    );
}

#[test]
fn regression_cascade_skips_facts_not_linked_to_any_query() {
    let mut h = harness();
    ingest_census_2024(&mut h);
    h.gateway
        .push_extraction(false, json!([{"population": "5.6 million"}]));
    let (first, second) = two_queries_sharing_population_fact(&mut h, "en");
    let fact_id: FactId = first.placeholders[0].fact_id;

    h.gateway.push_decomposition("en", &[("Provide the capital city of Turkey.", &["Turkey"])]);
    h.gateway.push_plan(
        vec![list_block("capital", "{city}", "-")],
        vec![create_spec("capital", "Provide the capital city of Turkey.", &["Turkey"])],
    );
    h.engine
        .edit_query(first.query_id, "Capital of Turkey?")
        .expect("edit away from population");
    h.engine
        .set_subscription(second.query_id, false)
        .expect("unsubscribe");

    h.gateway.push_merge(MergeDecision::Update {
        data: json!([{"population": "5.8 million"}]),
        is_translatable: false,
    });
    let report = h
        .engine
        .ingest_document(&document(
            "https://news.example/ankara-2025",
            "Ankara population is 5.8 million.",
            &["Ankara", "population"],
            CENSUS_BODY_2025,
        ))
        .expect("ingest 2025 census");

    assert!(report.updated_facts.contains(&fact_id));
    assert!(report.refreshed_answers.is_empty());
}
