mod support;

use std::collections::BTreeMap;

use serde_json::json;

use factline_core::{FactId, FactStatus, Query};
use factline_engine::{AnswerAssembler, EngineError, Resolution};
use factline_store::{facts, links, queries};

use support::{create_spec, document, harness, list_block, paragraph, reuse_spec, Harness};

const CAPITAL_PROMPT: &str = "Provide the capital city of Turkey.";

fn submit_capital_query(h: &mut Harness) -> factline_engine::QueryOutcome {
    h.gateway
        .push_decomposition("en", &[(CAPITAL_PROMPT, &["Turkey"])]);
    h.gateway.push_plan(
        vec![
            paragraph("Turkey's capital:"),
            list_block("capital", "{city}", "Capital unknown."),
        ],
        vec![create_spec("capital", CAPITAL_PROMPT, &["Turkey", "capital"])],
    );
    h.engine
        .submit_query("Capital of Turkey?")
        .expect("submit capital query")
}

#[test]
fn integration_capital_of_turkey_creates_and_links_new_fact() {
    let mut h = harness();
    let report = h
        .engine
        .ingest_document(&document(
            "https://news.example/turkey",
            "Ankara is the capital city of Turkey.",
            &["Ankara", "Turkey"],
            "Ankara has been the capital of Turkey since 1923.",
        ))
        .expect("ingest background document");
    assert!(report.evaluations.is_empty());

    h.gateway.push_extraction(false, json!([{"city": "Ankara"}]));
    let outcome = submit_capital_query(&mut h);

    assert_eq!(outcome.answer, "Turkey's capital:\nAnkara");
    assert_eq!(outcome.language, "en");
    assert_eq!(outcome.placeholders.len(), 1);
    assert_eq!(outcome.placeholders[0].resolution, Resolution::Created);
    let fact_id = outcome.placeholders[0].fact_id;
    let fact = h.engine.fact(fact_id).expect("load").expect("fact exists");
    assert_eq!(fact.prompt, CAPITAL_PROMPT);
    assert_eq!(fact.status, FactStatus::Fulfilled);
    assert_eq!(fact.content.base_value(), Some(&json!([{"city": "Ankara"}])));

    let candidates = h
        .gateway
        .last_orchestration_candidates()
        .expect("orchestration request");
    assert_eq!(candidates.get(CAPITAL_PROMPT).map(Vec::len), Some(0));
    let extracts = h.gateway.extract_requests();
    assert_eq!(extracts.len(), 1);
    assert!(extracts[0].1.iter().any(|chunk| chunk == "Turkey"));

    let feed = h.engine.answers_since(0, 10).expect("feed");
    assert_eq!(feed.updates.len(), 1);
    assert_eq!(feed.updates[0].answer, outcome.answer);
    assert_eq!(feed.next_cursor, outcome.answer_revision);

    let snapshot = h.engine.snapshot().expect("snapshot");
    assert_eq!(snapshot.index.facts, 3);
    assert_eq!(snapshot.index.documents, 3);
    assert_eq!(snapshot.store.links.len(), 1);
}

#[test]
fn integration_missing_context_stores_not_found_without_extraction() {
    let mut h = harness();
    let outcome = submit_capital_query(&mut h);

    assert_eq!(outcome.answer, "Turkey's capital:\nCapital unknown.");
    assert!(h.gateway.extract_requests().is_empty());
    let fact = h
        .engine
        .fact(outcome.placeholders[0].fact_id)
        .expect("load")
        .expect("fact exists");
    assert_eq!(fact.content.base_value(), Some(&json!({"error": "not_found"})));
}

#[test]
fn integration_confirmed_similarity_reuses_existing_fact() {
    let mut h = harness();
    h.embedder
        .pin_pair("Name the capital of Turkey.", CAPITAL_PROMPT, 0.9);
    let first = submit_capital_query(&mut h);
    let existing = first.placeholders[0].fact_id;

    h.gateway
        .push_decomposition("en", &[("Name the capital of Turkey.", &[])]);
    h.gateway.push_plan(
        vec![list_block("capital", "{city}", "Capital unknown.")],
        vec![reuse_spec("capital", existing)],
    );
    let second = h
        .engine
        .submit_query("Which city is Turkey's capital?")
        .expect("reuse query");

    let candidates = h
        .gateway
        .last_orchestration_candidates()
        .expect("orchestration request");
    let strong = &candidates["Name the capital of Turkey."];
    assert_eq!(strong.len(), 1);
    assert_eq!(strong[0].fact_id, existing);
    assert!(strong[0].similarity >= 0.85);
    assert_eq!(second.placeholders[0].fact_id, existing);
    assert_eq!(second.placeholders[0].resolution, Resolution::Reused);
    assert_eq!(h.engine.snapshot().expect("snapshot").store.facts.len(), 1);
}

#[test]
fn integration_create_for_confirmed_prompt_does_not_duplicate() {
    let mut h = harness();
    h.embedder
        .pin_pair("Name the capital of Turkey.", CAPITAL_PROMPT, 0.9);
    let first = submit_capital_query(&mut h);

    h.gateway
        .push_decomposition("en", &[("Name the capital of Turkey.", &[])]);
    h.gateway.push_plan(
        vec![list_block("capital", "{city}", "Capital unknown.")],
        vec![create_spec("capital", "Name the capital of Turkey.", &[])],
    );
    let second = h
        .engine
        .submit_query("Which city is Turkey's capital?")
        .expect("create query");

    assert_eq!(second.placeholders[0].fact_id, first.placeholders[0].fact_id);
    assert_eq!(second.placeholders[0].resolution, Resolution::Reused);
    assert_eq!(h.engine.snapshot().expect("snapshot").store.facts.len(), 1);
}

#[test]
fn integration_below_threshold_creates_distinct_fact() {
    let mut h = harness();
    h.embedder
        .pin_pair("Name the capital of Turkey.", CAPITAL_PROMPT, 0.8);
    let first = submit_capital_query(&mut h);

    h.gateway
        .push_decomposition("en", &[("Name the capital of Turkey.", &[])]);
    h.gateway.push_plan(
        vec![list_block("capital", "{city}", "Capital unknown.")],
        vec![create_spec("capital", "Name the capital of Turkey.", &[])],
    );
    let second = h
        .engine
        .submit_query("Which city is Turkey's capital?")
        .expect("create query");

    let candidates = h
        .gateway
        .last_orchestration_candidates()
        .expect("orchestration request");
    assert!(candidates["Name the capital of Turkey."].is_empty());
    let created = second.placeholders[0].fact_id;
    assert_ne!(created, first.placeholders[0].fact_id);
    assert_eq!(second.placeholders[0].resolution, Resolution::Created);
    let fact = h.engine.fact(created).expect("load").expect("fact exists");
    assert_eq!(fact.prompt, "Name the capital of Turkey.");
}

#[test]
fn integration_placeholder_without_link_renders_block_empty_message() {
    let mut h = harness();
    h.gateway
        .push_decomposition("en", &[(CAPITAL_PROMPT, &["Turkey"])]);
    h.gateway.push_plan(
        vec![
            list_block("p1", "{city}", "Nothing for p1."),
            list_block("p2", "{city}", "Nothing for p2."),
        ],
        vec![create_spec("p2", CAPITAL_PROMPT, &["Turkey"])],
    );
    let outcome = h.engine.submit_query("Capital?").expect("submit");

    assert_eq!(outcome.answer, "Nothing for p1.\nNothing for p2.");
    let query_links = links::links_for_query(h.engine.store().connection(), outcome.query_id)
        .expect("links");
    assert_eq!(query_links.len(), 1);
    assert_eq!(query_links[0].placeholder, "p2");
}

#[test]
fn regression_empty_decomposition_rolls_back() {
    let mut h = harness();
    h.gateway.push_decomposition("en", &[]);
    assert!(matches!(
        h.engine.submit_query("???"),
        Err(EngineError::DecompositionFailure)
    ));
    assert!(matches!(
        h.engine.submit_query("gateway queue is empty"),
        Err(EngineError::DecompositionFailure)
    ));
    assert!(h.engine.snapshot().expect("snapshot").store.queries.is_empty());
}

#[test]
fn regression_empty_orchestration_rolls_back_every_write() {
    let mut h = harness();
    h.gateway
        .push_decomposition("en", &[(CAPITAL_PROMPT, &["Turkey"])]);
    h.gateway
        .push_plan(vec![paragraph("No placeholders here.")], Vec::new());
    let error = h.engine.submit_query("Capital?").expect_err("empty specs");
    assert!(matches!(
        error,
        EngineError::OrchestrationFailure {
            missing: "specification list"
        }
    ));

    h.gateway
        .push_decomposition("en", &[(CAPITAL_PROMPT, &["Turkey"])]);
    let error = h
        .engine
        .submit_query("Capital?")
        .expect_err("orchestration call failed");
    assert!(matches!(
        error,
        EngineError::OrchestrationFailure {
            missing: "render plan"
        }
    ));

    let snapshot = h.engine.snapshot().expect("snapshot");
    assert!(snapshot.store.queries.is_empty());
    assert!(snapshot.store.facts.is_empty());
    assert!(snapshot.store.links.is_empty());
    assert_eq!(snapshot.store.answer_revision, 0);
}

#[test]
fn regression_invalid_reuse_rolls_back_facts_created_earlier_in_the_plan() {
    let mut h = harness();
    let first = submit_capital_query(&mut h);
    let unrelated = first.placeholders[0].fact_id;

    h.gateway
        .push_decomposition("en", &[("Provide the population of Ankara.", &["Ankara"])]);
    h.gateway.push_plan(
        vec![
            list_block("population", "{value}", "-"),
            list_block("capital", "{city}", "-"),
        ],
        vec![
            create_spec("population", "Provide the population of Ankara.", &["Ankara"]),
            reuse_spec("capital", unrelated),
        ],
    );
    let error = h.engine.submit_query("Ankara facts").expect_err("unconfirmed");
    assert!(matches!(
        error,
        EngineError::UnconfirmedReuse { ref placeholder, fact_id }
            if placeholder == "capital" && fact_id == unrelated
    ));

    h.gateway
        .push_decomposition("en", &[("Provide the population of Ankara.", &["Ankara"])]);
    h.gateway.push_plan(
        vec![list_block("capital", "{city}", "-")],
        vec![reuse_spec("capital", FactId(999))],
    );
    assert!(matches!(
        h.engine.submit_query("Ankara facts"),
        Err(EngineError::UnknownFact { .. })
    ));

    let snapshot = h.engine.snapshot().expect("snapshot");
    assert_eq!(snapshot.store.facts.len(), 1);
    assert_eq!(snapshot.store.queries.len(), 1);
    assert_eq!(snapshot.index.facts, 3);
}

#[test]
fn integration_assemble_twice_is_byte_identical() {
    let mut h = harness();
    h.gateway
        .push_decomposition("en", &[(CAPITAL_PROMPT, &["Turkey"])]);
    h.gateway.push_plan(
        vec![
            paragraph("Facts:"),
            list_block("capital", "{city} ({country})", "none"),
            json!({"type": "table", "placeholder": "capital"}),
        ],
        vec![create_spec("capital", CAPITAL_PROMPT, &["Turkey"])],
    );
    let outcome = h.engine.submit_query("Capital?").expect("submit");

    let connection = h.engine.store().connection();
    let query: Query = queries::load_query(connection, outcome.query_id)
        .expect("load")
        .expect("query exists");
    let query_links = links::links_for_query(connection, outcome.query_id).expect("links");
    let mut linked = BTreeMap::new();
    for link in &query_links {
        let fact = facts::load_fact(connection, link.fact_id)
            .expect("load")
            .expect("fact exists");
        linked.insert(fact.id, fact);
    }
    let assembler = AnswerAssembler::new(h.gateway.as_ref(), h.engine.config());
    let first = assembler.assemble(&query, &query_links, &mut linked);
    let second = assembler.assemble(&query, &query_links, &mut linked);

    assert_eq!(first.text.as_bytes(), second.text.as_bytes());
    assert_eq!(first.text, outcome.answer);
    assert_eq!(
        first.text,
        "Facts:\nnone\n[unsupported block type: table]"
    );
}

#[test]
fn integration_edit_relinks_and_sweep_deactivates_orphaned_fact() {
    let mut h = harness();
    let first = submit_capital_query(&mut h);
    let capital_fact = first.placeholders[0].fact_id;

    h.gateway
        .push_decomposition("en", &[("Provide the population of Ankara.", &["Ankara"])]);
    h.gateway.push_plan(
        vec![list_block("population", "{value}", "Population unknown.")],
        vec![create_spec("population", "Provide the population of Ankara.", &["Ankara"])],
    );
    let edited = h
        .engine
        .edit_query(first.query_id, "Population of Ankara?")
        .expect("edit");

    assert_eq!(edited.query_id, first.query_id);
    assert!(edited.answer_revision > first.answer_revision);
    assert_eq!(edited.answer, "Population unknown.");
    let query = h.engine.query(first.query_id).expect("query");
    assert_eq!(query.text, "Population of Ankara?");
    let linked = h.engine.facts_for_query(first.query_id).expect("linked facts");
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].0, "population");

    let sweep = h.engine.deactivate_unlinked_facts().expect("sweep");
    assert_eq!(sweep.deactivated, vec![capital_fact]);

    let reused = submit_capital_query(&mut h);
    assert_eq!(reused.placeholders[0].fact_id, capital_fact);
    let fact = h.engine.fact(capital_fact).expect("load").expect("fact exists");
    assert_eq!(fact.status, FactStatus::Fulfilled);
}

#[test]
fn regression_editing_missing_query_fails_without_gateway_calls() {
    let mut h = harness();
    assert!(matches!(
        h.engine.edit_query(factline_core::QueryId(41), "anything"),
        Err(EngineError::QueryNotFound(_))
    ));
    assert!(matches!(
        h.engine.set_subscription(factline_core::QueryId(41), false),
        Err(EngineError::QueryNotFound(_))
    ));
    assert!(h.gateway.requests().is_empty());
}
