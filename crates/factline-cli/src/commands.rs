use std::io::Write;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;

use factline_core::QueryId;
use factline_engine::FactEngine;

use crate::bootstrap::{build_engine, state_path};
use crate::cli_args::{Cli, CliCommand, QueryIdArg};
use crate::state::{load_state, save_state, write_text_atomic, CliState};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value).context("failed to encode output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{encoded}").context("failed to write output")?;
    Ok(())
}

fn resolve_query_id(cli: &Cli, arg: &QueryIdArg) -> Result<QueryId> {
    if let Some(id) = arg.id {
        return Ok(QueryId(id));
    }
    let path = state_path(cli);
    match load_state(&path)?.last_query_id {
        Some(id) => Ok(QueryId(id)),
        None => bail!("no --id given and no query has been submitted yet"),
    }
}

fn remember_query(cli: &Cli, query_id: QueryId) -> Result<()> {
    save_state(
        &state_path(cli),
        &CliState {
            last_query_id: Some(query_id.get()),
        },
    )
}

fn show_query(engine: &FactEngine, query_id: QueryId) -> Result<()> {
    let query = engine.query(query_id)?;
    let facts = engine
        .facts_for_query(query_id)?
        .into_iter()
        .map(|(placeholder, fact)| json!({"placeholder": placeholder, "fact": fact}))
        .collect::<Vec<_>>();
    print_json(&json!({"query": query, "facts": facts}))
}

pub(crate) fn run(cli: &Cli) -> Result<()> {
    if let CliCommand::Reset { yes: false } = cli.command {
        bail!("reset deletes every record; pass --yes to confirm");
    }
    let mut engine = build_engine(cli)?;

    match &cli.command {
        CliCommand::Query { text } => {
            let outcome = engine.submit_query(text).context("query failed")?;
            remember_query(cli, outcome.query_id)?;
            print_json(&outcome)
        }
        CliCommand::Edit { id, text } => {
            let outcome = engine.edit_query(QueryId(*id), text).context("edit failed")?;
            remember_query(cli, outcome.query_id)?;
            print_json(&outcome)
        }
        CliCommand::Subscribe(arg) | CliCommand::Unsubscribe(arg) => {
            let subscribed = matches!(cli.command, CliCommand::Subscribe(_));
            let query_id = resolve_query_id(cli, arg)?;
            engine.set_subscription(query_id, subscribed)?;
            print_json(&json!({"query_id": query_id, "subscribed": subscribed}))
        }
        CliCommand::Show(arg) => show_query(&engine, resolve_query_id(cli, arg)?),
        CliCommand::Ingest { paths } => {
            let mut outcomes = Vec::new();
            for path in paths {
                outcomes.extend(
                    engine
                        .ingest_path(path)
                        .with_context(|| format!("failed to ingest {}", path.display()))?,
                );
            }
            print_json(&outcomes)
        }
        CliCommand::Poll { cursor, limit } => print_json(&engine.answers_since(*cursor, *limit)?),
        CliCommand::Sweep => print_json(&engine.deactivate_unlinked_facts()?),
        CliCommand::Dump { output } => {
            let snapshot = engine.snapshot()?;
            match output {
                Some(path) => {
                    let encoded =
                        serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?;
                    write_text_atomic(path, &encoded)?;
                    tracing::info!(path = %path.display(), "snapshot written");
                    Ok(())
                }
                None => print_json(&snapshot),
            }
        }
        CliCommand::Reset { .. } => {
            engine.reset()?;
            save_state(&state_path(cli), &CliState::default())?;
            print_json(&json!({"reset": true}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_for(directory: &std::path::Path, args: &[&str]) -> Cli {
        let database = directory.join("db.sqlite");
        let mut argv = vec![
            "factline".to_string(),
            "--database".to_string(),
            database.display().to_string(),
        ];
        argv.extend(args.iter().map(|arg| arg.to_string()));
        let mut cli = Cli::try_parse_from(argv).expect("parse");
        cli.api_key = None;
        cli
    }

    #[test]
    fn functional_query_id_falls_back_to_saved_state() {
        let directory = tempfile::tempdir().expect("tempdir");
        let cli = cli_for(directory.path(), &["subscribe"]);
        assert!(resolve_query_id(&cli, &QueryIdArg { id: None }).is_err());

        remember_query(&cli, QueryId(12)).expect("remember");
        assert_eq!(
            resolve_query_id(&cli, &QueryIdArg { id: None }).expect("resolve"),
            QueryId(12)
        );
        assert_eq!(
            resolve_query_id(&cli, &QueryIdArg { id: Some(3) }).expect("resolve"),
            QueryId(3)
        );
    }

    #[test]
    fn regression_reset_requires_confirmation() {
        let directory = tempfile::tempdir().expect("tempdir");
        let cli = cli_for(directory.path(), &["reset"]);
        let error = run(&cli).expect_err("unconfirmed reset");
        assert!(error.to_string().contains("--yes"));
        assert!(!directory.path().join("db.sqlite").exists());
    }

    #[test]
    fn functional_dump_writes_snapshot_file() {
        let directory = tempfile::tempdir().expect("tempdir");
        let output = directory.path().join("dump.json");
        let cli = cli_for(
            directory.path(),
            &["dump", "--output", output.to_str().expect("utf8 path")],
        );
        run(&cli).expect("dump");
        let raw = std::fs::read_to_string(&output).expect("read dump");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["answer_revision"], 0);
        assert_eq!(value["index"]["facts"], 0);
    }
}
