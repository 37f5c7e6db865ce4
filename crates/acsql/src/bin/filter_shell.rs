//! Interactive shell: type a filter to see its store query, or a
//! backslash command for the other operations.
//!
//! Usage: `filter_shell [config.toml]`. Logging follows `RUST_LOG`.

use acsql::{
    Compiler, CompilerConfig, Error,
    core::{
        expr::Expr,
        obs::metrics_report,
        store::{Collection, StoreQuery},
    },
    covers, minimize, parse, union_diff,
};
use rustyline::{DefaultEditor, error::ReadlineError};
use std::{env, path::Path, process::ExitCode};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
<filter>                 compile for the current collection
\\collection <name>       switch collection
\\min <filter>            minimize, preserving NULL
\\bool <filter>           minimize in a filter position
\\json <filter>           JSON array form
\\covers <e1> ; <e2>      whether e1 matches every row of e2
\\diff <e1> ; <e2>        union and difference
\\metrics                 counters since start
\\quit";

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => match CompilerConfig::load(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => CompilerConfig::default(),
    };

    match run(&Compiler::new(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(compiler: &Compiler) -> Result<(), ReadlineError> {
    let mut editor = DefaultEditor::new()?;
    let mut collection = Collection::Devices;
    println!("acsql {} (\\help for commands)", acsql::VERSION);

    loop {
        let line = match editor.readline(&format!("{collection}> ")) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        let (command, rest) = match line.strip_prefix('\\') {
            Some(command) => command.split_once(' ').unwrap_or((command, "")),
            None => ("", line),
        };

        let output = match command {
            "quit" | "q" => return Ok(()),
            "help" | "h" => Ok(HELP.to_string()),
            "collection" => match Collection::from_name(rest.trim()) {
                Some(next) => {
                    collection = next;
                    Ok(format!("collection: {collection}"))
                }
                None => Ok(format!("unknown collection '{}'", rest.trim())),
            },
            "" => compile(compiler, rest, collection),
            other => execute(other, rest),
        };

        match output {
            Ok(text) => println!("{text}"),
            Err(err) => println!("error[{}/{}]: {err}", err.kind, err.origin),
        }
    }
}

fn compile(compiler: &Compiler, text: &str, collection: Collection) -> Result<String, Error> {
    Ok(match compiler.compile(text, collection)? {
        StoreQuery::NeverMatches => "never matches".to_string(),
        StoreQuery::Filter(doc) => pretty(&doc),
    })
}

fn execute(command: &str, rest: &str) -> Result<String, Error> {
    match command {
        "min" => Ok(minimize(&parse(rest)?, false)?.to_string()),
        "bool" => Ok(minimize(&parse(rest)?, true)?.to_string()),
        "json" => Ok(parse(rest)?.to_json().to_string()),
        "covers" => {
            let (e1, e2) = pair(rest)?;
            Ok(covers(&e1, &e2)?.to_string())
        }
        "diff" => {
            let (e1, e2) = pair(rest)?;
            let (union, diff) = union_diff(&e1, &e2)?;
            Ok(format!("union: {union}\ndiff:  {diff}"))
        }
        "metrics" => Ok(serde_json::to_value(metrics_report())
            .map(|report| pretty(&report))
            .unwrap_or_default()),
        other => Ok(format!("unknown command '\\{other}'")),
    }
}

fn pair(text: &str) -> Result<(Expr, Expr), Error> {
    let (first, second) = text.split_once(';').unwrap_or((text, ""));

    Ok((parse(first)?, parse(second)?))
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
