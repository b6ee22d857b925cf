mod backup;
mod calc;
mod config;
mod dataset;
mod db;
mod error;
mod ipc;
mod model;
mod relations;
mod table;

use serde_json::json;
use std::io::{self, BufRead, Write};

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("GRADEBOOKD_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn startup_store() -> Option<db::Store> {
    let settings = match config::Settings::from_env() {
        Ok(Some(s)) => s,
        Ok(None) => {
            tracing::info!("no file configuration in environment, waiting for workspace.select");
            return None;
        }
        Err(e) => {
            tracing::error!("{e:#}");
            return None;
        }
    };
    match db::open_store(settings) {
        Ok(store) => {
            tracing::info!(
                students = %store.settings().students_file.display(),
                grades = %store.settings().grades_file.display(),
                "store opened from environment"
            );
            Some(store)
        }
        Err(e) => {
            tracing::error!(code = e.code(), "failed to open store: {e}");
            None
        }
    }
}

fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("{e}");
    }

    let mut state = ipc::AppState {
        workspace: None,
        store: startup_store(),
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!("bad request line: {e}");
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
