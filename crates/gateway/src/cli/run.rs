//! `pangea-chat run` — one-shot execution command.
//!
//! Signs in, sends a single prompt through the pipeline, prints the
//! displayed response to stdout and exits. Useful for scripting and
//! piping.

use std::sync::Arc;

use pc_domain::config::Config;

use super::{login, render};
use crate::bootstrap;
use crate::runtime::{submit, TurnOutcome};

/// Entry point for `pangea-chat run "message"`. Returns whether the turn
/// completed.
pub async fn run(config: Arc<Config>, message: String, json_output: bool) -> anyhow::Result<bool> {
    // 1. Wire collaborators and sign in.
    let state = bootstrap::build_app_state(config)?;
    let session = login::open_session(&state).await?;

    // 2. Run the turn.
    let report = submit(&state, &session, &message).await;
    let completed = matches!(report.outcome, TurnOutcome::Completed { .. });

    // 3. Print.
    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &report.outcome {
            TurnOutcome::Completed { response, notices } => {
                println!("{response}");
                for notice in notices {
                    render::print_error(notice);
                }
            }
            TurnOutcome::Halted { reason } => eprintln!("{}", reason.message()),
            TurnOutcome::Failed { failure } => render::print_error(failure),
            TurnOutcome::NotStarted { reason } => {
                render::print_error(format!("turn not started: {reason:?}"))
            }
            TurnOutcome::Abandoned => render::print_error("turn abandoned"),
        }
    }

    Ok(completed)
}
