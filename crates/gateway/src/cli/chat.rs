//! `pangea-chat chat` — interactive REPL command.
//!
//! Signs in, prints the transcript rebuilt from the audit log, then runs
//! one turn per input line. Slash-commands adjust the per-session toggles
//! and inspect the last turn.

use std::sync::Arc;

use pc_domain::config::Config;
use pc_domain::guard::Detector;

use super::login;
use super::render;
use crate::bootstrap;
use crate::runtime::{reload_history, submit, ChatSession, NotStarted, TurnOutcome};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>) -> anyhow::Result<()> {
    // 1. Wire collaborators and sign in.
    let state = bootstrap::build_app_state(config)?;
    let session = login::open_session(&state).await?;

    // 2. Initialize rustyline editor with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".pangea-chat")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // 3. Welcome, then the reconstructed transcript.
    let snapshot = session.snapshot();
    eprintln!("Pangea Chat");
    eprintln!(
        "Signed in as {}  |  Type /help for commands, Ctrl+D to exit",
        snapshot.username().unwrap_or_default()
    );
    render::print_transcript(&snapshot.transcript);
    if let Some(notice) = &snapshot.notice {
        render::print_notice(notice);
    }
    eprintln!("{}", render::quota_line(&snapshot.rate_limit));
    eprintln!();

    // 4. REPL loop.
    loop {
        let readline = rl.readline("you> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(&line).ok();

                // ── Slash commands ────────────────────────────────
                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &state, &session).await {
                        break;
                    }
                    continue;
                }

                // ── User prompt → turn ───────────────────────────
                if !send_prompt(&state, &session, trimmed).await {
                    break;
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                break;
            }
            Err(e) => {
                render::print_error(format!("readline: {e}"));
                break;
            }
        }
    }

    // 5. Save history.
    rl.save_history(&history_path).ok();

    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
async fn handle_slash_command(input: &str, state: &AppState, session: &ChatSession) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

    match cmd {
        "/exit" | "/quit" => return true,

        "/logout" => {
            session.sign_out(false);
            eprintln!("Signed out.");
            return true;
        }

        "/clear" => {
            session.clear_transcript();
            // ANSI escape: clear screen and move cursor to top-left.
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/history" => match reload_history(state, session).await {
            Ok(_) => {
                let snapshot = session.snapshot();
                render::print_transcript(&snapshot.transcript);
                if let Some(notice) = &snapshot.notice {
                    render::print_notice(notice);
                }
            }
            Err(e) => {
                render::print_error(&e);
                return !session.snapshot().is_signed_in();
            }
        },

        "/system" => match arg {
            Some(text) => {
                session.set_system_prompt(text);
                eprintln!("System prompt set.");
            }
            None => {
                eprintln!("System prompt: {}", session.snapshot().toggles.system_prompt);
                eprintln!("Usage: /system <text>");
            }
        },

        "/detector" => match arg.and_then(parse_detector_arg) {
            Some(Ok((detector, enabled))) => {
                session.set_detector(detector, enabled);
                eprintln!("{detector} {}", render::on_off(enabled));
            }
            Some(Err(e)) => render::print_error(e),
            None => {
                let toggles = session.snapshot().toggles.detectors;
                for detector in Detector::ALL {
                    eprintln!(
                        "  {:<20} {}",
                        detector.as_str(),
                        render::on_off(toggles.is_enabled(detector))
                    );
                }
                eprintln!("Usage: /detector <name> on|off");
            }
        },

        "/authz" => match arg.and_then(parse_switch) {
            Some(enabled) => {
                session.set_authz(enabled);
                eprintln!("Document authorization {}", render::on_off(enabled));
            }
            None => eprintln!("Usage: /authz on|off"),
        },

        "/kb" => match arg.and_then(parse_switch) {
            Some(enabled) => {
                session.set_knowledge_base(enabled);
                if enabled && state.retriever.is_none() {
                    eprintln!("No knowledge base is configured; retrieval stays off.");
                } else {
                    eprintln!("Knowledge base {}", render::on_off(enabled));
                }
            }
            None => eprintln!("Usage: /kb on|off"),
        },

        "/status" => render::print_status(&session.snapshot()),

        "/inspect" => render::print_inspection(&session.snapshot()),

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /system <text>          Set the system prompt");
            eprintln!("  /detector <name> on|off Toggle a guard detector");
            eprintln!("  /authz on|off           Filter documents by authorization");
            eprintln!("  /kb on|off              Use the knowledge base");
            eprintln!("  /status                 Quota, toggles and phase");
            eprintln!("  /inspect                Last turn's guard verdicts and documents");
            eprintln!("  /history                Reload the transcript from the audit log");
            eprintln!("  /clear                  Clear the screen and local transcript");
            eprintln!("  /logout                 Sign out and exit");
            eprintln!("  /exit, /quit            Exit the chat");
            eprintln!("  /help                   Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

fn parse_switch(arg: &str) -> Option<bool> {
    match arg.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// `<name> on|off`. `None` when no argument was given at all.
fn parse_detector_arg(arg: &str) -> Option<Result<(Detector, bool), String>> {
    let mut words = arg.split_whitespace();
    let name = words.next()?;
    let detector = match name.parse::<Detector>() {
        Ok(d) => d,
        Err(e) => return Some(Err(e)),
    };
    let switch = words.next().and_then(parse_switch);
    Some(switch.map(|on| (detector, on)).ok_or_else(|| "expected on or off".to_owned()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn and print its result. Returns `false` once the session
/// is no longer signed in.
async fn send_prompt(state: &AppState, session: &ChatSession, prompt: &str) -> bool {
    let report = submit(state, session, prompt).await;
    let snapshot = session.snapshot();

    if let Some(v) = &snapshot.inspection.input_guard {
        if v.detected() {
            render::print_guard_summary("input", v);
        }
    }

    match &report.outcome {
        TurnOutcome::Completed { response, notices } => {
            if let Some(v) = &snapshot.inspection.output_guard {
                if v.detected() {
                    render::print_guard_summary("output", v);
                }
            }
            println!("{response}");
            for notice in notices {
                render::print_error(notice);
            }
        }
        TurnOutcome::Halted { reason } => eprintln!("\x1B[33m{}\x1B[0m", reason.message()),
        TurnOutcome::Failed { failure } => render::print_error(failure),
        TurnOutcome::NotStarted { reason } => match reason {
            NotStarted::Busy => eprintln!("A turn is already in progress."),
            NotStarted::SignedOut => eprintln!("Not signed in."),
            NotStarted::EmptyPrompt => {}
        },
        TurnOutcome::Abandoned => eprintln!("Turn abandoned."),
    }

    snapshot.is_signed_in()
}
