//! Terminal rendering of transcript entries, notices and session status.
//!
//! Chat text goes to stdout; guard findings, notices and status go to
//! stderr so `run` output can be piped.

use pc_domain::guard::GuardResult;
use pc_domain::quota::RateLimitState;
use pc_domain::transcript::{ChatMessage, MessageType};

use crate::runtime::{Notice, NoticeKind, SessionState};

const DIM: &str = "\x1B[2m";
const RED: &str = "\x1B[31m";
const YELLOW: &str = "\x1B[33m";
const RESET: &str = "\x1B[0m";

pub fn print_transcript(transcript: &[ChatMessage]) {
    for entry in transcript {
        print_entry(entry);
    }
}

pub fn print_entry(entry: &ChatMessage) {
    match &entry.kind {
        MessageType::UserPrompt => println!("you> {}", entry.display_text()),
        MessageType::LlmResponse => println!("assistant> {}", entry.display_text()),
        kind => eprintln!("{DIM}[{kind}] {}{RESET}", entry.display_text()),
    }
}

pub fn print_notice(notice: &Notice) {
    match notice.kind {
        NoticeKind::Error => eprintln!("{RED}error: {}{RESET}", notice.message),
        NoticeKind::Halt => eprintln!("{YELLOW}{}{RESET}", notice.message),
        NoticeKind::Info => eprintln!("{}", notice.message),
    }
}

pub fn print_error(message: impl std::fmt::Display) {
    eprintln!("{RED}error: {message}{RESET}");
}

/// One-line verdict summary for a guard side.
pub fn guard_summary(side: &str, verdict: &GuardResult) -> String {
    let detections: Vec<&str> = verdict.detections().iter().map(|d| d.as_str()).collect();
    let detected = if detections.is_empty() {
        "nothing detected".to_owned()
    } else {
        format!("detected {}", detections.join(", "))
    };
    format!(
        "[{side} guard, {}] {detected}, action {:?}",
        verdict.schema_name(),
        verdict.action_taken()
    )
}

pub fn print_guard_summary(side: &str, verdict: &GuardResult) {
    eprintln!("{DIM}{}{RESET}", guard_summary(side, verdict));
}

pub fn quota_line(rate: &RateLimitState) -> String {
    match rate {
        RateLimitState::Unlimited => "messages remaining today: unlimited".into(),
        RateLimitState::Limited { remaining, quota } => {
            format!("messages remaining today: {remaining} of {quota}")
        }
    }
}

pub fn print_status(state: &SessionState) {
    let user = state.username().unwrap_or("(signed out)");
    eprintln!("user:           {user}");
    eprintln!("{}", quota_line(&state.rate_limit));
    eprintln!("phase:          {}", state.phase);
    eprintln!("system prompt:  {}", state.toggles.system_prompt);
    eprintln!("authz filter:   {}", on_off(state.toggles.authz));
    eprintln!("knowledge base: {}", on_off(state.toggles.knowledge_base));
    eprintln!("detectors:");
    for detector in pc_domain::guard::Detector::ALL {
        eprintln!(
            "  {:<20} {}",
            detector.as_str(),
            on_off(state.toggles.detectors.is_enabled(detector))
        );
    }
}

pub fn print_inspection(state: &SessionState) {
    let inspection = &state.inspection;
    match &inspection.input_guard {
        Some(v) => eprintln!("{}", guard_summary("input", v)),
        None => eprintln!("[input guard] not run"),
    }
    match &inspection.output_guard {
        Some(v) => eprintln!("{}", guard_summary("output", v)),
        None => eprintln!("[output guard] not run"),
    }
    eprintln!(
        "documents: {} retrieved, {} used",
        inspection.retrieved,
        inspection.documents.len()
    );
    for doc in &inspection.documents {
        eprintln!("  {}", doc.id);
    }
    for decision in &inspection.authz {
        let verdict = if decision.allowed { "allowed" } else { "denied" };
        match &decision.error {
            Some(err) => eprintln!("  authz {} {verdict} ({err})", decision.document_id),
            None => eprintln!("  authz {} {verdict}", decision.document_id),
        }
    }
}

pub fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
