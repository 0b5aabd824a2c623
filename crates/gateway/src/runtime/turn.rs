//! The turn pipeline.
//!
//! A turn walks these stages strictly in order, each one a suspending call
//! to a collaborator:
//!
//! ```text
//! LoggingPrompt → RateCheck → InputGuard → Retrieving → Authorizing
//!   → AwaitingCompletion → OutputGuard → Unredacting → Idle
//! ```
//!
//! Every stage converts its own failure into a [`TurnOutcome`]: a policy
//! [`HaltReason`], a [`TurnFailure`], or a silent degrade (retrieval and
//! authorization). Transcript entries are appended as each stage completes
//! and stay visible whatever happens later in the turn.

use chrono::Utc;
use serde::Serialize;
use tracing::Instrument;

use pc_domain::document::Document;
use pc_domain::error::Error;
use pc_domain::guard::{ActionTaken, Detector, GuardPayload, GuardResult};
use pc_domain::message::{last_with_role, Role};
use pc_domain::principal::Principal;
use pc_domain::trace::TraceEvent;
use pc_domain::transcript::{message_hash, ChatMessage, MessageType};
use pc_pangea::{AuditEvent, GuardRequest};
use pc_providers::ChatRequest;

use super::documents::{authorize_documents, retrieve_documents};
use super::prompt::assemble_llm_input;
use super::session::{ChatSession, Notice, SessionState, SessionToggles, TurnInspection, TurnPhase};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A deliberate stop. Not an error: whatever the turn already appended
/// stays in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    PromptTooLong { chars: usize, max: usize },
    DailyLimitExceeded,
    SuspiciousPrompt { detectors: Vec<Detector> },
    /// The input recipe blocked the prompt outright.
    Blocked,
    /// The output guard blocked the completion or flagged it with a
    /// halting detector. The completion is never shown.
    ResponseWithheld { detectors: Vec<Detector> },
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaltReason::PromptTooLong { .. } => "prompt_too_long",
            HaltReason::DailyLimitExceeded => "daily_limit_exceeded",
            HaltReason::SuspiciousPrompt { .. } => "suspicious_prompt",
            HaltReason::Blocked => "blocked",
            HaltReason::ResponseWithheld { .. } => "response_withheld",
        }
    }

    pub fn message(&self) -> String {
        match self {
            HaltReason::PromptTooLong { chars, max } => {
                format!("Prompt exceeds the {max} character limit ({chars} characters)")
            }
            HaltReason::DailyLimitExceeded => "Daily limit exceeded".into(),
            HaltReason::SuspiciousPrompt { detectors } => {
                let names: Vec<&str> = detectors.iter().map(|d| d.as_str()).collect();
                format!("Processing halted: suspicious prompt ({})", names.join(", "))
            }
            HaltReason::Blocked => "Processing halted: prompt blocked by the input guard".into(),
            HaltReason::ResponseWithheld { detectors } if detectors.is_empty() => {
                "Response withheld: blocked by the output guard".into()
            }
            HaltReason::ResponseWithheld { detectors } => {
                let names: Vec<&str> = detectors.iter().map(|d| d.as_str()).collect();
                format!("Response withheld: flagged by the output guard ({})", names.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnFailure {
    /// The principal's credential was rejected; the session is signed out.
    #[error("Session expired, please log in again")]
    SessionExpired { stage: TurnPhase },
    #[error("{} failed, please try again", .stage.label())]
    Transient { stage: TurnPhase, message: String },
}

/// Why a submission never entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotStarted {
    Busy,
    SignedOut,
    EmptyPrompt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// `response` is what the user is shown. `notices` name non-fatal
    /// problems (output guard or unredact failures).
    Completed { response: String, notices: Vec<String> },
    Halted { reason: HaltReason },
    Failed { failure: TurnFailure },
    NotStarted { reason: NotStarted },
    /// The session signed out while the turn was in flight.
    Abandoned,
}

/// A turn's outcome plus the transcript entries it appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReport {
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    pub entries: Vec<ChatMessage>,
}

impl TurnReport {
    fn bare(outcome: TurnOutcome) -> Self {
        Self {
            outcome,
            entries: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn for `user_prompt` on behalf of the session's principal.
///
/// Refuses without any network call when the session is busy or signed
/// out, the prompt is empty or too long, or the local quota is spent.
pub async fn submit(state: &AppState, session: &ChatSession, user_prompt: &str) -> TurnReport {
    let Ok(_permit) = session.lock().try_acquire() else {
        return TurnReport::bare(TurnOutcome::NotStarted {
            reason: NotStarted::Busy,
        });
    };

    let snapshot = session.snapshot();
    let Some(principal) = snapshot.principal.clone() else {
        return TurnReport::bare(TurnOutcome::NotStarted {
            reason: NotStarted::SignedOut,
        });
    };
    if user_prompt.trim().is_empty() {
        return TurnReport::bare(TurnOutcome::NotStarted {
            reason: NotStarted::EmptyPrompt,
        });
    }

    // ── local gates ──────────────────────────────────────────────────
    let max = state.config.chat.prompt_max_chars;
    let chars = snapshot.toggles.system_prompt.chars().count() + user_prompt.chars().count();
    if chars > max {
        return refuse(session, &principal, HaltReason::PromptTooLong { chars, max });
    }
    if state.rate_limiter.permits(&snapshot.rate_limit).is_err() {
        return refuse(session, &principal, HaltReason::DailyLimitExceeded);
    }

    let span = tracing::info_span!("turn", username = %principal.username);
    let turn = Turn {
        state,
        session,
        epoch: snapshot.epoch,
        toggles: snapshot.toggles,
        principal,
        entries: Vec::new(),
        inspection: TurnInspection::default(),
        notices: Vec::new(),
    };
    turn.run(user_prompt).instrument(span).await
}

/// Halt before the pipeline starts.
fn refuse(session: &ChatSession, principal: &Principal, reason: HaltReason) -> TurnReport {
    TraceEvent::TurnHalted {
        username: principal.username.clone(),
        reason: reason.as_str().into(),
    }
    .emit();
    let notice = Notice::halt(reason.message());
    session.update(|cur| SessionState {
        notice: Some(notice),
        ..cur.clone()
    });
    TurnReport::bare(TurnOutcome::Halted { reason })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Stop {
    Halt(HaltReason),
    Fail(TurnPhase, Error),
    Abandoned,
}

struct Turn<'a> {
    state: &'a AppState,
    session: &'a ChatSession,
    epoch: u64,
    toggles: SessionToggles,
    principal: Principal,
    entries: Vec<ChatMessage>,
    inspection: TurnInspection,
    notices: Vec<String>,
}

impl Turn<'_> {
    async fn run(mut self, prompt: &str) -> TurnReport {
        match self.pipeline(prompt).await {
            Ok(response) => {
                let notice = (!self.notices.is_empty())
                    .then(|| Notice::error(self.notices.join("; ")));
                let outcome = TurnOutcome::Completed {
                    response,
                    notices: self.notices.clone(),
                };
                self.finish(outcome, notice)
            }
            Err(Stop::Halt(reason)) => {
                TraceEvent::TurnHalted {
                    username: self.principal.username.clone(),
                    reason: reason.as_str().into(),
                }
                .emit();
                let notice = Notice::halt(reason.message());
                self.finish(TurnOutcome::Halted { reason }, Some(notice))
            }
            Err(Stop::Fail(stage, e)) => {
                let expired = e.is_auth();
                TraceEvent::TurnFailed {
                    username: self.principal.username.clone(),
                    stage: stage.as_str().into(),
                    session_expired: expired,
                }
                .emit();
                if expired {
                    tracing::warn!(stage = %stage, error = %e, "credential rejected, signing out");
                    if self.session.snapshot().epoch == self.epoch {
                        self.session.sign_out(true);
                    }
                    return TurnReport {
                        outcome: TurnOutcome::Failed {
                            failure: TurnFailure::SessionExpired { stage },
                        },
                        entries: self.entries,
                    };
                }
                tracing::warn!(stage = %stage, error = %e, "turn failed");
                let failure = TurnFailure::Transient {
                    stage,
                    message: e.to_string(),
                };
                let notice = Notice::error(failure.to_string());
                self.finish(TurnOutcome::Failed { failure }, Some(notice))
            }
            Err(Stop::Abandoned) => {
                tracing::info!("session changed during turn, abandoning");
                TurnReport {
                    outcome: TurnOutcome::Abandoned,
                    entries: self.entries,
                }
            }
        }
    }

    async fn pipeline(&mut self, prompt: &str) -> Result<String, Stop> {
        let state = self.state;
        let credential = self.principal.credential.clone();
        let username = self.principal.username.clone();

        // ── 1. log the prompt ────────────────────────────────────────
        self.enter(TurnPhase::LoggingPrompt)?;
        let event = AuditEvent::new(MessageType::UserPrompt, &username).with_input(prompt);
        let hash = state
            .audit
            .log(&credential, event.clone())
            .await
            .map_err(|e| Stop::Fail(TurnPhase::LoggingPrompt, e))?;
        self.append(message_from_event(hash, &event));

        // ── 2. quota ─────────────────────────────────────────────────
        if !self.principal.is_exempt {
            self.enter(TurnPhase::RateCheck)?;
            let fresh = state
                .rate_limiter
                .current(state.audit.as_ref(), &self.principal)
                .await
                .map_err(|e| Stop::Fail(TurnPhase::RateCheck, e))?;
            // The log may know of usage this session never saw.
            self.session.update_in(self.epoch, |cur| {
                let lower = match (fresh.remaining(), cur.rate_limit.remaining()) {
                    (Some(logged), Some(local)) => logged < local,
                    _ => false,
                };
                SessionState {
                    rate_limit: if lower { fresh } else { cur.rate_limit },
                    ..cur.clone()
                }
            });
            if fresh.is_exhausted() {
                return Err(Stop::Halt(HaltReason::DailyLimitExceeded));
            }
        }

        // ── 3. input guard ───────────────────────────────────────────
        self.enter(TurnPhase::InputGuard)?;
        let recipe = state.config.guard.input_recipe.clone();
        let request = GuardRequest::text(&recipe, prompt)
            .with_overrides(self.toggles.detectors.overrides());
        let verdict = state
            .guard
            .guard(&credential, request)
            .await
            .map_err(|e| Stop::Fail(TurnPhase::InputGuard, e))?;
        self.record_guard("input", &recipe, prompt, &verdict).await;
        self.inspection.input_guard = Some(verdict.clone());

        let halting = verdict.halting_detections(&self.toggles.detectors);
        if !halting.is_empty() {
            return Err(Stop::Halt(HaltReason::SuspiciousPrompt { detectors: halting }));
        }
        if verdict.blocked() {
            return Err(Stop::Halt(HaltReason::Blocked));
        }
        let guarded_prompt = guarded_text(&verdict, prompt);
        let fpe_context = verdict.fpe_context().map(str::to_owned);

        // ── 4. document context ──────────────────────────────────────
        let documents = self.gather_documents(&guarded_prompt).await?;

        // ── 5. completion ────────────────────────────────────────────
        self.enter(TurnPhase::AwaitingCompletion)?;
        let messages = assemble_llm_input(
            &self.toggles.system_prompt,
            &guarded_prompt,
            &documents,
            &self.principal.profile,
        );
        let llm_cfg = &state.config.llm;
        let request = ChatRequest {
            messages,
            temperature: llm_cfg.temperature,
            max_tokens: llm_cfg.max_tokens,
            model: llm_cfg.default_model.clone(),
        };
        let completion = state
            .llm
            .chat(&credential, &request)
            .await
            .map_err(|e| Stop::Fail(TurnPhase::AwaitingCompletion, e))?;
        self.session.update_in(self.epoch, |cur| SessionState {
            rate_limit: cur.rate_limit.decremented(),
            ..cur.clone()
        });

        // ── 6. output guard ──────────────────────────────────────────
        self.enter(TurnPhase::OutputGuard)?;
        let recipe = state.config.guard.output_recipe.clone();
        let request = GuardRequest::text(&recipe, &completion.content)
            .with_overrides(self.toggles.detectors.overrides());
        let (mut shown, output_verdict) = match state.guard.guard(&credential, request).await {
            Ok(v) if v.blocked() || !v.halting_detections(&self.toggles.detectors).is_empty() => {
                let detectors = v.halting_detections(&self.toggles.detectors);
                self.record_guard("output", &recipe, &completion.content, &v).await;
                self.inspection.output_guard = Some(v);
                return Err(Stop::Halt(HaltReason::ResponseWithheld { detectors }));
            }
            Ok(v) => (guarded_text(&v, &completion.content), Some(v)),
            Err(e) if e.is_auth() => return Err(Stop::Fail(TurnPhase::OutputGuard, e)),
            Err(e) => {
                tracing::warn!(error = %e, "output guard failed, showing unguarded response");
                self.notices.push(format!("Output guard failed: {e}"));
                (completion.content.clone(), None)
            }
        };

        // ── 7. unredact ──────────────────────────────────────────────
        if let Some(ctx) = fpe_context {
            self.enter(TurnPhase::Unredacting)?;
            match state.unredactor.unredact(&credential, &shown, &ctx).await {
                Ok(restored) => shown = restored,
                Err(e) => {
                    tracing::warn!(error = %e, "unredact failed, showing redacted response");
                    self.notices
                        .push("Unredact failed, showing the redacted response".into());
                }
            }
        }

        // ── 8. record the response, then the output verdict ──────────
        let context = serde_json::json!({
            "system_prompt": self.toggles.system_prompt,
            "model": completion.model,
            "documents": documents.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
        });
        let event = AuditEvent::new(MessageType::LlmResponse, &username)
            .with_input(prompt)
            .with_output(&shown)
            .with_context(context.to_string());
        let hash = self.log_best_effort(&event).await;
        self.append(message_from_event(hash, &event));

        if let Some(v) = output_verdict {
            self.record_guard("output", &recipe, &completion.content, &v).await;
            self.inspection.output_guard = Some(v);
        }

        Ok(shown)
    }

    async fn gather_documents(&mut self, query: &str) -> Result<Vec<Document>, Stop> {
        let state = self.state;
        let Some(retriever) = state
            .retriever
            .as_ref()
            .filter(|_| self.toggles.knowledge_base)
        else {
            return Ok(Vec::new());
        };

        self.enter(TurnPhase::Retrieving)?;
        let candidates = retrieve_documents(retriever.as_ref(), &self.principal, query).await;
        let retrieved = candidates.len();

        let documents = if self.toggles.authz && !candidates.is_empty() {
            self.enter(TurnPhase::Authorizing)?;
            let (kept, decisions) =
                authorize_documents(state.authz.as_ref(), &self.principal, candidates).await;
            self.inspection.authz = decisions;
            kept
        } else {
            candidates
        };

        TraceEvent::DocumentsFiltered {
            retrieved,
            allowed: documents.len(),
        }
        .emit();
        self.inspection.retrieved = retrieved;
        self.inspection.documents = documents.clone();
        Ok(documents)
    }

    // ── state helpers ────────────────────────────────────────────────

    fn enter(&self, phase: TurnPhase) -> Result<(), Stop> {
        let current = self.session.update_in(self.epoch, |cur| SessionState {
            phase,
            ..cur.clone()
        });
        if !current {
            return Err(Stop::Abandoned);
        }
        TraceEvent::TurnStage {
            username: self.principal.username.clone(),
            stage: phase.as_str().into(),
        }
        .emit();
        Ok(())
    }

    fn append(&mut self, message: ChatMessage) {
        self.entries.push(message.clone());
        self.session.update_in(self.epoch, |cur| {
            let mut transcript = cur.transcript.clone();
            transcript.push(message);
            SessionState {
                transcript,
                ..cur.clone()
            }
        });
    }

    fn finish(self, outcome: TurnOutcome, notice: Option<Notice>) -> TurnReport {
        let inspection = self.inspection;
        self.session.update_in(self.epoch, |cur| SessionState {
            phase: TurnPhase::Idle,
            notice,
            inspection,
            ..cur.clone()
        });
        TurnReport {
            outcome,
            entries: self.entries,
        }
    }

    /// Log a guard verdict and append its transcript entry.
    async fn record_guard(&mut self, side: &str, recipe: &str, text: &str, verdict: &GuardResult) {
        let detections = verdict.detections();
        TraceEvent::GuardVerdict {
            side: side.into(),
            schema: verdict.schema_name().into(),
            detected: detections.iter().map(|d| d.as_str().to_owned()).collect(),
            redacted: verdict.action_taken() == ActionTaken::Redact,
            blocked: verdict.blocked(),
        }
        .emit();

        let context = serde_json::json!({
            "side": side,
            "recipe": recipe,
            "schema": verdict.schema_name(),
        });
        let event = AuditEvent::new(verdict.transcript_kind(), &self.principal.username)
            .with_input(text)
            .with_findings(verdict.findings_json())
            .with_context(context.to_string());
        let hash = self.log_best_effort(&event).await;
        self.append(message_from_event(hash, &event));
    }

    /// Append to the audit log, falling back to a local hash on failure.
    async fn log_best_effort(&self, event: &AuditEvent) -> String {
        match self
            .state
            .audit
            .log(&self.principal.credential, event.clone())
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(kind = %event.kind, error = %e, "audit append failed");
                let content = serde_json::to_string(event).unwrap_or_default();
                message_hash(&content, Utc::now())
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The transcript entry for a logged event. Built from the same fields a
/// history reload reads back.
fn message_from_event(hash: String, event: &AuditEvent) -> ChatMessage {
    ChatMessage {
        hash,
        kind: event.kind.clone(),
        input: event.input.clone(),
        output: event.output.clone(),
        findings: event.findings.clone(),
        context: event.context.clone(),
    }
}

/// Text that continues downstream of a guard: its rewrite when it made
/// one, else the original.
fn guarded_text(verdict: &GuardResult, original: &str) -> String {
    match verdict.payload() {
        Some(GuardPayload::Text(text)) => text,
        Some(GuardPayload::Messages(messages)) => last_with_role(&messages, Role::User)
            .or_else(|| last_with_role(&messages, Role::Assistant))
            .unwrap_or(original)
            .to_owned(),
        None => original.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_domain::guard::{GuardV1, GuardV2};
    use pc_domain::message::Message;

    #[test]
    fn transient_failure_names_the_stage() {
        let failure = TurnFailure::Transient {
            stage: TurnPhase::AwaitingCompletion,
            message: "HTTP: connection refused".into(),
        };
        assert_eq!(failure.to_string(), "LLM call failed, please try again");
    }

    #[test]
    fn halt_messages() {
        assert_eq!(HaltReason::DailyLimitExceeded.message(), "Daily limit exceeded");
        let reason = HaltReason::SuspiciousPrompt {
            detectors: vec![Detector::PromptInjection],
        };
        assert!(reason.message().contains("suspicious prompt (prompt_injection)"));

        let withheld = HaltReason::ResponseWithheld {
            detectors: vec![Detector::MaliciousEntity],
        };
        assert_eq!(withheld.as_str(), "response_withheld");
        assert!(withheld.message().contains("output guard (malicious_entity)"));
        let blocked = HaltReason::ResponseWithheld { detectors: vec![] };
        assert_eq!(blocked.message(), "Response withheld: blocked by the output guard");
    }

    #[test]
    fn guarded_text_prefers_rewrite() {
        let v1 = GuardResult::V1(GuardV1 {
            redacted_prompt: Some("my email is <EMAIL>".into()),
            ..Default::default()
        });
        assert_eq!(guarded_text(&v1, "my email is a@b.c"), "my email is <EMAIL>");

        let v2 = GuardResult::V2(GuardV2 {
            prompt_messages: Some(vec![Message::system("s"), Message::user("u'")]),
            ..Default::default()
        });
        assert_eq!(guarded_text(&v2, "u"), "u'");

        let clean = GuardResult::V2(GuardV2::default());
        assert_eq!(guarded_text(&clean, "as is"), "as is");
    }

    #[test]
    fn outcome_serializes_flat() {
        let report = TurnReport::bare(TurnOutcome::Halted {
            reason: HaltReason::DailyLimitExceeded,
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "halted");
        assert_eq!(json["reason"]["kind"], "daily_limit_exceeded");
        assert_eq!(json["entries"], serde_json::json!([]));
    }
}
