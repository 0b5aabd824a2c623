//! Session-scoped state container.
//!
//! [`ChatSession`] owns one [`SessionState`] behind a `tokio::sync::watch`
//! channel. Every mutation computes a complete new value from the current
//! one and swaps it in, so observers (`subscribe`) only ever see whole
//! states. Front ends read with [`ChatSession::snapshot`] and change the
//! per-session toggles through the setters here; the turn pipeline and the
//! history loader are the only other writers.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

use pc_domain::config::Config;
use pc_domain::document::{AuthzDecision, Document};
use pc_domain::guard::{Detector, DetectorToggles, GuardResult};
use pc_domain::principal::Principal;
use pc_domain::quota::RateLimitState;
use pc_domain::transcript::ChatMessage;

use super::session_lock::TurnLock;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the session is in its current turn. Anything but `Idle` means
/// the front end must not accept a new submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    LoadingHistory,
    LoggingPrompt,
    RateCheck,
    InputGuard,
    Retrieving,
    Authorizing,
    AwaitingCompletion,
    OutputGuard,
    Unredacting,
}

impl TurnPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::LoadingHistory => "loading_history",
            TurnPhase::LoggingPrompt => "logging_prompt",
            TurnPhase::RateCheck => "rate_check",
            TurnPhase::InputGuard => "input_guard",
            TurnPhase::Retrieving => "retrieving",
            TurnPhase::Authorizing => "authorizing",
            TurnPhase::AwaitingCompletion => "awaiting_completion",
            TurnPhase::OutputGuard => "output_guard",
            TurnPhase::Unredacting => "unredacting",
        }
    }

    /// Short label for "X failed, please try again".
    pub fn label(self) -> &'static str {
        match self {
            TurnPhase::Idle => "Session",
            TurnPhase::LoadingHistory => "Loading history",
            TurnPhase::LoggingPrompt => "Audit log",
            TurnPhase::RateCheck => "Rate limit check",
            TurnPhase::InputGuard => "Input guard",
            TurnPhase::Retrieving => "Retrieval",
            TurnPhase::Authorizing => "Authorization",
            TurnPhase::AwaitingCompletion => "LLM call",
            TurnPhase::OutputGuard => "Output guard",
            TurnPhase::Unredacting => "Unredact",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State pieces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A turn stopped on purpose (quota, detection, size).
    Halt,
    Error,
    Info,
}

/// Dismissible banner shown above the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn halt(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Halt,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }
}

/// User-adjustable settings applied to the next turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionToggles {
    pub system_prompt: String,
    pub detectors: DetectorToggles,
    pub authz: bool,
    pub knowledge_base: bool,
}

impl SessionToggles {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.chat.system_prompt.clone(),
            detectors: config.guard.detectors,
            authz: config.authz.enabled,
            knowledge_base: config.retrieval.enabled,
        }
    }
}

/// What the last turn saw: guard verdicts and the document context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnInspection {
    pub input_guard: Option<GuardResult>,
    pub output_guard: Option<GuardResult>,
    /// Candidates returned by retrieval, before filtering.
    pub retrieved: usize,
    /// Documents that made it into the prompt, in retrieval order.
    pub documents: Vec<Document>,
    pub authz: Vec<AuthzDecision>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub principal: Option<Principal>,
    /// Bumped on every sign-in and sign-out. Work started under an older
    /// epoch is discarded.
    pub epoch: u64,
    pub transcript: Vec<ChatMessage>,
    pub rate_limit: RateLimitState,
    pub phase: TurnPhase,
    pub notice: Option<Notice>,
    /// Set when a credential was rejected mid-session.
    pub login_required: bool,
    pub toggles: SessionToggles,
    pub inspection: TurnInspection,
}

impl SessionState {
    pub fn new(toggles: SessionToggles) -> Self {
        Self {
            principal: None,
            epoch: 0,
            transcript: Vec::new(),
            rate_limit: RateLimitState::Unlimited,
            phase: TurnPhase::Idle,
            notice: None,
            login_required: false,
            toggles,
            inspection: TurnInspection::default(),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    pub fn is_signed_in(&self) -> bool {
        self.principal.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.username.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatSession
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ChatSession {
    state: watch::Sender<SessionState>,
    lock: TurnLock,
}

impl ChatSession {
    pub fn new(toggles: SessionToggles) -> Self {
        let (state, _) = watch::channel(SessionState::new(toggles));
        Self {
            state,
            lock: TurnLock::new(),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub(crate) fn lock(&self) -> &TurnLock {
        &self.lock
    }

    /// Replace the state with `f(current)`.
    pub(crate) fn update(&self, f: impl FnOnce(&SessionState) -> SessionState) {
        self.state.send_modify(|cur| {
            let next = f(cur);
            *cur = next;
        });
    }

    /// Like [`update`](Self::update), but only while the session is still
    /// in `epoch`. Returns whether the update was applied.
    pub(crate) fn update_in(
        &self,
        epoch: u64,
        f: impl FnOnce(&SessionState) -> SessionState,
    ) -> bool {
        self.state.send_if_modified(|cur| {
            if cur.epoch != epoch {
                return false;
            }
            let next = f(cur);
            *cur = next;
            true
        })
    }

    /// Drop the principal and the transcript view. In-flight work from the
    /// previous epoch is abandoned.
    ///
    /// `expired` marks a forced sign-out after a rejected credential.
    pub fn sign_out(&self, expired: bool) {
        self.update(|cur| SessionState {
            principal: None,
            epoch: cur.epoch + 1,
            transcript: Vec::new(),
            rate_limit: RateLimitState::Unlimited,
            phase: TurnPhase::Idle,
            notice: expired.then(|| Notice::error("Session expired, please log in again")),
            login_required: expired,
            toggles: cur.toggles.clone(),
            inspection: TurnInspection::default(),
        });
    }

    // ── toggles ──────────────────────────────────────────────────────

    pub fn set_system_prompt(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|cur| SessionState {
            toggles: SessionToggles {
                system_prompt: text,
                ..cur.toggles.clone()
            },
            ..cur.clone()
        });
    }

    pub fn set_detector(&self, detector: Detector, enabled: bool) {
        self.update(|cur| SessionState {
            toggles: SessionToggles {
                detectors: cur.toggles.detectors.with(detector, enabled),
                ..cur.toggles.clone()
            },
            ..cur.clone()
        });
    }

    pub fn set_authz(&self, enabled: bool) {
        self.update(|cur| SessionState {
            toggles: SessionToggles {
                authz: enabled,
                ..cur.toggles.clone()
            },
            ..cur.clone()
        });
    }

    pub fn set_knowledge_base(&self, enabled: bool) {
        self.update(|cur| SessionState {
            toggles: SessionToggles {
                knowledge_base: enabled,
                ..cur.toggles.clone()
            },
            ..cur.clone()
        });
    }

    pub fn dismiss_notice(&self) {
        self.update(|cur| SessionState {
            notice: None,
            ..cur.clone()
        });
    }

    /// Empty the local transcript view. The audit log is untouched, so a
    /// history reload brings the entries back.
    pub fn clear_transcript(&self) {
        self.update(|cur| SessionState {
            transcript: Vec::new(),
            ..cur.clone()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_domain::principal::{Credential, Profile};

    fn session() -> ChatSession {
        ChatSession::new(SessionToggles::from_config(&Config::default()))
    }

    fn principal() -> Principal {
        Principal {
            username: "bob@example.com".into(),
            profile: Profile::default(),
            credential: Credential::new("t"),
            is_exempt: false,
        }
    }

    #[test]
    fn toggles_start_from_config() {
        let s = session().snapshot();
        assert_eq!(s.toggles.system_prompt, "You're a helpful assistant.");
        assert!(!s.toggles.authz);
        assert!(!s.toggles.knowledge_base);
        assert!(!s.is_processing());
    }

    #[test]
    fn observers_see_whole_updates() {
        let session = session();
        let mut rx = session.subscribe();
        session.set_detector(Detector::CodeDetection, false);
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert!(!seen.toggles.detectors.code_detection);
        assert!(seen.toggles.detectors.prompt_injection);
    }

    #[test]
    fn stale_epoch_updates_are_dropped() {
        let session = session();
        session.update(|cur| SessionState {
            principal: Some(principal()),
            epoch: cur.epoch + 1,
            ..cur.clone()
        });
        let epoch = session.snapshot().epoch;

        session.sign_out(false);
        let applied = session.update_in(epoch, |cur| SessionState {
            transcript: vec![ChatMessage::user_prompt("h", "late")],
            ..cur.clone()
        });
        assert!(!applied);
        assert!(session.snapshot().transcript.is_empty());
    }

    #[test]
    fn forced_sign_out_requires_login() {
        let session = session();
        session.set_authz(true);
        session.sign_out(true);
        let s = session.snapshot();
        assert!(s.login_required);
        assert!(!s.is_signed_in());
        assert_eq!(s.notice.unwrap().kind, NoticeKind::Error);
        // Toggles survive sign-out.
        assert!(s.toggles.authz);
    }
}
