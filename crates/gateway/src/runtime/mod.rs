//! Core runtime: the session state container and the turn pipeline that
//! drives a prompt through audit, guard, retrieval, completion and back.
//!
//! Entry points: [`history::authenticate`] + [`history::sign_in`] to open a
//! session, then [`submit`] once per user prompt.

pub mod documents;
pub mod history;
pub mod prompt;
pub mod quota;
pub mod session;
pub mod session_lock;
pub mod turn;

pub use history::{authenticate, reload_history, sign_in, SignInError, SignInReport};
pub use session::{ChatSession, Notice, NoticeKind, SessionState, SessionToggles, TurnInspection, TurnPhase};
pub use turn::{submit, HaltReason, NotStarted, TurnFailure, TurnOutcome, TurnReport};
