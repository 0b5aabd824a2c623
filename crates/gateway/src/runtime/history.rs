//! Sign-in and transcript reconstruction.
//!
//! The audit log is the conversation store. Signing in seeds the quota
//! state and rebuilds the transcript from the principal's most recent
//! events; signing out just drops the view (see [`ChatSession::sign_out`]).

use pc_domain::error::Result;
use pc_domain::principal::{Credential, Principal};
use pc_domain::quota::RateLimitState;
use pc_domain::trace::TraceEvent;
use pc_domain::transcript::{ChatMessage, MessageType};
use pc_pangea::{AuditLog, AuditRecord, SearchRequest};

use super::session::{ChatSession, Notice, SessionState, TurnInspection, TurnPhase};
use super::session_lock::SessionBusy;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    #[error(transparent)]
    Busy(#[from] SessionBusy),
    #[error("session expired, please log in again")]
    Expired,
    #[error("not signed in")]
    NotSignedIn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignInReport {
    pub events: usize,
    pub rate_limit: RateLimitState,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session transitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve a bearer credential to the principal it belongs to.
pub async fn authenticate(state: &AppState, credential: Credential) -> Result<Principal> {
    let info = state.token_checker.check(&credential).await?;
    let is_exempt = state.exemption.is_exempt(&info.owner);
    Ok(Principal {
        username: info.owner,
        profile: info.profile,
        credential,
        is_exempt,
    })
}

/// Unauthenticated → authenticated: seed the quota, then load history.
///
/// Signing in again as the principal already signed in is a no-op. A
/// rejected credential signs the session out again and requires login.
pub async fn sign_in(
    state: &AppState,
    session: &ChatSession,
    principal: Principal,
) -> std::result::Result<SignInReport, SignInError> {
    let _permit = session.lock().try_acquire()?;

    let current = session.snapshot();
    if current.username() == Some(principal.username.as_str()) {
        return Ok(SignInReport {
            events: current.transcript.len(),
            rate_limit: current.rate_limit,
        });
    }

    let epoch = current.epoch + 1;
    session.update(|cur| SessionState {
        principal: Some(principal.clone()),
        epoch,
        transcript: Vec::new(),
        rate_limit: RateLimitState::Unlimited,
        phase: TurnPhase::LoadingHistory,
        notice: None,
        login_required: false,
        toggles: cur.toggles.clone(),
        inspection: TurnInspection::default(),
    });

    let mut notices = Vec::new();

    // ── quota seed ───────────────────────────────────────────────────
    let rate_limit = match state.rate_limiter.current(state.audit.as_ref(), &principal).await {
        Ok(rate) => {
            if let RateLimitState::Limited { remaining, quota } = rate {
                TraceEvent::RateLimitSeeded {
                    username: principal.username.clone(),
                    used: quota - remaining,
                    quota,
                }
                .emit();
            }
            rate
        }
        Err(e) if e.is_auth() => return Err(expire(session, epoch)),
        Err(e) => {
            // Each turn re-checks usage before spending a completion.
            tracing::warn!(username = %principal.username, error = %e, "quota seed failed");
            notices.push("Could not load message usage");
            RateLimitState::from_usage(state.rate_limiter.quota(), 0)
        }
    };

    // ── transcript ───────────────────────────────────────────────────
    let audit_cfg = &state.config.audit;
    let transcript = match load_transcript(
        state.audit.as_ref(),
        &principal,
        audit_cfg.history_limit,
        audit_cfg.search_page_size,
    )
    .await
    {
        Ok(t) => t,
        Err(e) if e.is_auth() => return Err(expire(session, epoch)),
        Err(e) => {
            tracing::warn!(username = %principal.username, error = %e, "history load failed");
            notices.push("Could not load chat history");
            Vec::new()
        }
    };

    let events = transcript.len();
    TraceEvent::HistoryLoaded {
        username: principal.username.clone(),
        events,
    }
    .emit();

    let notice = (!notices.is_empty()).then(|| Notice::error(notices.join("; ")));
    session.update_in(epoch, |cur| SessionState {
        transcript,
        rate_limit,
        phase: TurnPhase::Idle,
        notice,
        ..cur.clone()
    });

    Ok(SignInReport { events, rate_limit })
}

/// Rebuild the transcript view for the signed-in principal.
pub async fn reload_history(
    state: &AppState,
    session: &ChatSession,
) -> std::result::Result<usize, SignInError> {
    let _permit = session.lock().try_acquire()?;
    let current = session.snapshot();
    let principal = current.principal.clone().ok_or(SignInError::NotSignedIn)?;
    let epoch = current.epoch;

    session.update_in(epoch, |cur| SessionState {
        phase: TurnPhase::LoadingHistory,
        ..cur.clone()
    });

    let audit_cfg = &state.config.audit;
    match load_transcript(
        state.audit.as_ref(),
        &principal,
        audit_cfg.history_limit,
        audit_cfg.search_page_size,
    )
    .await
    {
        Ok(transcript) => {
            let events = transcript.len();
            TraceEvent::HistoryLoaded {
                username: principal.username.clone(),
                events,
            }
            .emit();
            session.update_in(epoch, |cur| SessionState {
                transcript,
                phase: TurnPhase::Idle,
                ..cur.clone()
            });
            Ok(events)
        }
        Err(e) if e.is_auth() => Err(expire(session, epoch)),
        Err(e) => {
            tracing::warn!(username = %principal.username, error = %e, "history reload failed");
            session.update_in(epoch, |cur| SessionState {
                phase: TurnPhase::Idle,
                notice: Some(Notice::error("Loading history failed, please try again")),
                ..cur.clone()
            });
            Ok(current.transcript.len())
        }
    }
}

fn expire(session: &ChatSession, epoch: u64) -> SignInError {
    if session.snapshot().epoch == epoch {
        session.sign_out(true);
    }
    SignInError::Expired
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconstruction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The principal's last `limit` events, oldest first.
///
/// One search fetches the newest `page` events; further pages of the same
/// result set follow until `limit` events are in hand or the set runs out.
pub async fn load_transcript(
    audit: &dyn AuditLog,
    principal: &Principal,
    limit: u32,
    page: u32,
) -> Result<Vec<ChatMessage>> {
    let credential = &principal.credential;
    let page = page.clamp(1, limit.max(1));
    let found = audit
        .search(credential, SearchRequest::recent_for(&principal.username, page))
        .await?;

    let mut records = found.events;
    if let Some(id) = found.id.as_deref() {
        let wanted = found.count.min(limit) as usize;
        while records.len() < wanted {
            let size = (wanted - records.len()).min(page as usize) as u32;
            let next = audit
                .results(credential, id, size, records.len() as u32)
                .await?;
            if next.events.is_empty() {
                break;
            }
            records.extend(next.events);
        }
    }
    records.truncate(limit as usize);
    Ok(transcript_from_records(records))
}

/// Map search results (newest first) to transcript order (oldest first).
pub fn transcript_from_records(records: Vec<AuditRecord>) -> Vec<ChatMessage> {
    let mut transcript: Vec<ChatMessage> = records.into_iter().map(to_chat_message).collect();
    transcript.reverse();
    transcript
}

fn to_chat_message(record: AuditRecord) -> ChatMessage {
    let event = record.envelope.event;
    ChatMessage {
        hash: record.hash,
        kind: event
            .kind
            .as_deref()
            .map(MessageType::from_event_type)
            .unwrap_or_else(|| MessageType::Other(String::new())),
        input: event.input,
        output: event.output,
        findings: event.findings,
        context: event.context,
    }
}
