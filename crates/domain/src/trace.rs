use serde::Serialize;

/// Structured trace events emitted across all Pangea Chat crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ServiceCall {
        service: String,
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    AsyncPoll {
        service: String,
        request_id: String,
        attempt: u32,
        status: u16,
    },
    GuardVerdict {
        side: String,
        schema: String,
        detected: Vec<String>,
        redacted: bool,
        blocked: bool,
    },
    DocumentsFiltered {
        retrieved: usize,
        allowed: usize,
    },
    LlmRequest {
        provider: String,
        model: String,
        duration_ms: u64,
        response_chars: usize,
    },
    TurnStage {
        username: String,
        stage: String,
    },
    TurnHalted {
        username: String,
        reason: String,
    },
    TurnFailed {
        username: String,
        stage: String,
        session_expired: bool,
    },
    HistoryLoaded {
        username: String,
        events: usize,
    },
    RateLimitSeeded {
        username: String,
        used: u32,
        quota: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pc_event");
    }
}
