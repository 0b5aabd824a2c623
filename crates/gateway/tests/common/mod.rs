//! In-memory collaborators for driving sessions and turns without a
//! network. Each fake records the calls it receives.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use pc_domain::config::Config;
use pc_domain::document::Document;
use pc_domain::error::{Error, Result};
use pc_domain::guard::{Detector, DetectorFinding, GuardResult, GuardV2};
use pc_domain::principal::{Credential, ExemptionRule, Profile};
use pc_domain::transcript::{ChatMessage, MessageType};
use pc_gateway::runtime::quota::RateLimiter;
use pc_gateway::runtime::{
    authenticate, sign_in, submit, ChatSession, SessionToggles, SignInReport, TurnReport,
};
use pc_gateway::state::AppState;
use pc_pangea::{
    AuditEvent, AuditLog, AuditRecord, Authorizer, Guard, GuardRequest, SearchRequest,
    SearchResult, StoredEnvelope, StoredEvent, TokenChecker, TokenInfo, Unredactor,
};
use pc_providers::{ChatRequest, ChatResponse, LlmProvider};
use pc_retrieval::Retriever;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A failure a fake can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Credential rejected (403).
    Auth,
    /// Service unavailable (503).
    Down,
}

impl Fault {
    pub fn error(self, service: &str) -> Error {
        match self {
            Fault::Auth => Error::Auth(format!("{service}: 403 Forbidden")),
            Fault::Down => Error::Service {
                service: service.into(),
                message: "503 Service Unavailable".into(),
            },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stores appended events and answers searches from them.
///
/// Usage queries count stored `llm_response` events of the actor plus a
/// settable base, so tests can start a principal part-way through the day.
#[derive(Default)]
pub struct FakeAudit {
    /// Oldest first.
    store: Mutex<Vec<AuditRecord>>,
    pub logged: Mutex<Vec<AuditEvent>>,
    pub searches: Mutex<Vec<SearchRequest>>,
    /// `(id, limit, offset)` per page request.
    pub pages: Mutex<Vec<(String, u32, u32)>>,
    /// Newest-first result set of the last transcript search.
    last_result: Mutex<Vec<AuditRecord>>,
    usage_base: Mutex<u32>,
    /// `(None, fault)` fails every append; `(Some(kind), fault)` only that kind.
    log_fault: Mutex<Option<(Option<MessageType>, Fault)>>,
    search_fault: Mutex<Option<Fault>>,
}

impl FakeAudit {
    pub fn set_usage(&self, used: u32) {
        *self.usage_base.lock() = used;
    }

    pub fn fail_logs(&self, kind: Option<MessageType>, fault: Fault) {
        *self.log_fault.lock() = Some((kind, fault));
    }

    pub fn fail_searches(&self, fault: Option<Fault>) {
        *self.search_fault.lock() = fault;
    }

    /// Store an event as if an earlier session had logged it.
    pub fn seed(&self, event: AuditEvent) -> String {
        let mut store = self.store.lock();
        let hash = format!("seed{}", store.len());
        store.push(record(&hash, &event));
        hash
    }

    pub fn logged_kinds(&self) -> Vec<String> {
        self.logged
            .lock()
            .iter()
            .map(|e| e.kind.as_str().to_owned())
            .collect()
    }

    pub fn usage_queries(&self) -> usize {
        self.searches
            .lock()
            .iter()
            .filter(|s| s.query.starts_with("type:"))
            .count()
    }
}

fn record(hash: &str, event: &AuditEvent) -> AuditRecord {
    AuditRecord {
        hash: hash.to_owned(),
        envelope: StoredEnvelope {
            event: StoredEvent {
                kind: Some(event.kind.as_str().to_owned()),
                actor: Some(event.actor.clone()),
                input: event.input.clone(),
                output: event.output.clone(),
                findings: event.findings.clone(),
                context: event.context.clone(),
            },
            received_at: None,
        },
    }
}

fn actor_of(req: &SearchRequest) -> Option<String> {
    req.search_restriction
        .as_ref()
        .and_then(|r| r.actor.first().cloned())
}

#[async_trait]
impl AuditLog for FakeAudit {
    async fn log(&self, _credential: &Credential, event: AuditEvent) -> Result<String> {
        if let Some((kind, fault)) = self.log_fault.lock().clone() {
            if kind.is_none() || kind.as_ref() == Some(&event.kind) {
                return Err(fault.error("audit"));
            }
        }
        let mut store = self.store.lock();
        let hash = format!("h{}", store.len());
        store.push(record(&hash, &event));
        self.logged.lock().push(event);
        Ok(hash)
    }

    async fn search(&self, _credential: &Credential, req: SearchRequest) -> Result<SearchResult> {
        self.searches.lock().push(req.clone());
        if let Some(fault) = *self.search_fault.lock() {
            return Err(fault.error("audit"));
        }

        let actor = actor_of(&req);
        let store = self.store.lock();
        let mine = store
            .iter()
            .rev()
            .filter(|r| actor.is_none() || r.envelope.event.actor == actor);

        if req.query.starts_with("type:") {
            let wanted = req.query.trim_start_matches("type:");
            let used = mine
                .filter(|r| r.envelope.event.kind.as_deref() == Some(wanted))
                .count() as u32;
            return Ok(SearchResult {
                id: None,
                count: *self.usage_base.lock() + used,
                events: Vec::new(),
            });
        }

        let all: Vec<AuditRecord> = mine.cloned().collect();
        let events: Vec<AuditRecord> = all.iter().take(req.limit as usize).cloned().collect();
        let count = all.len() as u32;
        *self.last_result.lock() = all;
        Ok(SearchResult {
            id: Some("pas_fake".into()),
            count,
            events,
        })
    }

    async fn results(
        &self,
        _credential: &Credential,
        id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResult> {
        self.pages.lock().push((id.to_owned(), limit, offset));
        if let Some(fault) = *self.search_fault.lock() {
            return Err(fault.error("audit"));
        }
        let all = self.last_result.lock();
        let events: Vec<AuditRecord> = all
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(SearchResult {
            id: Some(id.to_owned()),
            count: all.len() as u32,
            events,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Answers per recipe; a recipe with nothing configured comes back clean.
#[derive(Default)]
pub struct FakeGuard {
    pub calls: Mutex<Vec<GuardRequest>>,
    verdicts: Mutex<HashMap<String, std::result::Result<GuardResult, Fault>>>,
}

impl FakeGuard {
    pub fn answer(&self, recipe: &str, verdict: std::result::Result<GuardResult, Fault>) {
        self.verdicts.lock().insert(recipe.to_owned(), verdict);
    }
}

#[async_trait]
impl Guard for FakeGuard {
    async fn guard(&self, _credential: &Credential, req: GuardRequest) -> Result<GuardResult> {
        let verdict = self.verdicts.lock().get(&req.recipe).cloned();
        self.calls.lock().push(req);
        match verdict {
            Some(Ok(v)) => Ok(v),
            Some(Err(fault)) => Err(fault.error("ai-guard")),
            None => Ok(clean()),
        }
    }
}

pub fn clean() -> GuardResult {
    GuardResult::V2(GuardV2::default())
}

/// A v2 verdict with `detectors` firing.
pub fn detected(detectors: &[Detector]) -> GuardResult {
    GuardResult::V2(GuardV2 {
        detectors: detectors
            .iter()
            .map(|d| {
                (
                    d.as_str().to_owned(),
                    DetectorFinding {
                        detected: true,
                        data: None,
                    },
                )
            })
            .collect(),
        ..Default::default()
    })
}

/// A v2 verdict that rewrote the text, optionally reversibly.
pub fn redacted(text: &str, fpe_context: Option<&str>) -> GuardResult {
    let GuardResult::V2(mut v2) = detected(&[Detector::PiiEntity]) else {
        unreachable!()
    };
    v2.prompt_text = Some(text.to_owned());
    v2.fpe_context = fpe_context.map(str::to_owned);
    GuardResult::V2(v2)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval & authorization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct FakeRetriever {
    pub queries: Mutex<Vec<String>>,
    docs: Mutex<Vec<Document>>,
    fault: Mutex<Option<Fault>>,
}

impl FakeRetriever {
    pub fn returns(&self, docs: Vec<Document>) {
        *self.docs.lock() = docs;
    }

    pub fn fail(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, _credential: &Credential, query: &str) -> Result<Vec<Document>> {
        self.queries.lock().push(query.to_owned());
        if let Some(fault) = *self.fault.lock() {
            return Err(fault.error("retrieval"));
        }
        Ok(self.docs.lock().clone())
    }
}

pub fn doc(id: &str, content: &str) -> Document {
    Document {
        id: id.into(),
        content: content.into(),
        metadata: Default::default(),
    }
}

#[derive(Default)]
pub struct FakeAuthz {
    /// `(subject, document_id)` per check.
    pub checks: Mutex<Vec<(String, String)>>,
    denied: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
}

impl FakeAuthz {
    pub fn deny(&self, document_id: &str) {
        self.denied.lock().insert(document_id.to_owned());
    }

    /// Make the check for `document_id` itself fail.
    pub fn break_check(&self, document_id: &str) {
        self.broken.lock().insert(document_id.to_owned());
    }
}

#[async_trait]
impl Authorizer for FakeAuthz {
    async fn check(
        &self,
        _credential: &Credential,
        subject: &str,
        document_id: &str,
    ) -> Result<bool> {
        self.checks
            .lock()
            .push((subject.to_owned(), document_id.to_owned()));
        if self.broken.lock().contains(document_id) {
            return Err(Fault::Down.error("authz"));
        }
        Ok(!self.denied.lock().contains(document_id))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unredact, token check, completion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FakeUnredactor {
    /// `(redacted, fpe_context)` per call.
    pub calls: Mutex<Vec<(String, String)>>,
    reply: Mutex<std::result::Result<String, Fault>>,
}

impl Default for FakeUnredactor {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok("unredacted".into())),
        }
    }
}

impl FakeUnredactor {
    pub fn reply(&self, reply: std::result::Result<&str, Fault>) {
        *self.reply.lock() = reply.map(str::to_owned);
    }
}

#[async_trait]
impl Unredactor for FakeUnredactor {
    async fn unredact(
        &self,
        _credential: &Credential,
        redacted: &str,
        fpe_context: &str,
    ) -> Result<String> {
        self.calls
            .lock()
            .push((redacted.to_owned(), fpe_context.to_owned()));
        self.reply.lock().clone().map_err(|f| f.error("redact"))
    }
}

/// Any token belongs to whoever the test says; a fault rejects it.
#[derive(Default)]
pub struct FakeTokenChecker {
    owner: Mutex<String>,
    profile: Mutex<Profile>,
    fault: Mutex<Option<Fault>>,
}

impl FakeTokenChecker {
    pub fn owned_by(&self, owner: &str, first_name: Option<&str>) {
        *self.owner.lock() = owner.to_owned();
        *self.profile.lock() = Profile {
            first_name: first_name.map(str::to_owned),
            last_name: None,
        };
    }

    pub fn fail(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }
}

#[async_trait]
impl TokenChecker for FakeTokenChecker {
    async fn check(&self, _token: &Credential) -> Result<TokenInfo> {
        if let Some(fault) = *self.fault.lock() {
            return Err(fault.error("authn"));
        }
        Ok(TokenInfo {
            owner: self.owner.lock().clone(),
            profile: self.profile.lock().clone(),
        })
    }
}

pub struct FakeLlm {
    pub requests: Mutex<Vec<ChatRequest>>,
    reply: Mutex<std::result::Result<String, Fault>>,
    /// When set, each call waits for a notification before answering.
    gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok("Paris.".into())),
            gate: Mutex::new(None),
        }
    }
}

impl FakeLlm {
    pub fn reply(&self, reply: std::result::Result<&str, Fault>) {
        *self.reply.lock() = reply.map(str::to_owned);
    }

    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    async fn chat(&self, _credential: &Credential, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req.clone());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let reply = self.reply.lock().clone();
        reply
            .map(|content| ChatResponse {
                content,
                model: "fake-model".into(),
            })
            .map_err(|f| f.error("llm"))
    }

    fn provider_id(&self) -> &str {
        "fake"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Harness {
    pub config: Arc<Config>,
    pub state: AppState,
    pub session: ChatSession,
    pub audit: Arc<FakeAudit>,
    pub guard: Arc<FakeGuard>,
    pub retriever: Arc<FakeRetriever>,
    pub authz: Arc<FakeAuthz>,
    pub unredactor: Arc<FakeUnredactor>,
    pub tokens: Arc<FakeTokenChecker>,
    pub llm: Arc<FakeLlm>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let config = Arc::new(config);
        let audit = Arc::new(FakeAudit::default());
        let guard = Arc::new(FakeGuard::default());
        let retriever = Arc::new(FakeRetriever::default());
        let authz = Arc::new(FakeAuthz::default());
        let unredactor = Arc::new(FakeUnredactor::default());
        let tokens = Arc::new(FakeTokenChecker::default());
        let llm = Arc::new(FakeLlm::default());

        let exemption = ExemptionRule::new(&config.chat.exempt_username_pattern)
            .unwrap_or_else(|_| ExemptionRule::none());
        let state = AppState {
            config: config.clone(),
            exemption: Arc::new(exemption),
            rate_limiter: Arc::new(RateLimiter::new(&config.chat, &config.audit)),
            audit: audit.clone(),
            guard: guard.clone(),
            authz: authz.clone(),
            unredactor: unredactor.clone(),
            token_checker: tokens.clone(),
            retriever: Some(retriever.clone()),
            llm: llm.clone(),
        };
        let session = ChatSession::new(SessionToggles::from_config(&config));

        Self {
            config,
            state,
            session,
            audit,
            guard,
            retriever,
            authz,
            unredactor,
            tokens,
            llm,
        }
    }

    pub fn answer_input(&self, verdict: std::result::Result<GuardResult, Fault>) {
        self.guard.answer(&self.config.guard.input_recipe, verdict);
    }

    pub fn answer_output(&self, verdict: std::result::Result<GuardResult, Fault>) {
        self.guard.answer(&self.config.guard.output_recipe, verdict);
    }

    /// Authenticate a token owned by `username` and sign the session in.
    pub async fn sign_in(&self, username: &str) -> SignInReport {
        self.tokens.owned_by(username, None);
        let principal = authenticate(&self.state, Credential::new("pts_test"))
            .await
            .expect("token check");
        sign_in(&self.state, &self.session, principal)
            .await
            .expect("sign in")
    }

    pub async fn submit(&self, prompt: &str) -> TurnReport {
        submit(&self.state, &self.session, prompt).await
    }

    pub fn remaining(&self) -> Option<u32> {
        self.session.snapshot().rate_limit.remaining()
    }

    /// Outbound calls of every kind, to assert that nothing left the process.
    pub fn network_calls(&self) -> usize {
        self.audit.logged.lock().len()
            + self.audit.searches.lock().len()
            + self.audit.pages.lock().len()
            + self.guard.calls.lock().len()
            + self.retriever.queries.lock().len()
            + self.authz.checks.lock().len()
            + self.unredactor.calls.lock().len()
            + self.llm.requests.lock().len()
    }
}

pub fn kinds(entries: &[ChatMessage]) -> Vec<&str> {
    entries.iter().map(|m| m.kind.as_str()).collect()
}
