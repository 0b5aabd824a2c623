use std::sync::Arc;

use pc_domain::config::Config;
use pc_domain::principal::ExemptionRule;
use pc_pangea::{AuditLog, Authorizer, Guard, TokenChecker, Unredactor};
use pc_providers::LlmProvider;
use pc_retrieval::Retriever;

use crate::runtime::quota::RateLimiter;

/// Collaborators and settings shared by every session.
///
/// Fields are grouped by concern:
/// - **Core** — config and the exemption rule derived from it
/// - **Security services** — audit, guard, authz, unredact, token check
/// - **Content** — retrieval and completion
///
/// Every collaborator sits behind a trait object so tests can swap in
/// in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub exemption: Arc<ExemptionRule>,
    pub rate_limiter: Arc<RateLimiter>,

    // ── Security services ─────────────────────────────────────────────
    pub audit: Arc<dyn AuditLog>,
    pub guard: Arc<dyn Guard>,
    pub authz: Arc<dyn Authorizer>,
    pub unredactor: Arc<dyn Unredactor>,
    pub token_checker: Arc<dyn TokenChecker>,

    // ── Content ───────────────────────────────────────────────────────
    /// `None` when no knowledge base is configured; the `/kb` toggle then
    /// has no effect.
    pub retriever: Option<Arc<dyn Retriever>>,
    pub llm: Arc<dyn LlmProvider>,
}
