//! AppState construction shared by every CLI command.

use std::sync::Arc;

use anyhow::Context;

use pc_domain::config::{Config, ConfigSeverity};
use pc_domain::principal::{Credential, ExemptionRule};
use pc_pangea::{
    PangeaTransport, RestAuditClient, RestAuthorizer, RestGuardClient, RestTokenChecker,
    RestUnredactor,
};
use pc_providers::{build_provider, resolve_api_key};
use pc_retrieval::{RestRetriever, Retriever};

use crate::runtime::quota::RateLimiter;
use crate::state::AppState;

/// Validate config and wire the REST collaborators into an [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Security services ────────────────────────────────────────────
    let transport =
        Arc::new(PangeaTransport::new(&config.pangea).context("creating service transport")?);
    tracing::info!(
        domain = %config.pangea.base_domain,
        template = %config.pangea.url_template,
        "security services ready"
    );

    let client_token = if config.authn.client_token.is_unset() {
        None
    } else {
        let token = resolve_api_key(&config.authn.client_token)
            .context("resolving authn client token")?;
        Some(Credential::new(token))
    };

    // ── Retrieval ────────────────────────────────────────────────────
    let retriever: Option<Arc<dyn Retriever>> = if config.retrieval.base_url.is_empty() {
        None
    } else {
        let r = RestRetriever::new(&config.retrieval).context("creating retrieval client")?;
        tracing::info!(url = %config.retrieval.base_url, "retrieval client ready");
        Some(Arc::new(r))
    };

    // ── Completion ───────────────────────────────────────────────────
    let llm = build_provider(&config.llm).context("initializing LLM provider")?;

    let exemption = ExemptionRule::new(&config.chat.exempt_username_pattern)
        .context("compiling exempt_username_pattern")?;

    Ok(AppState {
        exemption: Arc::new(exemption),
        rate_limiter: Arc::new(RateLimiter::new(&config.chat, &config.audit)),
        audit: Arc::new(RestAuditClient::new(transport.clone(), &config.audit)),
        guard: Arc::new(RestGuardClient::new(transport.clone(), &config.guard)),
        authz: Arc::new(RestAuthorizer::new(transport.clone())),
        unredactor: Arc::new(RestUnredactor::new(transport.clone())),
        token_checker: Arc::new(RestTokenChecker::new(transport, client_token)),
        retriever,
        llm,
        config,
    })
}
