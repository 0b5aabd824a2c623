//! Credential lookup and session opening for CLI commands.

use anyhow::Context;

use pc_domain::config::{AuthConfig, AuthMode};
use pc_domain::principal::Credential;
use pc_providers::resolve_api_key;

use crate::runtime::{authenticate, sign_in, ChatSession, SessionToggles};
use crate::state::AppState;

pub const TOKEN_ENV: &str = "PANGEA_CHAT_TOKEN";
pub const KEYCHAIN_SERVICE: &str = "pangea-chat";
pub const TOKEN_ACCOUNT: &str = "user-token";

/// The user's bearer token: `PANGEA_CHAT_TOKEN`, else the OS keychain
/// (with its `PANGEA_CHAT_USER_TOKEN` headless fallback).
pub fn resolve_credential() -> anyhow::Result<Credential> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            return Ok(Credential::new(token.trim()));
        }
    }

    let keychain = AuthConfig {
        mode: AuthMode::Keychain,
        service: Some(KEYCHAIN_SERVICE.into()),
        account: Some(TOKEN_ACCOUNT.into()),
        ..Default::default()
    };
    resolve_api_key(&keychain).map(Credential::new).map_err(|_| {
        anyhow::anyhow!(
            "no credential found: set {TOKEN_ENV} or run `pangea-chat config set-secret token`"
        )
    })
}

/// Check the token, sign in (quota seed + history load) and return the
/// ready session.
pub async fn open_session(state: &AppState) -> anyhow::Result<ChatSession> {
    let credential = resolve_credential()?;
    let principal = authenticate(state, credential)
        .await
        .context("checking the bearer token")?;
    tracing::info!(
        username = %principal.username,
        exempt = principal.is_exempt,
        "signed in"
    );

    let session = ChatSession::new(SessionToggles::from_config(&state.config));
    sign_in(state, &session, principal).await?;
    Ok(session)
}
