//! Shared helpers for provider adapters: error mapping and API-key resolution.

use pc_domain::config::AuthConfig;
use pc_domain::error::{Error, Result};
use reqwest::StatusCode;

/// Network failures are retryable; timeouts are kept apart for logs.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    match e.is_timeout() {
        true => Error::Timeout(e.to_string()),
        false => Error::Http(e.to_string()),
    }
}

/// Map a non-2xx completion response to the error taxonomy.
///
/// 401/403 only mean "session expired" when the request carried the
/// principal's own credential; a rejected provider API key is a
/// configuration problem, not a reason to sign the user out.
pub(crate) fn status_error(
    provider: &str,
    status: StatusCode,
    body: &str,
    principal_credential: bool,
) -> Error {
    let code = status.as_u16();
    let snippet: String = body.chars().take(300).collect();
    let auth_status = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
    if auth_status && principal_credential {
        Error::Auth(format!("{provider} rejected the credential ({code})"))
    } else if status.is_client_error() {
        Error::Rejected {
            service: provider.to_owned(),
            message: format!("HTTP {code} - {snippet}"),
        }
    } else {
        Error::Service {
            service: provider.to_owned(),
            message: format!("HTTP {code} - {snippet}"),
        }
    }
}

/// Find the secret an [`AuthConfig`] points at.
///
/// Sources, first hit wins: the inline `key`, the OS keychain entry
/// `service`/`account`, the `env` variable, then the keychain's headless
/// stand-in variable (see [`keychain_fallback_env_name`]).
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(key) = &auth.key {
        tracing::warn!("using the inline `key` from config; an env var or the keychain is safer");
        return Ok(key.clone());
    }

    let keychain = auth.service.as_deref().zip(auth.account.as_deref());

    if let Some((service, account)) = keychain {
        match resolve_from_keychain(service, account) {
            Ok(secret) => return Ok(secret),
            Err(e) => tracing::warn!(service, account, error = %e, "keychain unavailable"),
        }
    }

    if let Some(var) = &auth.env {
        return std::env::var(var)
            .map_err(|_| Error::Auth(format!("environment variable '{var}' is not set")));
    }

    if let Some((service, account)) = keychain {
        let var = keychain_fallback_env_name(service, account);
        if let Ok(secret) = std::env::var(&var) {
            tracing::info!(env_var = %var, "keychain secret taken from its fallback variable");
            return Ok(secret);
        }
    }

    Err(Error::Auth(
        "no API key configured: set `key`, `env` or `service` + `account`".into(),
    ))
}

/// Read a secret from the OS keychain. Fails on hosts without a keychain
/// daemon.
pub fn resolve_from_keychain(service: &str, account: &str) -> Result<String> {
    keyring::Entry::new(service, account)
        .and_then(|entry| entry.get_password())
        .map_err(|e| Error::Auth(format!("keychain read {service}/{account}: {e}")))
}

/// Write a secret to the OS keychain (used by `config set-secret`).
pub fn store_in_keychain(service: &str, account: &str, secret: &str) -> Result<()> {
    keyring::Entry::new(service, account)
        .and_then(|entry| entry.set_password(secret))
        .map_err(|e| Error::Config(format!("keychain write {service}/{account}: {e}")))
}

/// Variable consulted when the keychain itself is unreachable:
/// `("pangea-chat", "user-token")` → `PANGEA_CHAT_USER_TOKEN`.
pub fn keychain_fallback_env_name(service: &str, account: &str) -> String {
    let shout = |s: &str| s.to_uppercase().replace('-', "_");
    format!("{}_{}", shout(service), shout(account))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_variable_is_shouted() {
        assert_eq!(
            keychain_fallback_env_name("pangea-chat", "llm-api-key"),
            "PANGEA_CHAT_LLM_API_KEY"
        );
    }

    #[test]
    fn inline_key_wins() {
        let auth = AuthConfig {
            key: Some("sk-test-123".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "sk-test-123");
    }

    #[test]
    fn env_var_is_read() {
        let var_name = "PC_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "env-secret-value");
        let auth = AuthConfig {
            env: Some(var_name.into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "env-secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn missing_env_var_is_named() {
        let auth = AuthConfig {
            env: Some("PC_TEST_NONEXISTENT_VAR_8888".into()),
            ..Default::default()
        };
        let err = resolve_api_key(&auth).unwrap_err();
        assert!(err.to_string().contains("PC_TEST_NONEXISTENT_VAR_8888"));
    }

    #[test]
    fn nothing_configured_is_auth_error() {
        let err = resolve_api_key(&AuthConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
        assert!(err.is_auth());
    }

    #[test]
    fn headless_keychain_uses_fallback_variable() {
        // No keychain daemon in CI, so the headless fallback must answer.
        let fallback_var = "PANGEA_CHAT_TEST_FALLBACK_PROVIDER";
        std::env::set_var(fallback_var, "fallback-secret");
        let auth = AuthConfig {
            service: Some("pangea-chat".into()),
            account: Some("test-fallback-provider".into()),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&auth).unwrap(), "fallback-secret");
        std::env::remove_var(fallback_var);
    }

    #[test]
    fn principal_auth_failure_is_session_expiry() {
        let err = status_error("converse", StatusCode::FORBIDDEN, "Forbidden", true);
        assert!(err.is_auth());
    }

    #[test]
    fn provider_key_failure_is_not_session_expiry() {
        let err = status_error("openai_compat", StatusCode::UNAUTHORIZED, "bad key", false);
        assert!(!err.is_auth());
        assert!(matches!(err, Error::Rejected { .. }));
    }

    #[test]
    fn server_error_is_transient() {
        let err = status_error("openai_compat", StatusCode::SERVICE_UNAVAILABLE, "", false);
        assert!(err.is_transient());
    }

    #[test]
    #[ignore] // Requires a running keychain daemon (skip in CI)
    fn keychain_store_then_read() {
        let service = "pangea-chat-test";
        let account = "integration-test-key";
        store_in_keychain(service, account, "test-secret-value-12345").unwrap();
        assert_eq!(
            resolve_from_keychain(service, account).unwrap(),
            "test-secret-value-12345"
        );
        keyring::Entry::new(service, account)
            .unwrap()
            .delete_credential()
            .unwrap();
    }
}
