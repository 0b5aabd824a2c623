use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Model sent with each request. `None` lets the provider choose.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Provider API key. When no key resolves, requests carry the
    /// principal's bearer credential instead.
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: d_base_url(),
            default_model: None,
            auth: AuthConfig::default(),
            timeout_ms: 60_000,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any endpoint following the OpenAI chat-completions contract.
    OpenaiCompat,
    /// The chat application's own completion route:
    /// `{input, systemPrompt, userPrompt}` in, `{content}` out.
    #[default]
    ConverseProxy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Keychain service name (e.g., "pangea-chat").
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name (e.g., "llm-api-key").
    #[serde(default)]
    pub account: Option<String>,
}

impl AuthConfig {
    /// True when no key source is configured at all.
    pub fn is_unset(&self) -> bool {
        self.key.is_none() && self.env.is_none() && (self.service.is_none() || self.account.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Keychain,
    None,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "http://localhost:3000/api/ai".into()
}
fn d_60000() -> u64 {
    60_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_kind_is_converse_proxy() {
        let config = LlmConfig::default();
        assert_eq!(config.kind, ProviderKind::ConverseProxy);
        assert!(config.auth.is_unset());
    }

    #[test]
    fn openai_compat_deserializes() {
        let json = r#"{
            "kind": "openai_compat",
            "base_url": "https://api.openai.com/v1",
            "default_model": "gpt-4o-mini",
            "auth": { "env": "OPENAI_API_KEY" }
        }"#;
        let config: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, ProviderKind::OpenaiCompat);
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-mini"));
        assert!(!config.auth.is_unset());
        assert_eq!(config.timeout_ms, 60_000);
    }

    #[test]
    fn keychain_needs_both_service_and_account() {
        let auth = AuthConfig {
            service: Some("pangea-chat".into()),
            ..Default::default()
        };
        assert!(auth.is_unset());
    }
}
