//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Azure-hosted gateways, Ollama, vLLM, LM Studio and any
//! other endpoint that follows the OpenAI chat completions contract.

use std::time::{Duration, Instant};

use pc_domain::config::{AuthMode, LlmConfig};
use pc_domain::error::{Error, Result};
use pc_domain::message::{Message, Role};
use pc_domain::principal::Credential;
use pc_domain::trace::TraceEvent;
use serde_json::Value;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key, status_error};

const PROVIDER_ID: &str = "openai_compat";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    base_url: String,
    /// Resolved provider key. `None` forwards the principal's credential.
    api_key: Option<String>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider from the `[llm]` config section.
    ///
    /// With `auth.mode = "none"` no key is resolved and each request carries
    /// the principal's bearer credential instead.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = match cfg.auth.mode {
            AuthMode::None => None,
            AuthMode::ApiKey | AuthMode::Keychain => Some(resolve_api_key(&cfg.auth)?),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth_header: cfg
                .auth
                .header
                .clone()
                .unwrap_or_else(|| "Authorization".into()),
            auth_prefix: cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into()),
            default_model: cfg
                .default_model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".into()),
            client,
        })
    }

    // ── Internal: build authenticated request builder ──────────────

    fn authed_post(&self, url: &str, credential: &Credential) -> reqwest::RequestBuilder {
        let rb = self.client.post(url);
        match &self.api_key {
            Some(key) => rb.header(&self.auth_header, format!("{}{}", self.auth_prefix, key)),
            None => rb.header(reqwest::header::AUTHORIZATION, credential.bearer()),
        }
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": false,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    serde_json::json!({
        "role": role_to_str(msg.role),
        "content": msg.content,
    })
}

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let message = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| Error::Service {
            service: PROVIDER_ID.into(),
            message: "no message in response choices".into(),
        })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ChatResponse { content, model })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, credential: &Credential, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = PROVIDER_ID, url = %url, "chat request");

        let start = Instant::now();
        let resp = self
            .authed_post(&url, credential)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(status_error(
                PROVIDER_ID,
                status,
                &resp_text,
                self.api_key.is_none(),
            ));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let out = parse_chat_response(&resp_json)?;

        TraceEvent::LlmRequest {
            provider: PROVIDER_ID.into(),
            model: out.model.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            response_chars: out.content.chars().count(),
        }
        .emit();

        Ok(out)
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}
