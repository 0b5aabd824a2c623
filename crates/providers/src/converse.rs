//! Adapter for the chat application's own completion route.
//!
//! The route takes the assembled message list plus the raw system and user
//! prompts (it re-checks the prompt size and the daily quota server-side)
//! and answers `{content}`. It authenticates the principal, so a 401/403
//! here means the session has expired.

use std::time::{Duration, Instant};

use pc_domain::config::LlmConfig;
use pc_domain::error::{Error, Result};
use pc_domain::principal::Credential;
use pc_domain::trace::TraceEvent;
use serde::{Deserialize, Serialize};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, status_error};

const PROVIDER_ID: &str = "converse";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseBody<'a> {
    input: &'a [pc_domain::message::Message],
    system_prompt: &'a str,
    user_prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConverseReply {
    content: String,
}

pub struct ConverseProxyProvider {
    url: String,
    model_label: String,
    client: reqwest::Client,
}

impl ConverseProxyProvider {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            url: cfg.base_url.trim_end_matches('/').to_string(),
            model_label: cfg
                .default_model
                .clone()
                .unwrap_or_else(|| "server-default".into()),
            client,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for ConverseProxyProvider {
    async fn chat(&self, credential: &Credential, req: &ChatRequest) -> Result<ChatResponse> {
        let body = ConverseBody {
            input: &req.messages,
            system_prompt: req.system_prompt(),
            user_prompt: req.user_prompt(),
        };

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(status_error(PROVIDER_ID, status, &text, true));
        }

        let reply: ConverseReply = serde_json::from_str(&text).map_err(|e| Error::Service {
            service: PROVIDER_ID.into(),
            message: format!("unexpected reply: {e}"),
        })?;

        TraceEvent::LlmRequest {
            provider: PROVIDER_ID.into(),
            model: self.model_label.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            response_chars: reply.content.chars().count(),
        }
        .emit();

        Ok(ChatResponse {
            content: reply.content,
            model: self.model_label.clone(),
        })
    }

    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_domain::message::Message;

    #[test]
    fn body_uses_camel_case_prompts() {
        let messages = vec![Message::system("sys"), Message::user("question")];
        let body = ConverseBody {
            input: &messages,
            system_prompt: "sys",
            user_prompt: "question",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemPrompt"], "sys");
        assert_eq!(json["userPrompt"], "question");
        assert_eq!(json["input"][1]["role"], "user");
    }

    #[tokio::test]
    async fn unreachable_proxy_is_transient() {
        let provider = ConverseProxyProvider::from_config(&LlmConfig {
            base_url: "http://127.0.0.1:9/api/converse".into(),
            timeout_ms: 500,
            ..Default::default()
        })
        .unwrap();
        let req = ChatRequest::new(vec![Message::user("hi")]);
        let err = provider
            .chat(&Credential::new("t"), &req)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
        assert!(!err.is_auth());
    }
}
