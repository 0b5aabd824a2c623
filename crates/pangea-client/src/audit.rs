//! Tamper-evident audit log: append, search, page.

use std::sync::Arc;

use async_trait::async_trait;
use pc_domain::config::AuditConfig;
use pc_domain::error::Result;
use pc_domain::principal::Credential;
use pc_domain::transcript::MessageType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::transport::PangeaTransport;

const SERVICE: &str = "audit";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One event appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// RFC 3339, stamped by the client at send time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl AuditEvent {
    pub fn new(kind: MessageType, actor: impl Into<String>) -> Self {
        Self {
            kind,
            actor: actor.into(),
            input: None,
            output: None,
            findings: None,
            context: None,
            timestamp: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_findings(mut self, findings: impl Into<String>) -> Self {
        self.findings = Some(findings.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchRestriction {
    pub actor: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_restriction: Option<SearchRestriction>,
}

impl SearchRequest {
    /// Most recent events of one actor, newest first.
    pub fn recent_for(actor: &str, limit: u32) -> Self {
        Self {
            query: String::new(),
            limit,
            start: None,
            search_restriction: Some(SearchRestriction {
                actor: vec![actor.to_owned()],
            }),
        }
    }

    /// Completions received by `actor` within `window` (e.g. `"24hour"`).
    /// Only `count` of the answer matters, so one event is enough.
    ///
    /// Queries the `type` field because that is where [`AuditEvent`] puts
    /// the kind. Logs written by other tools under `event_type` are not
    /// counted.
    pub fn usage_for(actor: &str, window: &str) -> Self {
        Self {
            query: format!("type:{}", MessageType::LlmResponse),
            limit: 1,
            start: Some(window.to_owned()),
            search_restriction: Some(SearchRestriction {
                actor: vec![actor.to_owned()],
            }),
        }
    }
}

/// Fields of a stored event. Values the log returns as JSON objects are
/// kept as their serialized text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoredEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub actor: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub input: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub output: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub findings: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoredEnvelope {
    #[serde(default)]
    pub event: StoredEvent,
    #[serde(default)]
    pub received_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditRecord {
    pub hash: String,
    #[serde(default)]
    pub envelope: StoredEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResult {
    /// Result-set id for paging with [`AuditLog::results`].
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub events: Vec<AuditRecord>,
}

#[derive(Debug, Deserialize)]
struct LogResult {
    hash: String,
}

fn text_or_json<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Append-only event log that doubles as the conversation store.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one event; returns the log's hash for it.
    async fn log(&self, credential: &Credential, event: AuditEvent) -> Result<String>;

    /// Search the log, newest first.
    async fn search(&self, credential: &Credential, req: SearchRequest) -> Result<SearchResult>;

    /// Page through an earlier search result.
    async fn results(
        &self,
        credential: &Credential,
        id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REST client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RestAuditClient {
    transport: Arc<PangeaTransport>,
    config_id: Option<String>,
}

impl RestAuditClient {
    pub fn new(transport: Arc<PangeaTransport>, cfg: &AuditConfig) -> Self {
        Self {
            transport,
            config_id: cfg.config_id.clone(),
        }
    }

    /// Attach `config_id` to a request body.
    fn with_config(&self, mut body: Value) -> Value {
        if let (Some(id), Value::Object(map)) = (&self.config_id, &mut body) {
            map.insert("config_id".into(), Value::String(id.clone()));
        }
        body
    }

    fn page_body(&self, id: &str, limit: u32, offset: u32) -> Value {
        self.with_config(serde_json::json!({
            "id": id,
            "limit": limit,
            "offset": offset,
        }))
    }
}

#[async_trait]
impl AuditLog for RestAuditClient {
    async fn log(&self, credential: &Credential, mut event: AuditEvent) -> Result<String> {
        if event.timestamp.is_none() {
            event.timestamp = Some(chrono::Utc::now().to_rfc3339());
        }
        let body = self.with_config(serde_json::json!({ "event": event }));
        let out: LogResult = self
            .transport
            .post(SERVICE, "v1/log", credential, &body)
            .await?;
        Ok(out.hash)
    }

    async fn search(&self, credential: &Credential, req: SearchRequest) -> Result<SearchResult> {
        let body = self.with_config(serde_json::to_value(&req)?);
        self.transport
            .post(SERVICE, "v1/search", credential, &body)
            .await
    }

    async fn results(
        &self,
        credential: &Credential,
        id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResult> {
        let body = self.page_body(id, limit, offset);
        self.transport
            .post(SERVICE, "v1/results", credential, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_omits_unset_fields() {
        let event = AuditEvent::new(MessageType::UserPrompt, "alice").with_input("hi");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_prompt");
        assert_eq!(json["actor"], "alice");
        assert_eq!(json["input"], "hi");
        assert!(json.get("output").is_none());
    }

    #[test]
    fn usage_query_is_scoped_to_actor() {
        let json = serde_json::to_value(SearchRequest::usage_for("bob", "24hour")).unwrap();
        assert_eq!(json["query"], "type:llm_response");
        assert_eq!(json["limit"], 1);
        assert_eq!(json["start"], "24hour");
        assert_eq!(json["search_restriction"]["actor"][0], "bob");
    }

    #[test]
    fn stored_event_tolerates_object_fields() {
        let json = r#"{
            "count": 1,
            "events": [{
                "hash": "h1",
                "envelope": {
                    "event": {
                        "type": "ai_guard",
                        "findings": {"prompt_injection": {"detected": true}},
                        "input": "x"
                    },
                    "received_at": "2024-05-01T12:00:00Z"
                }
            }]
        }"#;
        let result: SearchResult = serde_json::from_str(json).unwrap();
        let event = &result.events[0].envelope.event;
        assert_eq!(event.kind.as_deref(), Some("ai_guard"));
        assert_eq!(
            event.findings.as_deref(),
            Some(r#"{"prompt_injection":{"detected":true}}"#)
        );
        assert_eq!(event.output, None);
    }

    #[test]
    fn config_id_is_attached_when_configured() {
        let transport = Arc::new(
            PangeaTransport::new(&pc_domain::config::PangeaConfig::default()).unwrap(),
        );
        let client = RestAuditClient::new(
            transport,
            &AuditConfig {
                config_id: Some("pci_123".into()),
                ..Default::default()
            },
        );
        let body = client.with_config(serde_json::json!({ "limit": 1 }));
        assert_eq!(body["config_id"], "pci_123");

        let page = client.page_body("pas_1", 20, 40);
        assert_eq!(
            page,
            serde_json::json!({
                "id": "pas_1",
                "limit": 20,
                "offset": 40,
                "config_id": "pci_123",
            })
        );
    }
}
