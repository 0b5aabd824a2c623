//! Transcript entries shown to the user.
//!
//! A [`ChatMessage`] is created once per pipeline stage and never mutated.
//! The durable copy of every entry lives in the audit log; the in-memory
//! transcript is only a view over it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MessageType
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Event-type tag shared by transcript entries and audit events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    UserPrompt,
    LlmResponse,
    AiGuard,
    PromptGuard,
    /// Any other event type found in the audit log, kept verbatim.
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::UserPrompt => "user_prompt",
            MessageType::LlmResponse => "llm_response",
            MessageType::AiGuard => "ai_guard",
            MessageType::PromptGuard => "prompt_guard",
            MessageType::Other(s) => s.as_str(),
        }
    }

    /// Map an audit envelope's `type` field to a transcript type.
    ///
    /// `llm/end` is what the LLM tracer writes for a finished generation.
    pub fn from_event_type(raw: &str) -> Self {
        match raw {
            "user_prompt" => MessageType::UserPrompt,
            "llm_response" | "llm/end" => MessageType::LlmResponse,
            "ai_guard" => MessageType::AiGuard,
            "prompt_guard" => MessageType::PromptGuard,
            other => MessageType::Other(other.to_owned()),
        }
    }

    pub fn is_guard(&self) -> bool {
        matches!(self, MessageType::AiGuard | MessageType::PromptGuard)
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        MessageType::from_event_type(&s)
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        t.as_str().to_owned()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatMessage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Serialized detector results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatMessage {
    pub fn user_prompt(hash: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            kind: MessageType::UserPrompt,
            input: Some(input.into()),
            output: None,
            findings: None,
            context: None,
        }
    }

    pub fn llm_response(hash: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            kind: MessageType::LlmResponse,
            input: None,
            output: Some(output.into()),
            findings: None,
            context: None,
        }
    }

    pub fn guard(hash: impl Into<String>, kind: MessageType, findings: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            kind,
            input: None,
            output: None,
            findings: Some(findings.into()),
            context: None,
        }
    }

    /// The text a front end shows for this entry.
    pub fn display_text(&self) -> &str {
        match self.kind {
            MessageType::UserPrompt => self.input.as_deref().unwrap_or_default(),
            MessageType::LlmResponse => self.output.as_deref().unwrap_or_default(),
            _ => self
                .findings
                .as_deref()
                .or(self.output.as_deref())
                .or(self.input.as_deref())
                .unwrap_or_default(),
        }
    }
}

/// Derive a transcript id from content and creation time.
pub fn message_hash(content: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}", &digest[..16], at.timestamp_millis())
}
