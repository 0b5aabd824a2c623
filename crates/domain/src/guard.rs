//! Guard verdicts and detector toggles.
//!
//! Two response generations exist on the wire: the older one reports
//! `findings` (plus a top-level prompt-guard `detected` flag), the newer
//! one reports per-detector `detectors`. Both are decoded exactly once
//! into [`GuardResult`]; callers only use its accessor methods.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::transcript::MessageType;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Detectors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    PromptInjection,
    MaliciousEntity,
    PiiEntity,
    SecretsDetection,
    LanguageDetection,
    CodeDetection,
}

impl Detector {
    pub const ALL: [Detector; 6] = [
        Detector::PromptInjection,
        Detector::MaliciousEntity,
        Detector::PiiEntity,
        Detector::SecretsDetection,
        Detector::LanguageDetection,
        Detector::CodeDetection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Detector::PromptInjection => "prompt_injection",
            Detector::MaliciousEntity => "malicious_entity",
            Detector::PiiEntity => "pii_entity",
            Detector::SecretsDetection => "secrets_detection",
            Detector::LanguageDetection => "language_detection",
            Detector::CodeDetection => "code_detection",
        }
    }

    /// Whether a detection by this detector stops the turn.
    pub fn halts_turn(self) -> bool {
        matches!(self, Detector::PromptInjection | Detector::MaliciousEntity)
    }

    /// Detectors whose hits are rewritten in place rather than reported only.
    fn redacts(self) -> bool {
        matches!(self, Detector::PiiEntity | Detector::SecretsDetection)
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Detector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Detector::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown detector '{s}'"))
    }
}

/// Which detectors the user has enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorToggles {
    #[serde(default = "d_true")]
    pub prompt_injection: bool,
    #[serde(default = "d_true")]
    pub malicious_entity: bool,
    #[serde(default = "d_true")]
    pub pii_entity: bool,
    #[serde(default = "d_true")]
    pub secrets_detection: bool,
    #[serde(default = "d_true")]
    pub language_detection: bool,
    #[serde(default = "d_true")]
    pub code_detection: bool,
}

impl Default for DetectorToggles {
    fn default() -> Self {
        Self {
            prompt_injection: true,
            malicious_entity: true,
            pii_entity: true,
            secrets_detection: true,
            language_detection: true,
            code_detection: true,
        }
    }
}

impl DetectorToggles {
    pub fn is_enabled(&self, detector: Detector) -> bool {
        match detector {
            Detector::PromptInjection => self.prompt_injection,
            Detector::MaliciousEntity => self.malicious_entity,
            Detector::PiiEntity => self.pii_entity,
            Detector::SecretsDetection => self.secrets_detection,
            Detector::LanguageDetection => self.language_detection,
            Detector::CodeDetection => self.code_detection,
        }
    }

    /// Copy with one detector switched.
    pub fn with(self, detector: Detector, enabled: bool) -> Self {
        let mut next = self;
        match detector {
            Detector::PromptInjection => next.prompt_injection = enabled,
            Detector::MaliciousEntity => next.malicious_entity = enabled,
            Detector::PiiEntity => next.pii_entity = enabled,
            Detector::SecretsDetection => next.secrets_detection = enabled,
            Detector::LanguageDetection => next.language_detection = enabled,
            Detector::CodeDetection => next.code_detection = enabled,
        }
        next
    }

    /// The `overrides` object sent with every guard request.
    pub fn overrides(&self) -> Value {
        let map: serde_json::Map<String, Value> = Detector::ALL
            .into_iter()
            .map(|d| {
                (
                    d.as_str().to_owned(),
                    serde_json::json!({ "disabled": !self.is_enabled(d) }),
                )
            })
            .collect();
        Value::Object(map)
    }
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GuardResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    None,
    Redact,
    Block,
}

/// The (possibly rewritten) payload a guard hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuardPayload {
    Text(String),
    Messages(Vec<Message>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorFinding {
    #[serde(default)]
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Older guard generation: aggregate `findings`, optional prompt-guard flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardV1 {
    #[serde(default)]
    pub findings: serde_json::Map<String, Value>,
    /// Prompt-injection verdict reported at the top level.
    #[serde(default)]
    pub detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_prompt: Option<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpe_context: Option<String>,
}

/// Newer guard generation: one finding per detector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardV2 {
    #[serde(default)]
    pub detectors: BTreeMap<String, DetectorFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_messages: Option<Vec<Message>>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpe_context: Option<String>,
}

/// One guard call's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "lowercase")]
pub enum GuardResult {
    V1(GuardV1),
    V2(GuardV2),
}

impl GuardResult {
    pub fn schema_name(&self) -> &'static str {
        match self {
            GuardResult::V1(_) => "v1",
            GuardResult::V2(_) => "v2",
        }
    }

    /// Did `detector` fire?
    pub fn detected_by(&self, detector: Detector) -> bool {
        match self {
            GuardResult::V1(v1) => match detector {
                Detector::PromptInjection => v1.detected,
                Detector::MaliciousEntity => v1
                    .findings
                    .get("malicious_count")
                    .and_then(Value::as_u64)
                    .is_some_and(|n| n > 0),
                other => v1
                    .findings
                    .get(other.as_str())
                    .and_then(|v| v.get("detected"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            GuardResult::V2(v2) => v2
                .detectors
                .get(detector.as_str())
                .is_some_and(|f| f.detected),
        }
    }

    /// Detectors that fired, in canonical order.
    pub fn detections(&self) -> Vec<Detector> {
        Detector::ALL
            .into_iter()
            .filter(|d| self.detected_by(*d))
            .collect()
    }

    /// Enabled detectors whose hit must halt the turn.
    pub fn halting_detections(&self, toggles: &DetectorToggles) -> Vec<Detector> {
        self.detections()
            .into_iter()
            .filter(|d| d.halts_turn() && toggles.is_enabled(*d))
            .collect()
    }

    pub fn detected(&self) -> bool {
        !self.detections().is_empty()
    }

    pub fn blocked(&self) -> bool {
        match self {
            GuardResult::V1(v1) => v1.blocked,
            GuardResult::V2(v2) => v2.blocked,
        }
    }

    pub fn action_taken(&self) -> ActionTaken {
        if self.blocked() {
            ActionTaken::Block
        } else if self.fpe_context().is_some()
            || (self.payload().is_some() && self.detections().iter().any(|d| d.redacts()))
        {
            ActionTaken::Redact
        } else {
            ActionTaken::None
        }
    }

    /// Rewritten payload, when the guard returned one.
    pub fn payload(&self) -> Option<GuardPayload> {
        match self {
            GuardResult::V1(v1) => v1.redacted_prompt.clone().map(GuardPayload::Text),
            GuardResult::V2(v2) => v2
                .prompt_messages
                .clone()
                .map(GuardPayload::Messages)
                .or_else(|| v2.prompt_text.clone().map(GuardPayload::Text)),
        }
    }

    /// Reversible-redaction token, if the guard used format-preserving encryption.
    pub fn fpe_context(&self) -> Option<&str> {
        match self {
            GuardResult::V1(v1) => v1.fpe_context.as_deref(),
            GuardResult::V2(v2) => v2.fpe_context.as_deref(),
        }
    }

    /// Serialized detector results for the transcript `findings` field.
    pub fn findings_json(&self) -> String {
        let json = match self {
            GuardResult::V1(v1) => serde_json::to_string(&v1.findings),
            GuardResult::V2(v2) => serde_json::to_string(&v2.detectors),
        };
        json.unwrap_or_default()
    }

    /// Transcript entry type produced for this verdict.
    pub fn transcript_kind(&self) -> MessageType {
        match self {
            GuardResult::V1(_) => MessageType::PromptGuard,
            GuardResult::V2(_) => MessageType::AiGuard,
        }
    }
}
