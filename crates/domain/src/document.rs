use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A knowledge-base document returned by retrieval. Scoped to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Outcome of one per-document authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzDecision {
    pub document_id: String,
    pub allowed: bool,
    /// Set when the check itself failed and the document was denied by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
