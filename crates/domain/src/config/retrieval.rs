use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Knowledge-base retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Initial state of the knowledge-base toggle.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_url")]
    pub base_url: String,
    #[serde(default = "d_path")]
    pub path: String,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: d_url(),
            path: d_path(),
            timeout_ms: 8000,
            max_retries: 2,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_url() -> String {
    "http://localhost:3000".into()
}
fn d_path() -> String {
    "/api/docs".into()
}
fn d_8000() -> u64 {
    8000
}
fn d_2() -> u32 {
    2
}
