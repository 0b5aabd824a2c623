use serde::{Deserialize, Serialize};

use super::llm::AuthConfig;
use crate::guard::DetectorToggles;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Security service transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the security services live and how async requests are polled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PangeaConfig {
    #[serde(default = "d_domain")]
    pub base_domain: String,
    /// URL pattern with `{service}`, `{domain}` and `{path}` placeholders.
    /// Point it at a proxy to route every service through one host.
    #[serde(default = "d_url_template")]
    pub url_template: String,
    #[serde(default = "d_15000")]
    pub timeout_ms: u64,
    /// Polls of the result location after a `202 Accepted`.
    #[serde(default = "d_3")]
    pub poll_max_attempts: u32,
    /// Back-off before poll `n` is `n² × poll_base_delay_ms`.
    #[serde(default = "d_1000")]
    pub poll_base_delay_ms: u64,
}

impl Default for PangeaConfig {
    fn default() -> Self {
        Self {
            base_domain: d_domain(),
            url_template: d_url_template(),
            timeout_ms: 15_000,
            poll_max_attempts: 3,
            poll_base_delay_ms: 1000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-service settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Audit log configuration id sent with every request.
    #[serde(default)]
    pub config_id: Option<String>,
    /// Events fetched when rebuilding the transcript.
    #[serde(default = "d_50")]
    pub history_limit: u32,
    /// Events per search request. A `history_limit` above this is fetched
    /// in pages of the same result set.
    #[serde(default = "d_50")]
    pub search_page_size: u32,
    /// Search `start` value for the quota window.
    #[serde(default = "d_window")]
    pub rate_limit_window: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            config_id: None,
            history_limit: 50,
            search_page_size: 50,
            rate_limit_window: d_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "d_guard_service")]
    pub service: String,
    #[serde(default = "d_guard_path")]
    pub path: String,
    #[serde(default = "d_input_recipe")]
    pub input_recipe: String,
    #[serde(default = "d_output_recipe")]
    pub output_recipe: String,
    /// Detector toggles a new session starts with.
    #[serde(default)]
    pub detectors: DetectorToggles,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            service: d_guard_service(),
            path: d_guard_path(),
            input_recipe: d_input_recipe(),
            output_recipe: d_output_recipe(),
            detectors: DetectorToggles::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthzConfig {
    /// Initial state of per-document authorization filtering.
    #[serde(default)]
    pub enabled: bool,
}

/// Token check used to turn a bearer credential into a principal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthnConfig {
    /// Client token authorizing the token-check call.
    #[serde(default)]
    pub client_token: AuthConfig,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_domain() -> String {
    "aws.us.pangea.cloud".into()
}
fn d_url_template() -> String {
    "https://{service}.{domain}/{path}".into()
}
fn d_window() -> String {
    "24hour".into()
}
fn d_guard_service() -> String {
    "ai-guard".into()
}
fn d_guard_path() -> String {
    "v1/text/guard".into()
}
fn d_input_recipe() -> String {
    "pangea_prompt_guard".into()
}
fn d_output_recipe() -> String {
    "pangea_llm_response_guard".into()
}
fn d_15000() -> u64 {
    15_000
}
fn d_1000() -> u64 {
    1000
}
fn d_3() -> u32 {
    3
}
fn d_50() -> u32 {
    50
}
