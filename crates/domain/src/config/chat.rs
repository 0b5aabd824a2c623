use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat limits & defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Completions a non-exempt principal may receive per rolling 24h.
    #[serde(default = "d_20")]
    pub daily_max_messages: u32,
    /// Ceiling on `system_prompt.len() + user_prompt.len()` (characters).
    #[serde(default = "d_2000")]
    pub prompt_max_chars: usize,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// Usernames matching this regex are exempt from the daily quota.
    /// Empty = nobody is exempt.
    #[serde(default = "d_exempt")]
    pub exempt_username_pattern: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            daily_max_messages: 20,
            prompt_max_chars: 2000,
            system_prompt: d_system_prompt(),
            exempt_username_pattern: d_exempt(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_20() -> u32 {
    20
}
fn d_2000() -> usize {
    2000
}
fn d_system_prompt() -> String {
    "You're a helpful assistant.".into()
}
fn d_exempt() -> String {
    r"@pangea\.cloud$".into()
}
