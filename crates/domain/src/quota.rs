use serde::{Deserialize, Serialize};

/// Remaining daily messages for the signed-in principal.
///
/// Derived from the audit log at sign-in and decremented locally after each
/// completion. Never persisted; the audit log is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitState {
    /// Exempt principals are never counted.
    Unlimited,
    Limited { remaining: u32, quota: u32 },
}

impl RateLimitState {
    /// `quota - used`, saturating at zero.
    pub fn from_usage(quota: u32, used: u32) -> Self {
        RateLimitState::Limited {
            remaining: quota.saturating_sub(used),
            quota,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RateLimitState::Limited { remaining: 0, .. })
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            RateLimitState::Unlimited => None,
            RateLimitState::Limited { remaining, .. } => Some(*remaining),
        }
    }

    /// One completion consumed. Never goes below zero.
    pub fn decremented(self) -> Self {
        match self {
            RateLimitState::Unlimited => RateLimitState::Unlimited,
            RateLimitState::Limited { remaining, quota } => RateLimitState::Limited {
                remaining: remaining.saturating_sub(1),
                quota,
            },
        }
    }
}
