//! Daily completion quota.
//!
//! [`RateLimiter`] derives a principal's remaining messages from the audit
//! log: `quota - count(llm_response events in the window)`. Nothing is
//! stored locally beyond the [`RateLimitState`] in the session; the audit
//! log stays the source of truth.

use std::fmt;

use pc_domain::config::{AuditConfig, ChatConfig};
use pc_domain::error::Result;
use pc_domain::principal::Principal;
use pc_domain::quota::RateLimitState;
use pc_pangea::{AuditLog, SearchRequest};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Returned when a quota check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub quota: u32,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "daily limit of {} messages exceeded", self.quota)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RateLimiter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct RateLimiter {
    quota: u32,
    window: String,
}

impl RateLimiter {
    pub fn new(chat: &ChatConfig, audit: &AuditConfig) -> Self {
        Self {
            quota: chat.daily_max_messages,
            window: audit.rate_limit_window.clone(),
        }
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Current quota state from the audit log.
    ///
    /// Exempt principals report [`RateLimitState::Unlimited`] without a
    /// query.
    pub async fn current(
        &self,
        audit: &dyn AuditLog,
        principal: &Principal,
    ) -> Result<RateLimitState> {
        if principal.is_exempt {
            return Ok(RateLimitState::Unlimited);
        }
        let used = self.used(audit, principal).await?;
        Ok(RateLimitState::from_usage(self.quota, used))
    }

    /// Completions `principal` received within the window.
    pub async fn used(&self, audit: &dyn AuditLog, principal: &Principal) -> Result<u32> {
        let found = audit
            .search(
                &principal.credential,
                SearchRequest::usage_for(&principal.username, &self.window),
            )
            .await?;
        Ok(found.count)
    }

    /// Local gate applied before a turn starts. Never touches the network.
    pub fn permits(&self, state: &RateLimitState) -> std::result::Result<(), QuotaExceeded> {
        match state {
            RateLimitState::Limited { remaining: 0, quota } => {
                Err(QuotaExceeded { quota: *quota })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(&ChatConfig::default(), &AuditConfig::default())
    }

    #[test]
    fn exhausted_state_is_refused() {
        let l = limiter();
        assert_eq!(l.quota(), 20);
        let err = l.permits(&RateLimitState::from_usage(20, 20)).unwrap_err();
        assert_eq!(err.to_string(), "daily limit of 20 messages exceeded");
    }

    #[test]
    fn remaining_and_unlimited_are_permitted() {
        let l = limiter();
        assert!(l.permits(&RateLimitState::from_usage(20, 19)).is_ok());
        assert!(l.permits(&RateLimitState::Unlimited).is_ok());
    }
}
