//! The authenticated user a turn runs on behalf of.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque bearer credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    #[serde(default)]
    pub profile: Profile,
    pub credential: Credential,
    /// Exempt principals (internal org members) skip rate limiting.
    #[serde(default)]
    pub is_exempt: bool,
}

impl Principal {
    /// Name shown in prompts and UI: first name, else the username.
    pub fn display_name(&self) -> &str {
        self.profile
            .first_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Organizational identity rule deciding rate-limit exemption.
#[derive(Debug, Clone)]
pub struct ExemptionRule {
    pattern: Option<Regex>,
}

impl ExemptionRule {
    /// Compile a username pattern. An empty pattern exempts nobody.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self { pattern: None });
        }
        let re = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid exempt_username_pattern: {e}")))?;
        Ok(Self { pattern: Some(re) })
    }

    pub fn none() -> Self {
        Self { pattern: None }
    }

    pub fn is_exempt(&self, username: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(username))
    }
}
