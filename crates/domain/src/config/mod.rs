mod chat;
mod llm;
mod observability;
mod pangea;
mod retrieval;

pub use chat::*;
pub use llm::*;
pub use observability::*;
pub use pangea::*;
pub use retrieval::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::principal::ExemptionRule;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pangea: PangeaConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub authz: AuthzConfig,
    #[serde(default)]
    pub authn: AuthnConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.pangea.base_domain.trim().is_empty() {
            errors.push(ConfigError::error(
                "pangea.base_domain",
                "base_domain must not be empty",
            ));
        }

        for placeholder in ["{service}", "{path}"] {
            if !self.pangea.url_template.contains(placeholder) {
                errors.push(ConfigError::error(
                    "pangea.url_template",
                    format!("template is missing the {placeholder} placeholder"),
                ));
            }
        }

        if self.pangea.poll_max_attempts == 0 {
            errors.push(ConfigError::warning(
                "pangea.poll_max_attempts",
                "0 means every asynchronous response fails immediately",
            ));
        }

        if self.audit.history_limit == 0 {
            errors.push(ConfigError::warning(
                "audit.history_limit",
                "0 disables transcript restore on sign-in",
            ));
        }
        if self.audit.search_page_size == 0 {
            errors.push(ConfigError::error(
                "audit.search_page_size",
                "search_page_size must be at least 1",
            ));
        }

        if self.guard.input_recipe.is_empty() {
            errors.push(ConfigError::error(
                "guard.input_recipe",
                "input_recipe must not be empty",
            ));
        }
        if self.guard.output_recipe.is_empty() {
            errors.push(ConfigError::error(
                "guard.output_recipe",
                "output_recipe must not be empty",
            ));
        }

        if self.retrieval.enabled && self.retrieval.base_url.is_empty() {
            errors.push(ConfigError::error(
                "retrieval.base_url",
                "base_url must be set when retrieval is enabled",
            ));
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError::error(
                "llm.base_url",
                "base_url must not be empty",
            ));
        }

        if self.llm.auth.key.is_some() {
            errors.push(ConfigError::warning(
                "llm.auth.key",
                "plaintext key in config; prefer env or keychain",
            ));
        }

        if self.chat.prompt_max_chars <= self.chat.system_prompt.chars().count() {
            errors.push(ConfigError::warning(
                "chat.system_prompt",
                "system prompt alone exceeds prompt_max_chars; every turn will be refused",
            ));
        }

        if let Err(e) = ExemptionRule::new(&self.chat.exempt_username_pattern) {
            errors.push(ConfigError::error(
                "chat.exempt_username_pattern",
                e.to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        errors
    }
}
