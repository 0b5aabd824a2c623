//! Provider construction from configuration.

use std::sync::Arc;

use pc_domain::config::{LlmConfig, ProviderKind};
use pc_domain::error::Result;

use crate::converse::ConverseProxyProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

/// Instantiate the adapter selected by `config.kind`.
///
/// Auth keys are resolved eagerly (env vars and keychain are read here), so
/// a missing key fails at startup rather than on the first turn.
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.kind {
        ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatProvider::from_config(config)?),
        ProviderKind::ConverseProxy => Arc::new(ConverseProxyProvider::from_config(config)?),
    };

    tracing::info!(
        provider_id = provider.provider_id(),
        kind = ?config.kind,
        base_url = %config.base_url,
        "registered LLM provider"
    );
    Ok(provider)
}
