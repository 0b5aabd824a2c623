//! `pc-providers` — the completion collaborator.
//!
//! [`LlmProvider`] is the provider-agnostic trait the turn orchestrator
//! calls. Two adapters implement it: [`OpenAiCompatProvider`] for any
//! OpenAI chat-completions endpoint and [`ConverseProxyProvider`] for the
//! chat application's own completion route. [`build_provider`] picks one
//! from [`LlmConfig`](pc_domain::config::LlmConfig).

pub mod converse;
pub mod openai_compat;
pub mod registry;
pub mod traits;
pub mod util;

// Re-exports for convenience.
pub use converse::ConverseProxyProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::build_provider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
pub use util::{resolve_api_key, store_in_keychain};
