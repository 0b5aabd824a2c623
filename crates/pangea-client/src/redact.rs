use std::sync::Arc;

use async_trait::async_trait;
use pc_domain::error::Result;
use pc_domain::principal::Credential;
use serde::Deserialize;

use crate::transport::PangeaTransport;

const SERVICE: &str = "redact";

/// Reverses format-preserving redaction given its context token.
#[async_trait]
pub trait Unredactor: Send + Sync {
    async fn unredact(
        &self,
        credential: &Credential,
        redacted: &str,
        fpe_context: &str,
    ) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UnredactResult {
    data: String,
}

#[derive(Debug, Clone)]
pub struct RestUnredactor {
    transport: Arc<PangeaTransport>,
}

impl RestUnredactor {
    pub fn new(transport: Arc<PangeaTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Unredactor for RestUnredactor {
    async fn unredact(
        &self,
        credential: &Credential,
        redacted: &str,
        fpe_context: &str,
    ) -> Result<String> {
        let body = serde_json::json!({
            "redacted_data": redacted,
            "fpe_context": fpe_context,
        });
        let out: UnredactResult = self
            .transport
            .post(SERVICE, "v1/unredact", credential, &body)
            .await?;
        Ok(out.data)
    }
}
